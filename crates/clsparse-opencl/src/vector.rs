//! Borrowed views of device-resident dense vectors and scalars.
//!
//! Neither view owns device memory. `offset + len` must not exceed the
//! allocation's element capacity; this is the caller's responsibility and
//! is not checked here.

use crate::queue::DeviceQueue;
use clsparse_common::Element;
use std::fmt;

/// Dense vector of `len` elements starting at element `offset` of `values`.
pub struct DeviceVector<'a, Q: DeviceQueue, T: Element> {
    values: &'a mut Q::Buffer<T>,
    len: usize,
    offset: usize,
}

impl<'a, Q: DeviceQueue, T: Element> DeviceVector<'a, Q, T> {
    pub fn new(values: &'a mut Q::Buffer<T>, len: usize) -> Self {
        Self { values, len, offset: 0 }
    }

    pub fn with_offset(values: &'a mut Q::Buffer<T>, len: usize, offset: usize) -> Self {
        Self { values, len, offset }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element index of the first logical element.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte offset of the first logical element.
    pub fn byte_offset(&self) -> usize {
        self.offset * T::PRECISION.size_bytes()
    }

    /// Bytes covered by the logical elements.
    pub fn byte_len(&self) -> usize {
        self.len * T::PRECISION.size_bytes()
    }

    pub fn values(&self) -> &Q::Buffer<T> {
        &*self.values
    }

    pub fn values_mut(&mut self) -> &mut Q::Buffer<T> {
        &mut *self.values
    }
}

impl<Q: DeviceQueue, T: Element> fmt::Debug for DeviceVector<'_, Q, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceVector")
            .field("precision", &T::PRECISION)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Single element at element `offset` of `value`.
pub struct DeviceScalar<'a, Q: DeviceQueue, T: Element> {
    value: &'a Q::Buffer<T>,
    offset: usize,
}

impl<'a, Q: DeviceQueue, T: Element> DeviceScalar<'a, Q, T> {
    pub fn new(value: &'a Q::Buffer<T>) -> Self {
        Self { value, offset: 0 }
    }

    pub fn with_offset(value: &'a Q::Buffer<T>, offset: usize) -> Self {
        Self { value, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn value(&self) -> &'a Q::Buffer<T> {
        self.value
    }
}

impl<Q: DeviceQueue, T: Element> fmt::Debug for DeviceScalar<'_, Q, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceScalar")
            .field("precision", &T::PRECISION)
            .field("offset", &self.offset)
            .finish()
    }
}
