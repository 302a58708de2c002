//! Scoped host mapping of a device scalar.

use crate::queue::{DeviceError, DeviceQueue};
use crate::vector::DeviceScalar;
use clsparse_common::Element;
use std::ptr::NonNull;
use tracing::{trace, warn};

/// Host-visible read mapping of one scalar element.
///
/// The mapping is released exactly once: either explicitly through
/// [`ScalarMapping::release`], which reports the unmap event, or on drop,
/// where an unmap failure can only be logged.
pub struct ScalarMapping<'a, Q: DeviceQueue, T: Element> {
    queue: &'a Q,
    buffer: &'a Q::Buffer<T>,
    mapped: NonNull<T>,
    live: bool,
}

impl<'a, Q: DeviceQueue, T: Element> ScalarMapping<'a, Q, T> {
    /// Blocking map of `scalar`, ordered after `wait_list`.
    pub fn map(
        queue: &'a Q,
        scalar: &DeviceScalar<'a, Q, T>,
        wait_list: &[Q::Event],
    ) -> Result<Self, DeviceError> {
        let buffer = scalar.value();
        // SAFETY: the guard unmaps `mapped` exactly once, in `release` or `drop`.
        let mapped = unsafe { queue.map_read::<T>(buffer, scalar.offset(), 1, wait_list)? };
        trace!(offset = scalar.offset(), precision = %T::PRECISION, "mapped scalar");
        Ok(Self { queue, buffer, mapped, live: true })
    }

    /// The mapped value.
    pub fn value(&self) -> T {
        // SAFETY: `live` holds for every reachable `&self`; the pointer is
        // valid for one read until unmapped.
        unsafe { self.mapped.as_ptr().read() }
    }

    /// Unmap now and return the unmap completion event.
    pub fn release(mut self) -> Result<Q::Event, DeviceError> {
        self.live = false;
        // SAFETY: `live` was set, so this is the only unmap of `mapped`.
        unsafe { self.queue.unmap(self.buffer, self.mapped) }
    }
}

impl<Q: DeviceQueue, T: Element> Drop for ScalarMapping<'_, Q, T> {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        // SAFETY: first and only unmap of `mapped`.
        if let Err(err) = unsafe { self.queue.unmap(self.buffer, self.mapped) } {
            warn!(error = %err, "failed to unmap scalar on drop");
        }
    }
}
