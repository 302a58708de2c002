//! Device command-queue seam.
//!
//! [`DeviceQueue`] is the narrow interface the dense routines consume:
//! scalar mapping, buffer fill, program build, kernel creation and launch.
//! [`VendorBlas`] adds the prebuilt vendor `scal` used by the legacy
//! strategy. Backends report failures as [`DeviceError`], which converts
//! into the single execution error kind.

use crate::launch::LaunchGeometry;
use clsparse_common::{ClsparseError, Element};
use std::fmt;
use std::ptr::NonNull;
use thiserror::Error;

/// Device operation that produced a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    MapRead,
    Unmap,
    Fill,
    BuildProgram,
    CreateKernel,
    EnqueueKernel,
    VendorScal,
    /// Platform, device, context or queue creation.
    Setup,
    /// Host/device buffer transfer.
    Transfer,
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MapRead => "map",
            Self::Unmap => "unmap",
            Self::Fill => "fill",
            Self::BuildProgram => "program build",
            Self::CreateKernel => "kernel creation",
            Self::EnqueueKernel => "kernel launch",
            Self::VendorScal => "vendor scal",
            Self::Setup => "device setup",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// A non-success status returned by a device call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{op} failed with status {code}{}", detail_suffix(.detail))]
pub struct DeviceError {
    pub op: DeviceOp,
    pub code: i32,
    pub detail: String,
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() { String::new() } else { format!(": {detail}") }
}

impl DeviceError {
    pub fn new(op: DeviceOp, code: i32) -> Self {
        Self { op, code, detail: String::new() }
    }

    pub fn with_detail(op: DeviceOp, code: i32, detail: impl Into<String>) -> Self {
        Self { op, code, detail: detail.into() }
    }
}

impl From<DeviceError> for ClsparseError {
    fn from(err: DeviceError) -> Self {
        ClsparseError::invalid_execution(err)
    }
}

/// Check a raw status code and return an error if it is not success (`0`).
pub fn check_status(status: i32, op: DeviceOp) -> Result<(), DeviceError> {
    if status == 0 { Ok(()) } else { Err(DeviceError::new(op, status)) }
}

/// A positional kernel argument.
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    /// 64-bit unsigned value (`ulong` on the device).
    Size(u64),
    /// Device buffer handle.
    Buffer(&'a B),
}

/// Command queue of a compute device.
///
/// All enqueue methods are asynchronous: they wait on `wait_list` before
/// the device starts the operation and return the operation's completion
/// event. [`DeviceQueue::map_read`] is the only blocking call.
pub trait DeviceQueue {
    /// Device allocation holding elements of type `T`.
    type Buffer<T: Element>;
    /// Completion token.
    type Event: Clone + fmt::Debug;
    /// Compiled program; shared through the kernel cache.
    type Program;
    /// Kernel object created from a program; owns its argument state.
    type Kernel;

    /// Blocking read-map of `len` elements starting at element `offset`.
    ///
    /// # Safety
    /// The returned pointer is valid for `len` reads of `T` until it is
    /// passed to [`DeviceQueue::unmap`] with the same buffer, and must be
    /// unmapped exactly once.
    unsafe fn map_read<T: Element>(
        &self,
        buffer: &Self::Buffer<T>,
        offset: usize,
        len: usize,
        wait_list: &[Self::Event],
    ) -> Result<NonNull<T>, DeviceError>;

    /// Release a mapping created by [`DeviceQueue::map_read`].
    ///
    /// # Safety
    /// `mapped` must come from `map_read` on `buffer` and not be used again.
    unsafe fn unmap<T: Element>(
        &self,
        buffer: &Self::Buffer<T>,
        mapped: NonNull<T>,
    ) -> Result<Self::Event, DeviceError>;

    /// Fill `byte_len` bytes starting at `byte_offset` with repeated `pattern`.
    fn fill<T: Element>(
        &self,
        buffer: &mut Self::Buffer<T>,
        pattern: T,
        byte_offset: usize,
        byte_len: usize,
        wait_list: &[Self::Event],
    ) -> Result<Self::Event, DeviceError>;

    /// Compile `source` with the given build options.
    fn build_program(&self, source: &str, options: &str) -> Result<Self::Program, DeviceError>;

    /// Create the kernel entry point `name` from a built program.
    fn create_kernel(&self, program: &Self::Program, name: &str)
    -> Result<Self::Kernel, DeviceError>;

    /// Bind `args` in order and enqueue `kernel` over `geometry`.
    fn enqueue_kernel<T: Element>(
        &self,
        kernel: &mut Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer<T>>],
        geometry: &LaunchGeometry,
        wait_list: &[Self::Event],
    ) -> Result<Self::Event, DeviceError>;
}

/// Prebuilt vendor BLAS routines available on a queue.
pub trait VendorBlas: DeviceQueue {
    /// `x[offset + i * incx] *= alpha` for `i < n`, enqueued on this queue.
    fn scal<T: Element>(
        &self,
        n: usize,
        alpha: T,
        buffer: &mut Self::Buffer<T>,
        offset: usize,
        incx: i32,
        wait_list: &[Self::Event],
    ) -> Result<Self::Event, DeviceError>;
}
