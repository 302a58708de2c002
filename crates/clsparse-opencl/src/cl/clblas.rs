//! clBLAS `scal` loaded from the shared library at runtime.

use crate::queue::{DeviceError, DeviceOp, check_status};
use clsparse_common::{Element, ElementPrecision};
use libloading::Library;
use opencl3::event::Event;
use opencl3::types::{cl_command_queue, cl_event, cl_mem, cl_uint};
use std::ffi::c_int;
use std::fmt;
use std::ptr;
use tracing::debug;

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["clBLAS.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["libclBLAS.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libclBLAS.so", "libclBLAS.so.2"];

type SetupFn = unsafe extern "C" fn() -> c_int;
type TeardownFn = unsafe extern "C" fn();
type ScalFn<T> = unsafe extern "C" fn(
    usize,
    T,
    cl_mem,
    usize,
    c_int,
    cl_uint,
    *mut cl_command_queue,
    cl_uint,
    *const cl_event,
    *mut cl_event,
) -> c_int;

/// Handle to an initialised clBLAS library.
pub struct ClBlas {
    sscal: ScalFn<f32>,
    dscal: ScalFn<f64>,
    teardown: TeardownFn,
    _library: Library,
}

// SAFETY: clBLAS entry points are thread-safe after `clblasSetup`.
unsafe impl Send for ClBlas {}
unsafe impl Sync for ClBlas {}

impl fmt::Debug for ClBlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClBlas").finish_non_exhaustive()
    }
}

fn load_error(detail: impl Into<String>) -> DeviceError {
    DeviceError::with_detail(DeviceOp::Setup, -1, detail)
}

impl ClBlas {
    /// Load the first clBLAS library found and run `clblasSetup`.
    pub fn load() -> Result<Self, DeviceError> {
        let mut last_error = String::from("no candidate library names");
        for name in LIBRARY_NAMES {
            // SAFETY: loading clBLAS runs no initialisers with preconditions.
            match unsafe { Library::new(name) } {
                Ok(library) => return Self::from_library(library),
                Err(err) => {
                    debug!(library = name, error = %err, "clBLAS candidate not loadable");
                    last_error = err.to_string();
                }
            }
        }
        Err(load_error(last_error))
    }

    fn from_library(library: Library) -> Result<Self, DeviceError> {
        // SAFETY: symbol types match the clBLAS 2.x C declarations.
        let (setup, teardown, sscal, dscal) = unsafe {
            let setup = *library.get::<SetupFn>(b"clblasSetup\0").map_err(sym_error)?;
            let teardown = *library.get::<TeardownFn>(b"clblasTeardown\0").map_err(sym_error)?;
            let sscal = *library.get::<ScalFn<f32>>(b"clblasSscal\0").map_err(sym_error)?;
            let dscal = *library.get::<ScalFn<f64>>(b"clblasDscal\0").map_err(sym_error)?;
            (setup, teardown, sscal, dscal)
        };
        // SAFETY: no preconditions; paired with `clblasTeardown` on drop.
        check_status(unsafe { setup() }, DeviceOp::Setup)?;
        debug!("clBLAS initialised");
        Ok(Self { sscal, dscal, teardown, _library: library })
    }

    /// Enqueue `x[offset + i * incx] *= alpha` for `i < n` on `queue`.
    #[allow(clippy::too_many_arguments)]
    pub fn scal<T: Element>(
        &self,
        queue: cl_command_queue,
        n: usize,
        alpha: T,
        buffer: cl_mem,
        offset: usize,
        incx: i32,
        wait_list: &[cl_event],
    ) -> Result<Event, DeviceError> {
        let mut queue = queue;
        let mut event: cl_event = ptr::null_mut();
        let waits = if wait_list.is_empty() { ptr::null() } else { wait_list.as_ptr() };
        let num_waits = cl_uint::try_from(wait_list.len()).map_err(|_| {
            DeviceError::with_detail(DeviceOp::VendorScal, -1, "wait list too long")
        })?;

        // SAFETY: `buffer` and `queue` are live handles; clBLAS writes one
        // event into `event`.
        let status = unsafe {
            match T::PRECISION {
                ElementPrecision::Single => (self.sscal)(
                    n,
                    alpha.to_f64() as f32,
                    buffer,
                    offset,
                    incx,
                    1,
                    &mut queue,
                    num_waits,
                    waits,
                    &mut event,
                ),
                ElementPrecision::Double => (self.dscal)(
                    n,
                    alpha.to_f64(),
                    buffer,
                    offset,
                    incx,
                    1,
                    &mut queue,
                    num_waits,
                    waits,
                    &mut event,
                ),
            }
        };
        check_status(status, DeviceOp::VendorScal)?;
        if event.is_null() {
            return Err(DeviceError::with_detail(DeviceOp::VendorScal, -1, "no completion event"));
        }
        debug!(n, offset, precision = %T::PRECISION, "clBLAS scal enqueued");
        Ok(Event::new(event))
    }
}

fn sym_error(err: libloading::Error) -> DeviceError {
    load_error(format!("missing clBLAS symbol: {err}"))
}

impl Drop for ClBlas {
    fn drop(&mut self) {
        // SAFETY: `clblasSetup` succeeded in `from_library`.
        unsafe { (self.teardown)() };
        debug!("clBLAS torn down");
    }
}
