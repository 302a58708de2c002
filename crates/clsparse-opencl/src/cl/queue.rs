//! [`DeviceQueue`] over an `opencl3` context and command queue.

use super::clblas::ClBlas;
use crate::launch::LaunchGeometry;
use crate::queue::{DeviceError, DeviceOp, DeviceQueue, KernelArg, VendorBlas};
use clsparse_common::{ApiVersion, ClsparseConfig, Element};
use opencl3::command_queue::{CL_QUEUE_PROFILING_ENABLE, CommandQueue};
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_ALL, Device};
use opencl3::error_codes::{CL_BUILD_PROGRAM_FAILURE, CL_DEVICE_NOT_FOUND, ClError};
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MAP_READ, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_WRITE, ClMem};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{CL_BLOCKING, cl_event, cl_mem};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

fn cl_error(op: DeviceOp) -> impl Fn(ClError) -> DeviceError {
    move |e| DeviceError::with_detail(op, e.0, e.to_string())
}

/// Completion event of an enqueued OpenCL command.
#[derive(Clone)]
pub struct ClEvent(Arc<Event>);

impl ClEvent {
    pub fn raw(&self) -> cl_event {
        self.0.get()
    }

    /// Block until the command has completed.
    pub fn wait(&self) -> Result<(), DeviceError> {
        self.0.wait().map_err(cl_error(DeviceOp::Transfer))
    }
}

impl From<Event> for ClEvent {
    fn from(event: Event) -> Self {
        Self(Arc::new(event))
    }
}

impl fmt::Debug for ClEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClEvent").field(&self.raw()).finish()
    }
}

fn raw_events(wait_list: &[ClEvent]) -> Vec<cl_event> {
    wait_list.iter().map(ClEvent::raw).collect()
}

/// Borrowed memory-object handle, so a map does not need `&mut` on the buffer.
struct RawMem(cl_mem);

impl ClMem for RawMem {
    fn get(&self) -> cl_mem {
        self.0
    }

    fn get_mut(&mut self) -> cl_mem {
        self.0
    }
}

/// An OpenCL device, its context and one in-order command queue.
pub struct ClQueue {
    device_name: String,
    api_version: ApiVersion,
    context: Context,
    queue: CommandQueue,
    blas: OnceLock<Option<ClBlas>>,
}

// SAFETY: OpenCL handles are reference-counted and thread-safe; the
// command queue serializes submissions internally.
unsafe impl Send for ClQueue {}
unsafe impl Sync for ClQueue {}

impl fmt::Debug for ClQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClQueue")
            .field("device_name", &self.device_name)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl ClQueue {
    /// Open the device at `platform_index` / `device_index` from `config`.
    pub fn from_config(config: &ClsparseConfig) -> Result<Self, DeviceError> {
        let setup = DeviceOp::Setup;
        let platforms = get_platforms().map_err(cl_error(setup))?;
        let platform = platforms.get(config.platform_index).ok_or_else(|| {
            DeviceError::with_detail(
                setup,
                CL_DEVICE_NOT_FOUND,
                format!("platform {} of {}", config.platform_index, platforms.len()),
            )
        })?;
        let platform_name = platform.name().unwrap_or_default();

        let device_ids = platform.get_devices(CL_DEVICE_TYPE_ALL).map_err(cl_error(setup))?;
        let device_id = *device_ids.get(config.device_index).ok_or_else(|| {
            DeviceError::with_detail(
                setup,
                CL_DEVICE_NOT_FOUND,
                format!(
                    "device {} of {} on {platform_name}",
                    config.device_index,
                    device_ids.len()
                ),
            )
        })?;
        let device = Device::new(device_id);
        let device_name = device.name().unwrap_or_default();
        let version_string = device.version().unwrap_or_default();
        let api_version = ApiVersion::from_device_version(&version_string).unwrap_or_else(|| {
            warn!(version = %version_string, "unrecognised device version, assuming build default");
            ApiVersion::BUILD
        });

        let context = Context::from_device(&device).map_err(cl_error(setup))?;
        let properties = if config.enable_profiling { CL_QUEUE_PROFILING_ENABLE } else { 0 };
        let queue = CommandQueue::create_default_with_properties(&context, properties, 0)
            .map_err(cl_error(setup))?;

        info!(
            platform = %platform_name,
            device = %device_name,
            api_version = %api_version,
            profiling = config.enable_profiling,
            "selected OpenCL device"
        );
        Ok(Self { device_name, api_version, context, queue, blas: OnceLock::new() })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// API generation reported by the device.
    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    /// Allocate a read-write buffer initialised from `values`.
    pub fn create_buffer<T: Element>(&self, values: &[T]) -> Result<Buffer<T>, DeviceError> {
        // SAFETY: CL_MEM_COPY_HOST_PTR copies `values` during the call.
        unsafe {
            Buffer::<T>::create(
                &self.context,
                CL_MEM_READ_WRITE | CL_MEM_COPY_HOST_PTR,
                values.len(),
                values.as_ptr() as *mut _,
            )
        }
        .map_err(cl_error(DeviceOp::Setup))
    }

    /// Blocking read of the first `len` elements of `buffer`, after `wait_list`.
    pub fn read<T: Element>(
        &self,
        buffer: &Buffer<T>,
        len: usize,
        wait_list: &[ClEvent],
    ) -> Result<Vec<T>, DeviceError> {
        let mut host = vec![T::ZERO; len];
        let waits = raw_events(wait_list);
        // SAFETY: blocking read into a host slice of exactly `len` elements.
        unsafe { self.queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, &mut host, &waits) }
            .map_err(cl_error(DeviceOp::Transfer))?;
        Ok(host)
    }

    fn blas(&self) -> Option<&ClBlas> {
        self.blas
            .get_or_init(|| match ClBlas::load() {
                Ok(blas) => Some(blas),
                Err(err) => {
                    warn!(error = %err, "clBLAS unavailable");
                    None
                }
            })
            .as_ref()
    }
}

impl DeviceQueue for ClQueue {
    type Buffer<T: Element> = Buffer<T>;
    type Event = ClEvent;
    type Program = Program;
    type Kernel = Kernel;

    unsafe fn map_read<T: Element>(
        &self,
        buffer: &Buffer<T>,
        offset: usize,
        len: usize,
        wait_list: &[ClEvent],
    ) -> Result<NonNull<T>, DeviceError> {
        let width = T::PRECISION.size_bytes();
        let mut mem = RawMem(buffer.get());
        let mut host: cl_mem = ptr::null_mut();
        let waits = raw_events(wait_list);
        // SAFETY: blocking map; the caller unmaps `host` exactly once.
        unsafe {
            self.queue.enqueue_map_buffer(
                &mut mem,
                CL_BLOCKING,
                CL_MAP_READ,
                offset * width,
                len * width,
                &mut host,
                &waits,
            )
        }
        .map_err(cl_error(DeviceOp::MapRead))?;
        NonNull::new(host.cast::<T>())
            .ok_or_else(|| DeviceError::with_detail(DeviceOp::MapRead, -1, "null mapping"))
    }

    unsafe fn unmap<T: Element>(
        &self,
        buffer: &Buffer<T>,
        mapped: NonNull<T>,
    ) -> Result<ClEvent, DeviceError> {
        // SAFETY: `mapped` came from `map_read` on this buffer.
        unsafe { self.queue.enqueue_unmap_mem_object(buffer.get(), mapped.as_ptr().cast(), &[]) }
            .map(ClEvent::from)
            .map_err(cl_error(DeviceOp::Unmap))
    }

    fn fill<T: Element>(
        &self,
        buffer: &mut Buffer<T>,
        pattern: T,
        byte_offset: usize,
        byte_len: usize,
        wait_list: &[ClEvent],
    ) -> Result<ClEvent, DeviceError> {
        let waits = raw_events(wait_list);
        // SAFETY: the range is within the caller-guaranteed vector extent.
        unsafe { self.queue.enqueue_fill_buffer(buffer, &[pattern], byte_offset, byte_len, &waits) }
            .map(ClEvent::from)
            .map_err(cl_error(DeviceOp::Fill))
    }

    fn build_program(&self, source: &str, options: &str) -> Result<Program, DeviceError> {
        Program::create_and_build_from_source(&self.context, source, options).map_err(|log| {
            debug!(build_log = %log, "program build failed");
            DeviceError::with_detail(DeviceOp::BuildProgram, CL_BUILD_PROGRAM_FAILURE, log)
        })
    }

    fn create_kernel(&self, program: &Program, name: &str) -> Result<Kernel, DeviceError> {
        Kernel::create(program, name).map_err(cl_error(DeviceOp::CreateKernel))
    }

    fn enqueue_kernel<T: Element>(
        &self,
        kernel: &mut Kernel,
        args: &[KernelArg<'_, Buffer<T>>],
        geometry: &LaunchGeometry,
        wait_list: &[ClEvent],
    ) -> Result<ClEvent, DeviceError> {
        let waits = raw_events(wait_list);
        // SAFETY: argument types match the kernel signature built from the
        // same `-D` options; buffers outlive the enqueue.
        let event = unsafe {
            let mut exec = ExecuteKernel::new(kernel);
            for arg in args {
                match arg {
                    KernelArg::Size(value) => exec.set_arg(value),
                    KernelArg::Buffer(buffer) => exec.set_arg(&buffer.get()),
                };
            }
            exec.set_global_work_size(geometry.global_size)
                .set_local_work_size(geometry.group_size)
                .set_event_wait_list(&waits)
                .enqueue_nd_range(&self.queue)
        }
        .map_err(cl_error(DeviceOp::EnqueueKernel))?;
        Ok(ClEvent::from(event))
    }
}

impl VendorBlas for ClQueue {
    fn scal<T: Element>(
        &self,
        n: usize,
        alpha: T,
        buffer: &mut Buffer<T>,
        offset: usize,
        incx: i32,
        wait_list: &[ClEvent],
    ) -> Result<ClEvent, DeviceError> {
        let blas = self.blas().ok_or_else(|| {
            DeviceError::with_detail(DeviceOp::VendorScal, -1, "clBLAS library not loaded")
        })?;
        let waits = raw_events(wait_list);
        let event = blas.scal(self.queue.get(), n, alpha, buffer.get(), offset, incx, &waits)?;
        Ok(ClEvent::from(event))
    }
}
