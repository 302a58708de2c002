//! Host-memory emulation of a compute device.
//!
//! [`ReferenceQueue`] implements [`DeviceQueue`] and [`VendorBlas`] over
//! plain host vectors. Every operation executes synchronously at enqueue
//! time, so events are complete as soon as they are returned. It checks
//! what a real runtime would reject (build options, kernel names, the
//! required work-group size, argument layout, ranges, unknown wait-list
//! events) and records a log of every successful operation so tests can
//! assert on ordering. Faults can be injected per operation.

use crate::launch::LaunchGeometry;
use crate::queue::{DeviceError, DeviceOp, DeviceQueue, KernelArg, VendorBlas};
use clsparse_common::{Element, ElementPrecision, SIZE_TYPE};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

const CL_OUT_OF_RESOURCES: i32 = -5;
const CL_BUILD_PROGRAM_FAILURE: i32 = -11;
const CL_INVALID_VALUE: i32 = -30;
const CL_INVALID_KERNEL_NAME: i32 = -46;
const CL_INVALID_KERNEL: i32 = -48;
const CL_INVALID_ARG_SIZE: i32 = -51;
const CL_INVALID_KERNEL_ARGS: i32 = -52;
const CL_INVALID_WORK_GROUP_SIZE: i32 = -54;
const CL_INVALID_EVENT_WAIT_LIST: i32 = -57;

/// `values[i] *= alpha` for every element; the ground truth for device runs.
pub fn ref_scale<T: Element>(values: &mut [T], alpha: T) {
    for v in values.iter_mut() {
        *v = *v * alpha;
    }
}

/// Completion token of a reference operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostEvent(u64);

impl HostEvent {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Host allocation standing in for a device buffer.
pub struct HostBuffer<T> {
    id: u64,
    data: Mutex<Vec<T>>,
}

impl<T: Element> HostBuffer<T> {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.data.lock().expect("host buffer lock poisoned")
    }
}

impl<T: Element> fmt::Debug for HostBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("id", &self.id)
            .field("precision", &T::PRECISION)
            .field("len", &self.len())
            .finish()
    }
}

/// Parsed `-D` build options of a reference program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDefines {
    pub size_type: String,
    pub value_type: ElementPrecision,
    pub work_group_size: usize,
}

impl BuildDefines {
    /// Parse a build option string such as
    /// ` -DSIZE_TYPE=ulong -DVALUE_TYPE=float -DWG_SIZE=256`.
    pub fn parse(options: &str) -> Result<Self, DeviceError> {
        let fail = |detail: String| {
            DeviceError::with_detail(DeviceOp::BuildProgram, CL_BUILD_PROGRAM_FAILURE, detail)
        };

        let mut defines = HashMap::new();
        for token in options.split_whitespace() {
            let define = token
                .strip_prefix("-D")
                .ok_or_else(|| fail(format!("unsupported option {token}")))?;
            let (key, value) = define.split_once('=').unwrap_or((define, ""));
            defines.insert(key, value);
        }

        let get = |key: &str| {
            defines
                .get(key)
                .copied()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| fail(format!("{key} undefined")))
        };

        let size_type = match get("SIZE_TYPE")? {
            SIZE_TYPE => SIZE_TYPE.to_string(),
            other => return Err(fail(format!("unsupported SIZE_TYPE {other}"))),
        };
        let value_type = match get("VALUE_TYPE")? {
            "float" => ElementPrecision::Single,
            "double" => ElementPrecision::Double,
            other => return Err(fail(format!("unsupported VALUE_TYPE {other}"))),
        };
        let work_group_size = get("WG_SIZE")?
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| fail("WG_SIZE is not a positive integer".to_string()))?;

        Ok(Self { size_type, value_type, work_group_size })
    }
}

/// A "compiled" reference program: its defines and declared entry points.
#[derive(Debug, Clone)]
pub struct HostProgram {
    pub defines: BuildDefines,
    pub entry_points: Vec<String>,
}

/// Kernel object created from a [`HostProgram`].
#[derive(Debug, Clone)]
pub struct HostKernel {
    name: String,
    defines: BuildDefines,
}

impl HostKernel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One logged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    pub op: DeviceOp,
    /// Event produced; `None` for the blocking map and for host-side steps.
    pub event: Option<HostEvent>,
    pub wait_list: Vec<HostEvent>,
}

struct Staging {
    buffer: u64,
    len: usize,
    free: unsafe fn(usize, usize),
}

/// # Safety
/// `addr` and `len` must describe a boxed slice of `T` leaked by `map_read`.
unsafe fn free_staging<T>(addr: usize, len: usize) {
    let slice = std::ptr::slice_from_raw_parts_mut(addr as *mut T, len);
    drop(unsafe { Box::from_raw(slice) });
}

/// Host-memory [`DeviceQueue`].
pub struct ReferenceQueue {
    next_id: AtomicU64,
    log: Mutex<Vec<OpRecord>>,
    faults: Mutex<HashMap<DeviceOp, i32>>,
    maps: Mutex<HashMap<usize, Staging>>,
}

impl ReferenceQueue {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            log: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            maps: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a buffer initialised with `values`.
    pub fn create_buffer<T: Element>(&self, values: &[T]) -> HostBuffer<T> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        HostBuffer { id, data: Mutex::new(values.to_vec()) }
    }

    /// Snapshot of a buffer's contents.
    pub fn read<T: Element>(&self, buffer: &HostBuffer<T>) -> Vec<T> {
        buffer.lock().clone()
    }

    /// Make every later `op` fail with `code` until [`Self::clear_fault`].
    pub fn inject_fault(&self, op: DeviceOp, code: i32) {
        self.faults.lock().expect("fault table lock poisoned").insert(op, code);
    }

    pub fn clear_fault(&self, op: DeviceOp) {
        self.faults.lock().expect("fault table lock poisoned").remove(&op);
    }

    /// Mappings not yet released.
    pub fn outstanding_maps(&self) -> usize {
        self.maps.lock().expect("map table lock poisoned").len()
    }

    /// Successful operations of kind `op`.
    pub fn count(&self, op: DeviceOp) -> usize {
        self.log.lock().expect("op log lock poisoned").iter().filter(|r| r.op == op).count()
    }

    /// All successful operations in issue order.
    pub fn op_log(&self) -> Vec<OpRecord> {
        self.log.lock().expect("op log lock poisoned").clone()
    }

    /// Forget logged operations; counters restart from zero.
    pub fn clear_log(&self) {
        self.log.lock().expect("op log lock poisoned").clear();
    }

    fn check_fault(&self, op: DeviceOp) -> Result<(), DeviceError> {
        match self.faults.lock().expect("fault table lock poisoned").get(&op) {
            Some(&code) => Err(DeviceError::with_detail(op, code, "injected fault")),
            None => Ok(()),
        }
    }

    fn check_wait_list(&self, op: DeviceOp, wait_list: &[HostEvent]) -> Result<(), DeviceError> {
        let issued = self.next_id.load(Ordering::SeqCst);
        match wait_list.iter().find(|e| e.0 == 0 || e.0 >= issued) {
            Some(e) => Err(DeviceError::with_detail(
                op,
                CL_INVALID_EVENT_WAIT_LIST,
                format!("event {} was never issued", e.0),
            )),
            None => Ok(()),
        }
    }

    fn log(&self, op: DeviceOp, event: Option<HostEvent>, wait_list: &[HostEvent]) {
        trace!(%op, ?event, waits = wait_list.len(), "reference op");
        self.log.lock().expect("op log lock poisoned").push(OpRecord {
            op,
            event,
            wait_list: wait_list.to_vec(),
        });
    }

    fn complete(&self, op: DeviceOp, wait_list: &[HostEvent]) -> HostEvent {
        let event = HostEvent(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.log(op, Some(event), wait_list);
        event
    }
}

impl Default for ReferenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReferenceQueue {
    fn drop(&mut self) {
        let maps = self.maps.get_mut().map(std::mem::take).unwrap_or_default();
        for (addr, staging) in maps {
            // SAFETY: every entry was leaked by `map_read` and never reclaimed.
            unsafe { (staging.free)(addr, staging.len) };
        }
    }
}

impl fmt::Debug for ReferenceQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceQueue")
            .field("outstanding_maps", &self.outstanding_maps())
            .finish_non_exhaustive()
    }
}

fn out_of_range(op: DeviceOp, end: usize, len: usize) -> DeviceError {
    let detail = format!("range end {end} exceeds {len} elements");
    DeviceError::with_detail(op, CL_INVALID_VALUE, detail)
}

impl DeviceQueue for ReferenceQueue {
    type Buffer<T: Element> = HostBuffer<T>;
    type Event = HostEvent;
    type Program = HostProgram;
    type Kernel = HostKernel;

    unsafe fn map_read<T: Element>(
        &self,
        buffer: &HostBuffer<T>,
        offset: usize,
        len: usize,
        wait_list: &[HostEvent],
    ) -> Result<NonNull<T>, DeviceError> {
        self.check_fault(DeviceOp::MapRead)?;
        self.check_wait_list(DeviceOp::MapRead, wait_list)?;
        if len == 0 {
            return Err(DeviceError::with_detail(DeviceOp::MapRead, CL_INVALID_VALUE, "empty"));
        }

        let staged: Box<[T]> = {
            let data = buffer.lock();
            let end = offset + len;
            let slice = data.get(offset..end);
            slice.ok_or_else(|| out_of_range(DeviceOp::MapRead, end, data.len()))?.into()
        };
        let ptr = Box::into_raw(staged) as *mut T;
        let staging = Staging { buffer: buffer.id, len, free: free_staging::<T> };
        self.maps.lock().expect("map table lock poisoned").insert(ptr as usize, staging);
        self.log(DeviceOp::MapRead, None, wait_list);

        NonNull::new(ptr).ok_or_else(|| DeviceError::new(DeviceOp::MapRead, CL_OUT_OF_RESOURCES))
    }

    unsafe fn unmap<T: Element>(
        &self,
        buffer: &HostBuffer<T>,
        mapped: NonNull<T>,
    ) -> Result<HostEvent, DeviceError> {
        self.check_fault(DeviceOp::Unmap)?;
        let addr = mapped.as_ptr() as usize;
        let staging = {
            let mut maps = self.maps.lock().expect("map table lock poisoned");
            let owned = maps.get(&addr).is_some_and(|s| s.buffer == buffer.id);
            if owned { maps.remove(&addr) } else { None }
        };
        let Some(staging) = staging else {
            return Err(DeviceError::with_detail(
                DeviceOp::Unmap,
                CL_INVALID_VALUE,
                "pointer is not mapped from this buffer",
            ));
        };
        // SAFETY: the entry was just removed, so this is its only reclaim.
        unsafe { (staging.free)(addr, staging.len) };
        Ok(self.complete(DeviceOp::Unmap, &[]))
    }

    fn fill<T: Element>(
        &self,
        buffer: &mut HostBuffer<T>,
        pattern: T,
        byte_offset: usize,
        byte_len: usize,
        wait_list: &[HostEvent],
    ) -> Result<HostEvent, DeviceError> {
        self.check_fault(DeviceOp::Fill)?;
        self.check_wait_list(DeviceOp::Fill, wait_list)?;
        let width = T::PRECISION.size_bytes();
        if !byte_offset.is_multiple_of(width) || !byte_len.is_multiple_of(width) {
            return Err(DeviceError::with_detail(
                DeviceOp::Fill,
                CL_INVALID_VALUE,
                format!("offset {byte_offset} / size {byte_len} not a multiple of {width}"),
            ));
        }

        let (start, end) = (byte_offset / width, (byte_offset + byte_len) / width);
        {
            let mut data = buffer.lock();
            let len = data.len();
            let range = data.get_mut(start..end);
            range.ok_or_else(|| out_of_range(DeviceOp::Fill, end, len))?.fill(pattern);
        }
        Ok(self.complete(DeviceOp::Fill, wait_list))
    }

    fn build_program(&self, source: &str, options: &str) -> Result<HostProgram, DeviceError> {
        self.check_fault(DeviceOp::BuildProgram)?;
        let defines = BuildDefines::parse(options)?;
        let entry_points = source
            .match_indices("__kernel")
            .filter_map(|(at, _)| {
                let rest = &source[at..];
                let after_void = &rest[rest.find("void")? + "void".len()..];
                let name = after_void[..after_void.find('(')?].trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect::<Vec<_>>();
        if entry_points.is_empty() {
            return Err(DeviceError::with_detail(
                DeviceOp::BuildProgram,
                CL_BUILD_PROGRAM_FAILURE,
                "no __kernel entry points",
            ));
        }
        self.log(DeviceOp::BuildProgram, None, &[]);
        Ok(HostProgram { defines, entry_points })
    }

    fn create_kernel(&self, program: &HostProgram, name: &str) -> Result<HostKernel, DeviceError> {
        self.check_fault(DeviceOp::CreateKernel)?;
        if !program.entry_points.iter().any(|e| e == name) {
            let code = CL_INVALID_KERNEL_NAME;
            return Err(DeviceError::with_detail(DeviceOp::CreateKernel, code, name));
        }
        self.log(DeviceOp::CreateKernel, None, &[]);
        Ok(HostKernel { name: name.to_string(), defines: program.defines.clone() })
    }

    fn enqueue_kernel<T: Element>(
        &self,
        kernel: &mut HostKernel,
        args: &[KernelArg<'_, HostBuffer<T>>],
        geometry: &LaunchGeometry,
        wait_list: &[HostEvent],
    ) -> Result<HostEvent, DeviceError> {
        let op = DeviceOp::EnqueueKernel;
        self.check_fault(op)?;
        self.check_wait_list(op, wait_list)?;
        if kernel.name != "scale" {
            let detail = format!("no host body for {}", kernel.name);
            return Err(DeviceError::with_detail(op, CL_INVALID_KERNEL, detail));
        }
        if kernel.defines.value_type != T::PRECISION {
            return Err(DeviceError::with_detail(
                op,
                CL_INVALID_ARG_SIZE,
                format!("built for {}, buffers are {}", kernel.defines.value_type, T::PRECISION),
            ));
        }
        if geometry.group_size != kernel.defines.work_group_size
            || !geometry.global_size.is_multiple_of(geometry.group_size)
        {
            return Err(DeviceError::with_detail(
                op,
                CL_INVALID_WORK_GROUP_SIZE,
                format!("geometry {geometry} vs WG_SIZE {}", kernel.defines.work_group_size),
            ));
        }

        let [
            KernelArg::Size(n),
            KernelArg::Buffer(values),
            KernelArg::Size(offset),
            KernelArg::Buffer(alpha),
            KernelArg::Size(alpha_offset),
        ] = args
        else {
            let detail = "expected (ulong, buffer, ulong, buffer, ulong)";
            return Err(DeviceError::with_detail(op, CL_INVALID_KERNEL_ARGS, detail));
        };
        let (n, offset, alpha_offset) = (*n as usize, *offset as usize, *alpha_offset as usize);

        let alpha = {
            let data = alpha.lock();
            *data.get(alpha_offset).ok_or_else(|| out_of_range(op, alpha_offset + 1, data.len()))?
        };
        {
            let mut data = values.lock();
            let len = data.len();
            for gid in 0..geometry.global_size {
                if gid >= n {
                    continue;
                }
                let index = offset + gid;
                let v = data.get_mut(index).ok_or_else(|| out_of_range(op, index + 1, len))?;
                *v = *v * alpha;
            }
        }
        Ok(self.complete(op, wait_list))
    }
}

impl VendorBlas for ReferenceQueue {
    fn scal<T: Element>(
        &self,
        n: usize,
        alpha: T,
        buffer: &mut HostBuffer<T>,
        offset: usize,
        incx: i32,
        wait_list: &[HostEvent],
    ) -> Result<HostEvent, DeviceError> {
        let op = DeviceOp::VendorScal;
        self.check_fault(op)?;
        self.check_wait_list(op, wait_list)?;
        let stride = usize::try_from(incx)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| DeviceError::with_detail(op, CL_INVALID_VALUE, format!("incx {incx}")))?;

        {
            let mut data = buffer.lock();
            let len = data.len();
            for i in 0..n {
                let index = offset + i * stride;
                let v = data.get_mut(index).ok_or_else(|| out_of_range(op, index + 1, len))?;
                *v = *v * alpha;
            }
        }
        Ok(self.complete(op, wait_list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::LaunchPlanner;

    const OPTIONS: &str = " -DSIZE_TYPE=ulong -DVALUE_TYPE=float -DWG_SIZE=4";

    #[test]
    fn parses_build_defines() {
        let defines = BuildDefines::parse(OPTIONS).unwrap();
        assert_eq!(defines.size_type, "ulong");
        assert_eq!(defines.value_type, ElementPrecision::Single);
        assert_eq!(defines.work_group_size, 4);
    }

    #[test]
    fn missing_define_fails_build() {
        let err = BuildDefines::parse(" -DSIZE_TYPE=ulong -DWG_SIZE=4").unwrap_err();
        assert_eq!(err.code, CL_BUILD_PROGRAM_FAILURE);
        assert!(err.detail.contains("VALUE_TYPE"));
    }

    #[test]
    fn narrow_index_type_fails_build() {
        let err =
            BuildDefines::parse(" -DSIZE_TYPE=uint -DVALUE_TYPE=float -DWG_SIZE=4").unwrap_err();
        assert_eq!(err.op, DeviceOp::BuildProgram);
        assert_eq!(err.code, CL_BUILD_PROGRAM_FAILURE);
        assert!(err.detail.contains("SIZE_TYPE uint"));

        let queue = ReferenceQueue::new();
        let options = " -DSIZE_TYPE=int -DVALUE_TYPE=double -DWG_SIZE=4";
        let err = queue.build_program("__kernel void scale(int x) {}", options).unwrap_err();
        assert_eq!(err.code, CL_BUILD_PROGRAM_FAILURE);
    }

    #[test]
    fn unknown_entry_point_is_rejected() {
        let queue = ReferenceQueue::new();
        let program = queue.build_program("__kernel void scale(int x) {}", OPTIONS).unwrap();
        assert_eq!(program.entry_points, vec!["scale".to_string()]);
        let err = queue.create_kernel(&program, "axpy").unwrap_err();
        assert_eq!(err.code, CL_INVALID_KERNEL_NAME);
    }

    #[test]
    fn kernel_rejects_wrong_group_size() {
        let queue = ReferenceQueue::new();
        let program = queue.build_program("__kernel void scale(int x) {}", OPTIONS).unwrap();
        let mut kernel = queue.create_kernel(&program, "scale").unwrap();
        let values = queue.create_buffer(&[1.0f32; 3]);
        let alpha = queue.create_buffer(&[2.0f32]);
        let args = [
            KernelArg::Size(3),
            KernelArg::Buffer(&values),
            KernelArg::Size(0),
            KernelArg::Buffer(&alpha),
            KernelArg::Size(0),
        ];
        let geometry = LaunchPlanner::new(8).plan_1d(3);
        let err = queue.enqueue_kernel::<f32>(&mut kernel, &args, &geometry, &[]).unwrap_err();
        assert_eq!(err.code, CL_INVALID_WORK_GROUP_SIZE);

        let geometry = LaunchPlanner::new(4).plan_1d(3);
        queue.enqueue_kernel::<f32>(&mut kernel, &args, &geometry, &[]).unwrap();
        assert_eq!(queue.read(&values), vec![2.0; 3]);
    }

    #[test]
    fn fill_respects_offset() {
        let queue = ReferenceQueue::new();
        let mut buffer = queue.create_buffer(&[1.0f64, 2.0, 3.0, 4.0]);
        queue.fill(&mut buffer, 0.0, 8, 16, &[]).unwrap();
        assert_eq!(queue.read(&buffer), vec![1.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn fill_rejects_misaligned_range() {
        let queue = ReferenceQueue::new();
        let mut buffer = queue.create_buffer(&[1.0f32; 4]);
        let err = queue.fill(&mut buffer, 0.0, 2, 4, &[]).unwrap_err();
        assert_eq!(err.code, CL_INVALID_VALUE);
    }

    #[test]
    fn unknown_wait_event_is_rejected() {
        let queue = ReferenceQueue::new();
        let mut buffer = queue.create_buffer(&[1.0f32]);
        let err = queue.fill(&mut buffer, 0.0, 0, 4, &[HostEvent::new(999)]).unwrap_err();
        assert_eq!(err.code, CL_INVALID_EVENT_WAIT_LIST);
    }

    #[test]
    fn vendor_scal_honours_stride() {
        let queue = ReferenceQueue::new();
        let mut buffer = queue.create_buffer(&[1.0f32, 1.0, 1.0, 1.0]);
        queue.scal(2, 3.0, &mut buffer, 0, 2, &[]).unwrap();
        assert_eq!(queue.read(&buffer), vec![3.0, 1.0, 3.0, 1.0]);
    }

    #[test]
    fn injected_fault_until_cleared() {
        let queue = ReferenceQueue::new();
        let mut buffer = queue.create_buffer(&[1.0f32]);
        queue.inject_fault(DeviceOp::Fill, -5);
        assert_eq!(queue.fill(&mut buffer, 0.0, 0, 4, &[]).unwrap_err().code, -5);
        queue.clear_fault(DeviceOp::Fill);
        assert!(queue.fill(&mut buffer, 0.0, 0, 4, &[]).is_ok());
        assert_eq!(queue.count(DeviceOp::Fill), 1);
        queue.clear_log();
        assert!(queue.op_log().is_empty());
    }

    #[test]
    fn dropping_queue_reclaims_leaked_maps() {
        let queue = ReferenceQueue::new();
        let buffer = queue.create_buffer(&[1.0f32]);
        let ptr = unsafe { queue.map_read(&buffer, 0, 1, &[]) }.unwrap();
        assert_eq!(unsafe { ptr.as_ptr().read() }, 1.0);
        assert_eq!(queue.outstanding_maps(), 1);
        drop(queue);
    }

    #[test]
    fn ref_scale_multiplies_every_element() {
        let mut values = [1.0f32, -2.0, 0.5];
        ref_scale(&mut values, 2.0);
        assert_eq!(values, [2.0, -4.0, 1.0]);
    }
}
