//! Kernel resolution, argument binding and launch for `blas1/scale`.

use crate::kernels::KernelSource;
use crate::queue::{DeviceError, DeviceQueue, KernelArg};
use crate::session::Session;
use crate::vector::{DeviceScalar, DeviceVector};
use clsparse_common::{Element, ElementPrecision, SIZE_TYPE};
use std::fmt;
use tracing::{debug, trace};

/// Preprocessor options a dense kernel is compiled with.
///
/// Renders as ` -DSIZE_TYPE=ulong -DVALUE_TYPE=<type> -DWG_SIZE=<n>`,
/// leading space included; the rendered string is also the cache-key
/// parameter component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelParams {
    pub precision: ElementPrecision,
    pub group_size: usize,
}

impl KernelParams {
    pub fn new(precision: ElementPrecision, group_size: usize) -> Self {
        Self { precision, group_size }
    }

    pub fn for_element<T: Element>(group_size: usize) -> Self {
        Self::new(T::PRECISION, group_size)
    }
}

impl fmt::Display for KernelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " -DSIZE_TYPE={SIZE_TYPE} -DVALUE_TYPE={} -DWG_SIZE={}",
            self.precision.ocl_type(),
            self.group_size
        )
    }
}

/// Launch `blas1/scale` over `vector` with the multiplier in `alpha`.
///
/// Returns `None` without resolving anything when the planned geometry is
/// empty.
pub(crate) fn dispatch_scale<Q: DeviceQueue, T: Element>(
    session: &Session<'_, Q>,
    vector: &mut DeviceVector<'_, Q, T>,
    alpha: &DeviceScalar<'_, Q, T>,
) -> Result<Option<Q::Event>, DeviceError> {
    let planner = session.planner();
    let geometry = planner.plan_1d(vector.len());
    if geometry.is_empty() {
        trace!("empty geometry, nothing to launch");
        return Ok(None);
    }

    let params = KernelParams::for_element::<T>(planner.group_size()).to_string();
    let queue = session.queue();
    let mut kernel = session.kernels().resolve(queue, KernelSource::Blas1Scale, &params)?;

    let (len, offset) = (vector.len() as u64, vector.offset() as u64);
    let args = [
        KernelArg::Size(len),
        KernelArg::Buffer(vector.values()),
        KernelArg::Size(offset),
        KernelArg::Buffer(alpha.value()),
        KernelArg::Size(alpha.offset() as u64),
    ];
    debug!(geometry = %geometry, precision = %T::PRECISION, "launching blas1/scale");
    trace!(args = args.len(), waits = session.wait_list().len(), "enqueue kernel");
    queue.enqueue_kernel::<T>(&mut kernel, &args, &geometry, session.wait_list()).map(Some)
}
