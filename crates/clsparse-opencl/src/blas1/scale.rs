//! In-place dense vector scaling, `v[i] = alpha * v[i]`.
//!
//! The multiplier lives in device memory and is read once through a
//! blocking map. Below API 2.0 the request is forwarded to the vendor
//! `scal` routine; otherwise an exact-zero multiplier becomes a device
//! fill and any other value launches the cached `blas1/scale` kernel.

use crate::dispatch::dispatch_scale;
use crate::mapping::ScalarMapping;
use crate::queue::VendorBlas;
use crate::session::Session;
use crate::strategy::ScaleStrategy;
use crate::vector::{DeviceScalar, DeviceVector};
use clsparse_common::{Element, Result};
use tracing::debug;

/// Scale `vector` in place by the device scalar `alpha`.
///
/// The returned session's wait list holds the completion event of the
/// enqueued work. When nothing needed to be enqueued (empty vector on the
/// kernel or fill path) the session gains only the scalar's unmap event.
pub fn scale<'q, Q: VendorBlas, T: Element>(
    vector: &mut DeviceVector<'_, Q, T>,
    alpha: &DeviceScalar<'_, Q, T>,
    mut session: Session<'q, Q>,
) -> Result<Session<'q, Q>> {
    let queue = session.queue();
    let strategy = ScaleStrategy::select(session.api_version());

    let mapping = ScalarMapping::map(queue, alpha, session.wait_list())?;
    let value = mapping.value();
    session.push_wait(mapping.release()?);

    debug!(
        strategy = %strategy,
        precision = %T::PRECISION,
        len = vector.len(),
        offset = vector.offset(),
        "scale"
    );

    match strategy {
        ScaleStrategy::Legacy => {
            let (len, offset) = (vector.len(), vector.offset());
            let buffer = vector.values_mut();
            let event = queue.scal(len, value, buffer, offset, 1, session.wait_list())?;
            Ok(session.complete(event))
        }
        ScaleStrategy::Modern if value == T::ZERO => fill_zero(vector, session),
        ScaleStrategy::Modern => match dispatch_scale(&session, vector, alpha)? {
            Some(event) => Ok(session.complete(event)),
            None => Ok(session),
        },
    }
}

/// Single-precision [`scale`].
pub fn sscale<'q, Q: VendorBlas>(
    vector: &mut DeviceVector<'_, Q, f32>,
    alpha: &DeviceScalar<'_, Q, f32>,
    session: Session<'q, Q>,
) -> Result<Session<'q, Q>> {
    scale(vector, alpha, session)
}

/// Double-precision [`scale`].
pub fn dscale<'q, Q: VendorBlas>(
    vector: &mut DeviceVector<'_, Q, f64>,
    alpha: &DeviceScalar<'_, Q, f64>,
    session: Session<'q, Q>,
) -> Result<Session<'q, Q>> {
    scale(vector, alpha, session)
}

fn fill_zero<'q, Q: VendorBlas, T: Element>(
    vector: &mut DeviceVector<'_, Q, T>,
    session: Session<'q, Q>,
) -> Result<Session<'q, Q>> {
    if vector.is_empty() {
        return Ok(session);
    }
    let (byte_offset, byte_len) = (vector.byte_offset(), vector.byte_len());
    debug!(byte_offset, byte_len, "zero multiplier, filling");
    let event = session.queue().fill(
        vector.values_mut(),
        T::ZERO,
        byte_offset,
        byte_len,
        session.wait_list(),
    )?;
    Ok(session.complete(event))
}
