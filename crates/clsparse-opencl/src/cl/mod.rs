//! OpenCL backend over `opencl3`, with clBLAS loaded at runtime.

mod clblas;
mod queue;

pub use clblas::ClBlas;
pub use queue::{ClEvent, ClQueue};
