//! Capability-based choice between the vendor routine and the custom kernel.

use clsparse_common::ApiVersion;
use std::fmt;

/// How a scale request is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleStrategy {
    /// Forward to the vendor BLAS `scal` routine.
    Legacy,
    /// Zero fast path, otherwise the cached `blas1/scale` kernel.
    Modern,
}

impl ScaleStrategy {
    /// `Legacy` below API 2.0, `Modern` otherwise.
    pub fn select(version: ApiVersion) -> Self {
        if version < ApiVersion::OPENCL_2_0 { Self::Legacy } else { Self::Modern }
    }
}

impl fmt::Display for ScaleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Modern => write!(f, "modern"),
        }
    }
}
