//! Device element precisions.
//!
//! Only the two fixed-width floating types are supported. [`Element`] is
//! sealed so the set stays closed; each implementor carries its
//! [`ElementPrecision`], which in turn knows the OpenCL C type name used
//! in kernel build options and the byte width used for fill patterns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;

/// OpenCL C type used for lengths and offsets in every dense kernel.
pub const SIZE_TYPE: &str = "ulong";

/// Element precision of a device vector or scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementPrecision {
    /// 32-bit IEEE-754 (`float`).
    Single,
    /// 64-bit IEEE-754 (`double`).
    Double,
}

impl ElementPrecision {
    /// Width of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::Single => 4,
            Self::Double => 8,
        }
    }

    /// OpenCL C spelling of the element type.
    pub const fn ocl_type(self) -> &'static str {
        match self {
            Self::Single => "float",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for ElementPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Double => write!(f, "double"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Host-side mapping type for a device element.
pub trait Element:
    sealed::Sealed
    + Copy
    + Default
    + PartialEq
    + fmt::Debug
    + Mul<Output = Self>
    + Send
    + Sync
    + 'static
{
    const PRECISION: ElementPrecision;
    /// Additive identity, also the fill pattern of the zero fast path.
    const ZERO: Self;
    const ONE: Self;

    /// Lossless widening to `f64`.
    fn to_f64(self) -> f64;
}

impl Element for f32 {
    const PRECISION: ElementPrecision = ElementPrecision::Single;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Element for f64 {
    const PRECISION: ElementPrecision = ElementPrecision::Double;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn to_f64(self) -> f64 {
        self
    }
}
