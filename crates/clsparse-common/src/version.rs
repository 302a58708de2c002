//! Device-API generation marker.
//!
//! Encoded the way OpenCL headers spell it: `major * 100 + minor * 10`,
//! so 1.2 is `120` and 2.0 is `200`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OpenCL API generation a session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiVersion(u32);

impl ApiVersion {
    pub const OPENCL_1_2: Self = Self(120);
    pub const OPENCL_2_0: Self = Self(200);

    /// Generation selected at build time (`cl-1-2` feature picks 1.2).
    pub const BUILD: Self =
        if cfg!(feature = "cl-1-2") { Self::OPENCL_1_2 } else { Self::OPENCL_2_0 };

    /// Create from the packed `major * 100 + minor * 10` form.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Create from major/minor components.
    ///
    /// Panics if the packed form does not fit in `u32`; use
    /// [`ApiVersion::checked_new`] for untrusted input.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self(major * 100 + minor * 10)
    }

    /// Create from major/minor components, or `None` if `minor > 9` or the
    /// packed form overflows.
    pub const fn checked_new(major: u32, minor: u32) -> Option<Self> {
        if minor > 9 {
            return None;
        }
        match major.checked_mul(100) {
            Some(hundreds) => match hundreds.checked_add(minor * 10) {
                Some(raw) => Some(Self(raw)),
                None => None,
            },
            None => None,
        }
    }

    /// True when the packed form has a zero units digit, as every
    /// `major.minor` version does.
    pub const fn is_canonical(self) -> bool {
        self.0 % 10 == 0
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 / 100
    }

    pub const fn minor(self) -> u32 {
        (self.0 % 100) / 10
    }

    /// Parse the version out of a `CL_DEVICE_VERSION` string such as
    /// `"OpenCL 3.0 NEO "`.
    pub fn from_device_version(version: &str) -> Option<Self> {
        let rest = version.trim().strip_prefix("OpenCL ")?;
        let numeric = rest.split_whitespace().next()?;
        numeric.parse().ok()
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::BUILD
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    /// Accepts `"2.0"` style or the packed `"200"` style.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((major, minor)) = s.split_once('.') {
            let major = major
                .parse::<u32>()
                .map_err(|e| format!("bad major version '{major}': {e}"))?;
            let minor = minor
                .parse::<u32>()
                .map_err(|e| format!("bad minor version '{minor}': {e}"))?;
            if minor > 9 {
                return Err(format!("minor version must be a single digit, got {minor}"));
            }
            return Self::checked_new(major, minor)
                .ok_or_else(|| format!("version out of range: {s}"));
        }
        let raw = s.parse::<u32>().map_err(|e| format!("unknown API version '{s}': {e}"))?;
        if raw < 100 {
            return Err(format!("packed API version must be >= 100, got {raw}"));
        }
        let version = Self(raw);
        if !version.is_canonical() {
            return Err(format!("packed API version must be a multiple of 10, got {raw}"));
        }
        Ok(version)
    }
}
