//! Embedded OpenCL C kernel sources.
//!
//! Each [`KernelSource`] is compiled at runtime with the `-D` options
//! produced by [`crate::dispatch::KernelParams`].

/// Static kernel source strings, embedded at compile time.
pub const BLAS1_SCALE_SRC: &str = include_str!("blas1/scale.cl");

/// Available kernel sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelSource {
    /// In-place dense vector scaling by a device scalar.
    Blas1Scale,
}

impl KernelSource {
    /// All kernel source variants.
    pub const ALL: &[KernelSource] = &[Self::Blas1Scale];

    /// Source family, used as the first cache-key component.
    #[must_use]
    pub fn category(self) -> &'static str {
        match self {
            Self::Blas1Scale => "blas1",
        }
    }

    /// `__kernel` entry point name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Blas1Scale => "scale",
        }
    }

    #[must_use]
    pub fn source(self) -> &'static str {
        match self {
            Self::Blas1Scale => BLAS1_SCALE_SRC,
        }
    }

    /// Look up a source by `(category, name)`.
    pub fn find(category: &str, name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.category() == category && k.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_variants_return_non_empty_source() {
        for &k in KernelSource::ALL {
            assert!(!k.source().is_empty(), "{k:?} returned empty source");
        }
    }

    #[test]
    fn entry_point_is_declared_in_source() {
        for &k in KernelSource::ALL {
            let decl = format!("void {}(", k.name());
            assert!(k.source().contains(&decl), "{k:?} does not declare {}", k.name());
            assert!(k.source().contains("__kernel"));
        }
    }

    #[test]
    fn scale_source_requires_build_defines() {
        let src = KernelSource::Blas1Scale.source();
        for define in ["SIZE_TYPE", "VALUE_TYPE", "WG_SIZE"] {
            assert!(src.contains(&format!("#ifndef {define}")), "missing guard for {define}");
        }
        assert!(src.contains("reqd_work_group_size(WG_SIZE, 1, 1)"));
        assert!(src.contains("if (i >= size) return;"));
    }

    #[test]
    fn find_by_category_and_name() {
        assert_eq!(KernelSource::find("blas1", "scale"), Some(KernelSource::Blas1Scale));
        assert_eq!(KernelSource::find("blas1", "axpy"), None);
    }
}
