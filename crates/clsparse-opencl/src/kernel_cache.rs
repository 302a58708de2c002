//! Compiled-program cache keyed by kernel identity and build options.
//!
//! Each distinct `(category, name, params)` triple is compiled at most once
//! per cache, even under concurrent lookups: a per-key slot lock serializes
//! builds of the same key while builds of different keys proceed in
//! parallel. A failed build leaves its slot empty so a later lookup retries.
//! Programs are shared; kernel objects carry argument state and are created
//! fresh for every [`KernelCache::resolve`].

use crate::kernels::KernelSource;
use crate::queue::{DeviceError, DeviceQueue};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Identity of a compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub category: String,
    pub name: String,
    pub params: String,
}

impl KernelKey {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self { category: category.into(), name: name.into(), params: params.into() }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} [{}]", self.category, self.name, self.params.trim())
    }
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub build_failures: u64,
}

impl CacheStats {
    /// Hit rate as a fraction in `[0.0, 1.0]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        #[allow(clippy::cast_precision_loss)]
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

type Slot<P> = Arc<Mutex<Option<Arc<P>>>>;

/// Thread-safe program cache.
pub struct KernelCache<P> {
    slots: Mutex<HashMap<KernelKey, Slot<P>>>,
    stats: Mutex<CacheStats>,
}

impl<P> KernelCache<P> {
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()), stats: Mutex::new(CacheStats::default()) }
    }

    /// Return the cached program for `key`, building it with `build` on a miss.
    pub fn get_or_build<E>(
        &self,
        key: &KernelKey,
        build: impl FnOnce() -> Result<P, E>,
    ) -> Result<Arc<P>, E> {
        let slot = {
            let mut slots = self.slots.lock().expect("kernel cache lock poisoned");
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut program = slot.lock().expect("kernel slot lock poisoned");
        if let Some(existing) = program.as_ref() {
            self.record(|s| s.hits += 1);
            return Ok(Arc::clone(existing));
        }

        self.record(|s| s.misses += 1);
        match build() {
            Ok(built) => {
                let built = Arc::new(built);
                *program = Some(Arc::clone(&built));
                self.record(|s| s.builds += 1);
                debug!(key = %key, "cached program");
                Ok(built)
            }
            Err(err) => {
                self.record(|s| s.build_failures += 1);
                Err(err)
            }
        }
    }

    /// Resolve `source` built with `params` and create a kernel object for it.
    pub fn resolve<Q>(
        &self,
        queue: &Q,
        source: KernelSource,
        params: &str,
    ) -> Result<Q::Kernel, DeviceError>
    where
        Q: DeviceQueue<Program = P>,
    {
        let key = KernelKey::new(source.category(), source.name(), params);
        let program = self.get_or_build(&key, || {
            debug!(key = %key, "building program");
            queue.build_program(source.source(), params)
        })?;
        queue.create_kernel(&program, source.name())
    }

    /// True if a built program is cached for `key`.
    pub fn contains(&self, key: &KernelKey) -> bool {
        let slot = {
            let slots = self.slots.lock().expect("kernel cache lock poisoned");
            slots.get(key).cloned()
        };
        slot.is_some_and(|s| s.lock().expect("kernel slot lock poisoned").is_some())
    }

    /// Number of built programs.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<P>> =
            self.slots.lock().expect("kernel cache lock poisoned").values().cloned().collect();
        slots.iter().filter(|s| s.lock().expect("kernel slot lock poisoned").is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached program. Statistics are kept.
    pub fn clear(&self) {
        self.slots.lock().expect("kernel cache lock poisoned").clear();
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().expect("kernel cache stats lock poisoned")
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut *self.stats.lock().expect("kernel cache stats lock poisoned"));
    }
}

impl<P> Default for KernelCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for KernelCache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCache").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(params: &str) -> KernelKey {
        KernelKey::new("blas1", "scale", params)
    }

    #[test]
    fn miss_then_hit() {
        let cache: KernelCache<u32> = KernelCache::new();
        let first: Result<_, ()> = cache.get_or_build(&key("a"), || Ok(7));
        let second: Result<_, ()> = cache.get_or_build(&key("a"), || panic!("rebuilt"));
        assert_eq!(*first.unwrap(), 7);
        assert_eq!(*second.unwrap(), 7);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, builds: 1, build_failures: 0 });
        assert_eq!(cache.stats().hit_rate(), 0.5);
    }

    #[test]
    fn failure_is_not_cached() {
        let cache: KernelCache<u32> = KernelCache::new();
        let err = cache.get_or_build(&key("a"), || Err("boom"));
        assert_eq!(err.unwrap_err(), "boom");
        assert!(!cache.contains(&key("a")));
        assert!(cache.is_empty());

        let ok: Result<_, &str> = cache.get_or_build(&key("a"), || Ok(1));
        assert_eq!(*ok.unwrap(), 1);
        assert_eq!(cache.stats().build_failures, 1);
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn params_distinguish_entries() {
        let cache: KernelCache<&str> = KernelCache::new();
        let _: Result<_, ()> = cache.get_or_build(&key(" -DVALUE_TYPE=float"), || Ok("f"));
        let _: Result<_, ()> = cache.get_or_build(&key(" -DVALUE_TYPE=double"), || Ok("d"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_empties_cache() {
        let cache: KernelCache<u8> = KernelCache::new();
        let _: Result<_, ()> = cache.get_or_build(&key("x"), || Ok(0));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn key_display() {
        assert_eq!(key(" -DWG_SIZE=256").to_string(), "blas1/scale [-DWG_SIZE=256]");
    }
}
