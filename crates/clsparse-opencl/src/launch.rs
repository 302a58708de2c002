//! 1-D launch geometry for elementwise kernels.
//!
//! The global size is rounded up to a whole number of work-groups, so it
//! may exceed the element count. Kernels guard `get_global_id(0) >= n`.

use clsparse_common::config::DEFAULT_WORK_GROUP_SIZE;
use std::fmt;

/// Work partitioning for a single 1-D dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Number of work-groups.
    pub group_count: usize,
    /// Work-items per work-group (local size).
    pub group_size: usize,
    /// `group_count * group_size`.
    pub global_size: usize,
}

impl LaunchGeometry {
    /// True when the dispatch would launch no work-items.
    pub fn is_empty(&self) -> bool {
        self.group_count == 0
    }

    /// Ratio of useful work-items to dispatched work-items for `n` elements.
    pub fn efficiency(&self, n: usize) -> f64 {
        if self.global_size == 0 { 1.0 } else { n as f64 / self.global_size as f64 }
    }
}

impl fmt::Display for LaunchGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} (global {})", self.group_count, self.group_size, self.global_size)
    }
}

/// Computes [`LaunchGeometry`] for a fixed work-group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlanner {
    group_size: usize,
}

impl Default for LaunchPlanner {
    fn default() -> Self {
        Self { group_size: DEFAULT_WORK_GROUP_SIZE as usize }
    }
}

impl LaunchPlanner {
    /// Planner for `group_size` work-items per group. Zero is treated as one.
    pub fn new(group_size: usize) -> Self {
        Self { group_size: group_size.max(1) }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Cover `n` elements with whole work-groups.
    pub fn plan_1d(&self, n: usize) -> LaunchGeometry {
        let group_count = n.div_ceil(self.group_size);
        LaunchGeometry {
            group_count,
            group_size: self.group_size,
            global_size: group_count * self.group_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elements_yield_empty_geometry() {
        let geo = LaunchPlanner::new(256).plan_1d(0);
        assert_eq!(geo.group_count, 0);
        assert_eq!(geo.global_size, 0);
        assert!(geo.is_empty());
    }

    #[test]
    fn exact_multiple_has_no_padding() {
        let geo = LaunchPlanner::new(256).plan_1d(1024);
        assert_eq!(geo.group_count, 4);
        assert_eq!(geo.global_size, 1024);
        assert_eq!(geo.efficiency(1024), 1.0);
    }

    #[test]
    fn remainder_rounds_up_to_next_group() {
        let geo = LaunchPlanner::new(256).plan_1d(257);
        assert_eq!(geo.group_count, 2);
        assert_eq!(geo.global_size, 512);
        assert!(geo.efficiency(257) < 1.0);
    }

    #[test]
    fn single_element() {
        let geo = LaunchPlanner::new(64).plan_1d(1);
        assert_eq!(geo, LaunchGeometry { group_count: 1, group_size: 64, global_size: 64 });
    }

    #[test]
    fn zero_group_size_is_clamped() {
        let planner = LaunchPlanner::new(0);
        assert_eq!(planner.group_size(), 1);
        assert_eq!(planner.plan_1d(5).global_size, 5);
    }

    #[test]
    fn default_group_size_is_256() {
        assert_eq!(LaunchPlanner::default().group_size(), 256);
    }

    #[test]
    fn display() {
        let geo = LaunchPlanner::new(256).plan_1d(300);
        assert_eq!(geo.to_string(), "2 x 256 (global 512)");
    }
}
