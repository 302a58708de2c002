//! Per-chain control object threaded through device routines by value.
//!
//! A [`Session`] carries the queue, the kernel cache, the wait list for
//! the next operation, the completion event of the last one, and the
//! capability marker used for strategy selection. Each routine consumes
//! the session and returns it with its wait list replaced by the new
//! completion event, so consecutive routines on one session are ordered.

use crate::kernel_cache::KernelCache;
use crate::launch::LaunchPlanner;
use crate::queue::DeviceQueue;
use clsparse_common::{ApiVersion, ClsparseConfig};
use std::fmt;

pub struct Session<'q, Q: DeviceQueue> {
    queue: &'q Q,
    kernels: &'q KernelCache<Q::Program>,
    wait_list: Vec<Q::Event>,
    event: Option<Q::Event>,
    api_version: ApiVersion,
    planner: LaunchPlanner,
}

impl<'q, Q: DeviceQueue> Session<'q, Q> {
    /// Session with the build-time API generation and default work-group size.
    pub fn new(queue: &'q Q, kernels: &'q KernelCache<Q::Program>) -> Self {
        Self {
            queue,
            kernels,
            wait_list: Vec::new(),
            event: None,
            api_version: ApiVersion::BUILD,
            planner: LaunchPlanner::default(),
        }
    }

    /// Session using the API generation and work-group size from `config`.
    pub fn from_config(
        queue: &'q Q,
        kernels: &'q KernelCache<Q::Program>,
        config: &ClsparseConfig,
    ) -> Self {
        Self::new(queue, kernels)
            .with_api_version(config.api_version)
            .with_work_group_size(config.work_group_size as usize)
    }

    pub fn with_api_version(mut self, api_version: ApiVersion) -> Self {
        self.api_version = api_version;
        self
    }

    pub fn with_work_group_size(mut self, group_size: usize) -> Self {
        self.planner = LaunchPlanner::new(group_size);
        self
    }

    /// Add events the next operation must wait on.
    pub fn wait_for(mut self, events: impl IntoIterator<Item = Q::Event>) -> Self {
        self.wait_list.extend(events);
        self
    }

    pub fn queue(&self) -> &'q Q {
        self.queue
    }

    pub fn kernels(&self) -> &'q KernelCache<Q::Program> {
        self.kernels
    }

    pub fn wait_list(&self) -> &[Q::Event] {
        &self.wait_list
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn planner(&self) -> LaunchPlanner {
        self.planner
    }

    /// Completion event of the last operation enqueued through this session.
    pub fn completion_event(&self) -> Option<&Q::Event> {
        self.event.as_ref()
    }

    pub fn into_completion_event(self) -> Option<Q::Event> {
        self.event
    }

    /// Append an event produced outside the enqueue path (e.g. an unmap).
    pub(crate) fn push_wait(&mut self, event: Q::Event) {
        self.wait_list.push(event);
    }

    /// Record `event` as this session's completion and the next wait list.
    pub(crate) fn complete(mut self, event: Q::Event) -> Self {
        self.wait_list.clear();
        self.wait_list.push(event.clone());
        self.event = Some(event);
        self
    }
}

impl<Q: DeviceQueue> fmt::Debug for Session<'_, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_version", &self.api_version)
            .field("group_size", &self.planner.group_size())
            .field("wait_list", &self.wait_list)
            .field("event", &self.event)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{HostEvent, ReferenceQueue};

    #[test]
    fn new_session_is_empty() {
        let queue = ReferenceQueue::new();
        let cache = KernelCache::new();
        let session = Session::new(&queue, &cache);
        assert!(session.wait_list().is_empty());
        assert!(session.completion_event().is_none());
        assert_eq!(session.api_version(), ApiVersion::BUILD);
        assert_eq!(session.planner().group_size(), 256);
    }

    #[test]
    fn from_config_applies_version_and_group_size() {
        let queue = ReferenceQueue::new();
        let cache = KernelCache::new();
        let config = ClsparseConfig {
            api_version: ApiVersion::OPENCL_1_2,
            work_group_size: 64,
            ..Default::default()
        };
        let session = Session::from_config(&queue, &cache, &config);
        assert_eq!(session.api_version(), ApiVersion::OPENCL_1_2);
        assert_eq!(session.planner().group_size(), 64);
    }

    #[test]
    fn complete_replaces_wait_list_with_event() {
        let queue = ReferenceQueue::new();
        let cache = KernelCache::new();
        let session = Session::new(&queue, &cache).wait_for([HostEvent::new(1), HostEvent::new(2)]);
        assert_eq!(session.wait_list().len(), 2);

        let session = session.complete(HostEvent::new(3));
        assert_eq!(session.wait_list(), &[HostEvent::new(3)]);
        assert_eq!(session.completion_event(), Some(&HostEvent::new(3)));
        assert_eq!(session.into_completion_event(), Some(HostEvent::new(3)));
    }

    #[test]
    fn debug_lists_version() {
        let queue = ReferenceQueue::new();
        let cache = KernelCache::new();
        let session = Session::new(&queue, &cache).with_api_version(ApiVersion::OPENCL_1_2);
        let dbg = format!("{session:?}");
        assert!(dbg.contains("Session"));
        assert!(dbg.contains("api_version"));
    }
}
