//! `clsparse-opencl`: dense level-1 routines on device-resident vectors.
//!
//! Scaling a vector by a multiplier held in device memory goes through a
//! short pipeline:
//!
//! | Step              | Module       | Role                                      |
//! |-------------------|--------------|-------------------------------------------|
//! | Scalar inspection | `mapping`    | Blocking map of the multiplier            |
//! | Strategy          | `strategy`   | Vendor `scal` below API 2.0, else kernel  |
//! | Zero fast path    | `blas1`      | Device fill when the multiplier is zero   |
//! | Launch planning   | `launch`     | Whole work-groups covering `n` elements   |
//! | Kernel dispatch   | `dispatch`   | Cached `blas1/scale`, fixed argument order|
//!
//! Backends implement [`DeviceQueue`] and [`VendorBlas`]. The `opencl`
//! feature enables [`cl::ClQueue`]; [`reference::ReferenceQueue`] runs the
//! same contract on host memory.
//!
//! # Usage
//!
//! ```rust
//! use clsparse_opencl::reference::ReferenceQueue;
//! use clsparse_opencl::{DeviceScalar, DeviceVector, KernelCache, Session, sscale};
//!
//! let queue = ReferenceQueue::new();
//! let kernels = KernelCache::new();
//! let mut values = queue.create_buffer(&[1.0f32, 2.0, 3.0, 4.0]);
//! let alpha = queue.create_buffer(&[2.0f32]);
//!
//! let mut vector = DeviceVector::<ReferenceQueue, f32>::new(&mut values, 4);
//! let scalar = DeviceScalar::<ReferenceQueue, f32>::new(&alpha);
//! let session = Session::new(&queue, &kernels);
//! let session = sscale(&mut vector, &scalar, session).unwrap();
//! assert!(session.completion_event().is_some());
//! assert_eq!(queue.read(&values), vec![2.0, 4.0, 6.0, 8.0]);
//! ```

pub mod blas1;
#[cfg(feature = "opencl")]
pub mod cl;
pub mod dispatch;
pub mod kernel_cache;
pub mod kernels;
pub mod launch;
pub mod mapping;
pub mod queue;
pub mod reference;
pub mod session;
pub mod strategy;
pub mod vector;

pub use blas1::{dscale, scale, sscale};
pub use clsparse_common::{ApiVersion, ClsparseConfig, ClsparseError, Element, Result, Status};
pub use dispatch::KernelParams;
pub use kernel_cache::{CacheStats, KernelCache, KernelKey};
pub use kernels::KernelSource;
pub use launch::{LaunchGeometry, LaunchPlanner};
pub use mapping::ScalarMapping;
pub use queue::{DeviceError, DeviceOp, DeviceQueue, KernelArg, VendorBlas, check_status};
pub use session::Session;
pub use strategy::ScaleStrategy;
pub use vector::{DeviceScalar, DeviceVector};
