//! Common types shared across the clsparse-rs workspace.
//!
//! This crate holds the pieces every backend agrees on:
//!
//! - [`error`]: the single execution-failure taxonomy and the upward [`Status`]
//! - [`config`]: TOML configuration with `CLSPARSE_*` environment overrides
//! - [`precision`]: the closed set of device element types (`f32`, `f64`)
//! - [`version`]: the device-API generation marker used for strategy selection

pub mod config;
pub mod error;
pub mod precision;
pub mod version;

pub use config::{ClsparseConfig, ConfigError};
pub use error::{ClsparseError, Result, Status};
pub use precision::{Element, ElementPrecision, SIZE_TYPE};
pub use version::ApiVersion;
