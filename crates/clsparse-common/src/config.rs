//! Runtime configuration for clsparse-rs device routines.
//!
//! Loads [`ClsparseConfig`] from a TOML file (`clsparse.toml`) with
//! environment variable overrides via `CLSPARSE_*` prefixed variables.

use crate::version::ApiVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest work-group size accepted by validation.
pub const MAX_WORK_GROUP_SIZE: u32 = 1024;

/// Default work-group size for 1-D elementwise kernels.
pub const DEFAULT_WORK_GROUP_SIZE: u32 = 256;

/// Configuration loaded from TOML with environment variable overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClsparseConfig {
    /// Device-API generation used for strategy selection.
    /// Override: `CLSPARSE_CL_VERSION`
    pub api_version: ApiVersion,

    /// Work-group size for the custom dense kernels.
    /// Override: `CLSPARSE_WORK_GROUP_SIZE`
    pub work_group_size: u32,

    /// Zero-based OpenCL platform index.
    /// Override: `CLSPARSE_PLATFORM_INDEX`
    pub platform_index: usize,

    /// Zero-based device index within the platform.
    /// Override: `CLSPARSE_DEVICE_INDEX`
    pub device_index: usize,

    /// Create command queues with profiling enabled.
    /// Override: `CLSPARSE_ENABLE_PROFILING`
    pub enable_profiling: bool,
}

impl Default for ClsparseConfig {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::BUILD,
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
            platform_index: 0,
            device_index: 0,
            enable_profiling: false,
        }
    }
}

/// Errors that can occur when loading or validating a [`ClsparseConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl ClsparseConfig {
    /// Render the default configuration as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields, then apply environment variable overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: ClsparseConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load only from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.work_group_size == 0 {
            return Err(ConfigError::Validation("work_group_size must be > 0".into()));
        }
        if !self.work_group_size.is_power_of_two() {
            return Err(ConfigError::Validation(format!(
                "work_group_size must be a power of two, got {}",
                self.work_group_size
            )));
        }
        if self.work_group_size > MAX_WORK_GROUP_SIZE {
            return Err(ConfigError::Validation(format!(
                "work_group_size must be <= {MAX_WORK_GROUP_SIZE}, got {}",
                self.work_group_size
            )));
        }
        if self.api_version < ApiVersion::new(1, 0) {
            return Err(ConfigError::Validation(format!(
                "api_version must be at least 1.0, got {}",
                self.api_version
            )));
        }
        if !self.api_version.is_canonical() {
            return Err(ConfigError::Validation(format!(
                "api_version must be a multiple of 10 in packed form, got {}",
                self.api_version.raw()
            )));
        }
        Ok(())
    }

    /// Apply `CLSPARSE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("CLSPARSE_CL_VERSION") {
            self.api_version = val.parse::<ApiVersion>().map_err(|reason| ConfigError::EnvOverride {
                key: "CLSPARSE_CL_VERSION".into(),
                value: val.clone(),
                reason,
            })?;
        }

        if let Ok(val) = std::env::var("CLSPARSE_WORK_GROUP_SIZE") {
            self.work_group_size = val.parse::<u32>().map_err(|e| ConfigError::EnvOverride {
                key: "CLSPARSE_WORK_GROUP_SIZE".into(),
                value: val.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Ok(val) = std::env::var("CLSPARSE_PLATFORM_INDEX") {
            self.platform_index = val.parse::<usize>().map_err(|e| ConfigError::EnvOverride {
                key: "CLSPARSE_PLATFORM_INDEX".into(),
                value: val.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Ok(val) = std::env::var("CLSPARSE_DEVICE_INDEX") {
            self.device_index = val.parse::<usize>().map_err(|e| ConfigError::EnvOverride {
                key: "CLSPARSE_DEVICE_INDEX".into(),
                value: val.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Ok(val) = std::env::var("CLSPARSE_ENABLE_PROFILING") {
            self.enable_profiling = matches!(val.as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: [&str; 5] = [
        "CLSPARSE_CL_VERSION",
        "CLSPARSE_WORK_GROUP_SIZE",
        "CLSPARSE_PLATFORM_INDEX",
        "CLSPARSE_DEVICE_INDEX",
        "CLSPARSE_ENABLE_PROFILING",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        ALL_VARS.iter().map(|k| (*k, None)).collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = ClsparseConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.work_group_size, 256);
        assert_eq!(cfg.api_version, ApiVersion::BUILD);
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_default_toml_round_trips() {
        temp_env::with_vars(cleared(), || {
            let toml_str = ClsparseConfig::default_toml().unwrap();
            let cfg = ClsparseConfig::from_toml(&toml_str).unwrap();
            assert_eq!(cfg, ClsparseConfig::default());
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_from_toml_full() {
        let toml_str = r#"
api_version = 120
work_group_size = 128
platform_index = 1
device_index = 2
enable_profiling = true
"#;
        temp_env::with_vars(cleared(), || {
            let cfg = ClsparseConfig::from_toml(toml_str).unwrap();
            assert_eq!(cfg.api_version, ApiVersion::OPENCL_1_2);
            assert_eq!(cfg.work_group_size, 128);
            assert_eq!(cfg.platform_index, 1);
            assert_eq!(cfg.device_index, 2);
            assert!(cfg.enable_profiling);
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_from_toml_partial_uses_defaults() {
        temp_env::with_vars(cleared(), || {
            let cfg = ClsparseConfig::from_toml("work_group_size = 64").unwrap();
            assert_eq!(cfg.work_group_size, 64);
            assert_eq!(cfg.device_index, 0);
            assert_eq!(cfg.api_version, ApiVersion::BUILD);
        });
    }

    #[test]
    fn test_validation_work_group_size_zero() {
        let cfg = ClsparseConfig { work_group_size: 0, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("work_group_size must be > 0"));
    }

    #[test]
    fn test_validation_work_group_size_not_power_of_two() {
        let cfg = ClsparseConfig { work_group_size: 100, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn test_validation_work_group_size_too_large() {
        let cfg = ClsparseConfig { work_group_size: 2048, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("<= 1024"));
    }

    #[test]
    fn test_validation_api_version_too_old() {
        let cfg =
            ClsparseConfig { api_version: ApiVersion::from_raw(90), ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("api_version"));
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_env_override_multiple_fields() {
        temp_env::with_vars(
            [
                ("CLSPARSE_CL_VERSION", Some("1.2")),
                ("CLSPARSE_WORK_GROUP_SIZE", Some("512")),
                ("CLSPARSE_PLATFORM_INDEX", Some("1")),
                ("CLSPARSE_DEVICE_INDEX", Some("3")),
                ("CLSPARSE_ENABLE_PROFILING", Some("yes")),
            ],
            || {
                let cfg = ClsparseConfig::from_env().unwrap();
                assert_eq!(cfg.api_version, ApiVersion::OPENCL_1_2);
                assert_eq!(cfg.work_group_size, 512);
                assert_eq!(cfg.platform_index, 1);
                assert_eq!(cfg.device_index, 3);
                assert!(cfg.enable_profiling);
            },
        );
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_env_override_beats_file() {
        let mut vars = cleared();
        vars[1] = ("CLSPARSE_WORK_GROUP_SIZE", Some("32"));
        temp_env::with_vars(vars, || {
            let cfg = ClsparseConfig::from_toml("work_group_size = 64").unwrap();
            assert_eq!(cfg.work_group_size, 32);
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_env_override_invalid_version() {
        let mut vars = cleared();
        vars[0] = ("CLSPARSE_CL_VERSION", Some("latest"));
        temp_env::with_vars(vars, || match ClsparseConfig::from_env().unwrap_err() {
            ConfigError::EnvOverride { key, value, .. } => {
                assert_eq!(key, "CLSPARSE_CL_VERSION");
                assert_eq!(value, "latest");
            }
            other => panic!("expected EnvOverride, got: {other}"),
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_env_override_overflowing_version() {
        let mut vars = cleared();
        vars[0] = ("CLSPARSE_CL_VERSION", Some("99999999.0"));
        temp_env::with_vars(vars, || match ClsparseConfig::from_env().unwrap_err() {
            ConfigError::EnvOverride { key, reason, .. } => {
                assert_eq!(key, "CLSPARSE_CL_VERSION");
                assert!(reason.contains("out of range"), "{reason}");
            }
            other => panic!("expected EnvOverride, got: {other}"),
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_env_override_non_canonical_version() {
        let mut vars = cleared();
        vars[0] = ("CLSPARSE_CL_VERSION", Some("129"));
        temp_env::with_vars(vars, || {
            let err = ClsparseConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::EnvOverride { .. }));
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_toml_non_canonical_version_rejected() {
        temp_env::with_vars(cleared(), || {
            let err = ClsparseConfig::from_toml("api_version = 129").unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)));
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_env_override_rejected_by_validation() {
        let mut vars = cleared();
        vars[1] = ("CLSPARSE_WORK_GROUP_SIZE", Some("300"));
        temp_env::with_vars(vars, || {
            let err = ClsparseConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)));
        });
    }

    #[test]
    #[serial(clsparse_env)]
    fn test_load_from_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clsparse.toml");
        std::fs::write(&path, ClsparseConfig::default_toml().unwrap()).unwrap();
        temp_env::with_vars(cleared(), || {
            let cfg = ClsparseConfig::load(&path).unwrap();
            assert_eq!(cfg, ClsparseConfig::default());
        });
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ClsparseConfig::load(Path::new("/nonexistent/clsparse.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = ClsparseConfig::from_toml("work_group_size = \"lots\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
