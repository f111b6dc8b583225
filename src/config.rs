//! TOML configuration for tempreduce.
//!
//! Layered: compiled-in defaults, then a config file (from the
//! `TEMPREDUCE_CONFIG` environment variable or `./tempreduce.toml`), then
//! command-line flags applied by the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::accel::BackendKind;
use crate::accel::cpu::DEFAULT_MAX_WORK_GROUP_SIZE;
use crate::loader::MalformedPolicy;
use crate::reduce::GroupSizes;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TEMPREDUCE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "tempreduce.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub groups: GroupSizes,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub kernels: KernelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StatsConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: `$TEMPREDUCE_CONFIG`, `./tempreduce.toml`, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TEMPREDUCE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Compute backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Platform index (OpenCL).
    pub platform: usize,
    /// Device index within the platform (OpenCL).
    pub device: usize,
    /// Work-group ceiling for the host backend.
    pub cpu_max_work_group_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Auto,
            platform: 0,
            device: 0,
            cpu_max_work_group_size: DEFAULT_MAX_WORK_GROUP_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Text file with one reading per line (last token).
    pub path: PathBuf,
    pub malformed: MalformedPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("temp_lincolnshire.txt"),
            malformed: MalformedPolicy::Fail,
        }
    }
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Kernel program source; the embedded program is used when unset.
    pub source: Option<PathBuf>,
}

impl KernelConfig {
    /// Program text: the configured file, or the embedded default.
    pub fn load_source(&self) -> Result<String> {
        match &self.source {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read kernel source: {}", path.display())),
            None => Ok(crate::accel::DEFAULT_KERNEL_SOURCE.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
