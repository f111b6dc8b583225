use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accel::cpu::CpuBackend;
use crate::accel::{reference, ComputeBackend, PlatformListing};
use crate::config::BackendConfig;
use crate::error::ReduceError;
use crate::pipeline::Statistics;

/// Relative tolerance for the debug cross-check against the scalar reference.
pub const REFERENCE_TOLERANCE: f32 = 1e-3;

/// Backend types for reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenCL if a device is available, host otherwise
    Auto,
    /// Host threads emulating work-groups
    Cpu,
    /// OpenCL device selected by platform/device index
    #[value(name = "opencl")]
    OpenCl,
}

/// Builds backends and checks their results.
pub struct AccelerationManager;

impl AccelerationManager {
    /// Create the backend named by `config`. `Auto` falls back to the host
    /// backend only when no OpenCL device can be opened; build failures are
    /// returned as-is.
    pub fn select(
        config: &BackendConfig,
        kernel_source: &str,
    ) -> Result<Box<dyn ComputeBackend>, ReduceError> {
        let backend: Box<dyn ComputeBackend> = match config.kind {
            BackendKind::Cpu => Box::new(CpuBackend::with_max_work_group_size(
                config.cpu_max_work_group_size,
            )),
            BackendKind::OpenCl => Self::open_cl(config, kernel_source)?,
            BackendKind::Auto => match Self::open_cl(config, kernel_source) {
                Ok(backend) => backend,
                Err(ReduceError::BackendUnavailable { reason, .. }) => {
                    warn!(%reason, "OpenCL unavailable, using host backend");
                    Box::new(CpuBackend::with_max_work_group_size(
                        config.cpu_max_work_group_size,
                    ))
                }
                Err(e) => return Err(e),
            },
        };

        let info = backend.info();
        info!(
            platform = %info.platform,
            device = %info.name,
            max_work_group_size = info.max_work_group_size,
            "backend selected"
        );
        Ok(backend)
    }

    #[cfg(feature = "opencl")]
    fn open_cl(
        config: &BackendConfig,
        kernel_source: &str,
    ) -> Result<Box<dyn ComputeBackend>, ReduceError> {
        let backend = crate::accel::opencl::OpenClBackend::new(
            config.platform,
            config.device,
            kernel_source,
            "",
        )?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "opencl"))]
    fn open_cl(
        config: &BackendConfig,
        _kernel_source: &str,
    ) -> Result<Box<dyn ComputeBackend>, ReduceError> {
        Err(ReduceError::BackendUnavailable {
            platform: config.platform,
            device: config.device,
            reason: "built without the `opencl` feature".to_string(),
        })
    }

    /// OpenCL platforms and their devices. Empty when OpenCL is not compiled
    /// in or no runtime is installed.
    pub fn list_platforms() -> Vec<PlatformListing> {
        #[cfg(feature = "opencl")]
        {
            crate::accel::opencl::list_platforms()
        }
        #[cfg(not(feature = "opencl"))]
        {
            Vec::new()
        }
    }

    /// Compare pipeline output with the scalar reference.
    pub fn matches_reference(stats: &Statistics, samples: &[f32]) -> Result<bool, ReduceError> {
        let reference = reference::stats_f32(samples)?;
        Ok(close(stats.mean, reference.mean)
            && close(stats.min, reference.min)
            && close(stats.max, reference.max)
            && close(stats.stdev, reference.stdev))
    }

    /// In debug builds, verify against the scalar reference and warn on
    /// mismatch. Never fails the run.
    pub fn verify_against_reference(stats: &Statistics, samples: &[f32]) {
        #[cfg(debug_assertions)]
        {
            match Self::matches_reference(stats, samples) {
                Ok(true) => tracing::debug!("reference verification passed"),
                Ok(false) => {
                    let reference = reference::stats_f32(samples).ok();
                    warn!(
                        ?stats,
                        ?reference,
                        "Acceleration mismatch! Backend result differs from scalar reference."
                    );
                }
                Err(e) => tracing::debug!(error = %e, "reference verification skipped"),
            }
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = (stats, samples);
        }
    }
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= REFERENCE_TOLERANCE * b.abs().max(1.0)
}
