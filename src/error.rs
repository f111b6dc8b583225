//! Error taxonomy for the reduction engine.
//!
//! Every pipeline stage returns `Result<_, ReduceError>`; the binary decides
//! what is fatal. Nothing here is retried.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("no compute device at platform {platform}, device {device}: {reason}")]
    BackendUnavailable {
        platform: usize,
        device: usize,
        reason: String,
    },

    #[error("kernel program failed to build (status {status}, options '{options}')\n{log}")]
    Build {
        status: i32,
        options: String,
        log: String,
    },

    #[error("kernel '{name}' not found in the built program")]
    MissingKernel { name: String },

    #[error("dispatch of '{kernel}' rejected by backend ({code}): {message}")]
    Dispatch {
        kernel: String,
        code: i32,
        message: String,
    },

    #[error("work-group size {group_size} is invalid (device maximum {max})")]
    InvalidGroupSize { group_size: usize, max: usize },

    #[error("kernel '{kernel}' called with the wrong scalar argument")]
    ScalarArgument { kernel: String },

    #[error("sample sequence is empty")]
    EmptySample,

    #[error("line {line}: trailing token '{token}' is not a number")]
    MalformedLine { line: usize, token: String },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} pass failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ReduceError>,
    },
}

impl ReduceError {
    /// Wrap an error with the name of the pipeline pass that produced it.
    pub fn in_stage(self, stage: &'static str) -> Self {
        ReduceError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through `Stage` wrappers.
    pub fn root(&self) -> &ReduceError {
        match self {
            ReduceError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// OpenCL status codes used by the host backend so that both backends report
/// the same numbers for the same failure.
pub mod codes {
    pub const CL_INVALID_KERNEL_NAME: i32 = -46;
    pub const CL_INVALID_WORK_GROUP_SIZE: i32 = -54;
    pub const CL_INVALID_BUFFER_SIZE: i32 = -61;
    pub const CL_INVALID_GLOBAL_WORK_SIZE: i32 = -63;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_root() {
        let err = ReduceError::MissingKernel {
            name: "reduce_min".to_string(),
        }
        .in_stage("min");

        assert_eq!(err.to_string(), "min pass failed");
        assert!(matches!(err.root(), ReduceError::MissingKernel { name } if name == "reduce_min"));
    }

    #[test]
    fn test_build_error_carries_log() {
        let err = ReduceError::Build {
            status: -2,
            options: "-cl-std=CL1.2".to_string(),
            log: "kernels.cl:3: error: expected ';'".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("status -2"));
        assert!(text.contains("-cl-std=CL1.2"));
        assert!(text.contains("expected ';'"));
    }
}
