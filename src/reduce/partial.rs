//! One reduction pass: pad for the operator, dispatch, read back.

use tracing::debug;

use crate::accel::{ComputeBackend, DispatchRequest};
use crate::error::ReduceError;
use crate::profiling::StageTimings;
use crate::reduce::{pad, ReduceOp};

/// Read-back of one pass. Only `values[k * group_size]` carry results.
#[derive(Debug, Clone)]
pub struct PartialResults {
    pub op: ReduceOp,
    pub values: Vec<f32>,
    pub group_size: usize,
    pub pad_count: usize,
    /// Unpadded sample count.
    pub sample_len: usize,
    pub timings: StageTimings,
}

impl PartialResults {
    pub fn group_count(&self) -> usize {
        self.values.len().checked_div(self.group_size).unwrap_or(0)
    }

    /// The per-group results, in group order. Empty when `group_size` is 0.
    pub fn group_bases(&self) -> impl Iterator<Item = f32> + '_ {
        let step = self.group_size.max(1);
        let take = if self.group_size == 0 { 0 } else { self.values.len() };
        self.values[..take].iter().step_by(step).copied()
    }
}

/// Runs single reduction passes against a backend handle.
pub struct PartialReducer<'a> {
    backend: &'a dyn ComputeBackend,
}

impl<'a> PartialReducer<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        Self { backend }
    }

    /// Pad `samples` with `op`'s neutral element and reduce each work-group
    /// of `group_size` elements on the backend. Blocks until the partial
    /// results are back on the host.
    ///
    /// `scalar` must be `Some(mean)` for [`ReduceOp::SquaredDeviation`] and
    /// `None` otherwise.
    pub fn reduce(
        &self,
        samples: &[f32],
        op: ReduceOp,
        group_size: usize,
        scalar: Option<f32>,
    ) -> Result<PartialResults, ReduceError> {
        if samples.is_empty() {
            return Err(ReduceError::EmptySample);
        }

        let max = self.backend.max_work_group_size();
        if group_size == 0 || group_size > max {
            return Err(ReduceError::InvalidGroupSize { group_size, max });
        }

        if op.takes_scalar() != scalar.is_some() {
            return Err(ReduceError::ScalarArgument {
                kernel: op.kernel_name().to_string(),
            });
        }

        let padded = pad(samples, group_size, op.neutral())?;
        let request = DispatchRequest {
            kernel: op.kernel_name(),
            input: &padded.values,
            group_size,
            scalar,
        };

        debug!(
            kernel = request.kernel,
            group_size,
            groups = request.groups(),
            pad_count = padded.pad_count,
            "dispatching reduction"
        );

        let outcome = self.backend.dispatch(&request)?;
        if outcome.output.len() != padded.len() {
            return Err(ReduceError::Dispatch {
                kernel: op.kernel_name().to_string(),
                code: crate::error::codes::CL_INVALID_BUFFER_SIZE,
                message: format!(
                    "read back {} values, expected {}",
                    outcome.output.len(),
                    padded.len()
                ),
            });
        }

        Ok(PartialResults {
            op,
            values: outcome.output,
            group_size,
            pad_count: padded.pad_count,
            sample_len: samples.len(),
            timings: StageTimings {
                op,
                kernel: outcome.kernel,
                read: outcome.read,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::cpu::CpuBackend;

    #[test]
    fn test_partials_for_unaligned_input() {
        let backend = CpuBackend::new();
        let reducer = PartialReducer::new(&backend);
        let partials = reducer
            .reduce(&[1.0, 2.0, 3.0, 4.0, 5.0], ReduceOp::Sum, 2, None)
            .unwrap();

        assert_eq!(partials.pad_count, 1);
        assert_eq!(partials.sample_len, 5);
        assert_eq!(partials.group_count(), 3);
        assert_eq!(partials.group_bases().collect::<Vec<_>>(), vec![3.0, 7.0, 5.0]);
    }

    #[test]
    fn test_group_size_above_device_limit() {
        let backend = CpuBackend::with_max_work_group_size(64);
        let reducer = PartialReducer::new(&backend);
        let err = reducer
            .reduce(&[1.0; 10], ReduceOp::Min, 256, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ReduceError::InvalidGroupSize { group_size: 256, max: 64 }
        ));
    }

    #[test]
    fn test_variance_needs_mean() {
        let backend = CpuBackend::new();
        let reducer = PartialReducer::new(&backend);
        let err = reducer
            .reduce(&[1.0, 2.0], ReduceOp::SquaredDeviation, 2, None)
            .unwrap_err();
        assert!(matches!(err, ReduceError::ScalarArgument { .. }));
    }

    #[test]
    fn test_empty_samples() {
        let backend = CpuBackend::new();
        let reducer = PartialReducer::new(&backend);
        assert!(matches!(
            reducer.reduce(&[], ReduceOp::Sum, 32, None),
            Err(ReduceError::EmptySample)
        ));
    }
}
