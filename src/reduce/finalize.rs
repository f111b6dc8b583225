//! Host-side combination of group partials into one statistic.
//!
//! Kernels only reduce within a work-group, so every rule here scans all
//! group bases rather than trusting slot 0.

use crate::error::ReduceError;
use crate::reduce::{PartialResults, ReduceOp};

/// Combine the partials of one pass. `mean` is required for
/// [`ReduceOp::SquaredDeviation`], where the result is the population
/// standard deviation; for the other operators it is ignored.
pub fn finalize(partials: &PartialResults, mean: Option<f32>) -> Result<f32, ReduceError> {
    if partials.sample_len == 0 {
        return Err(ReduceError::EmptySample);
    }
    if partials.group_size == 0 {
        return Err(ReduceError::InvalidGroupSize {
            group_size: 0,
            max: partials.values.len(),
        });
    }

    match partials.op {
        ReduceOp::Sum => Ok(mean_of(partials)),
        ReduceOp::Min => Ok(partials.group_bases().fold(f32::INFINITY, f32::min)),
        ReduceOp::Max => Ok(partials.group_bases().fold(f32::NEG_INFINITY, f32::max)),
        ReduceOp::SquaredDeviation => {
            let mean = mean.ok_or_else(|| ReduceError::ScalarArgument {
                kernel: partials.op.kernel_name().to_string(),
            })?;
            Ok(stdev_of(partials, mean))
        }
    }
}

/// Sum over groups divided by the unpadded count; padding added zeros.
fn mean_of(partials: &PartialResults) -> f32 {
    let total: f64 = partials.group_bases().map(f64::from).sum();
    (total / partials.sample_len as f64) as f32
}

/// Each zero pad scored `(0 - mean)^2` in the kernel; remove those before
/// scaling by the unpadded count.
fn stdev_of(partials: &PartialResults, mean: f32) -> f32 {
    let raw: f64 = partials.group_bases().map(f64::from).sum();
    let mean = f64::from(mean);
    let correction = partials.pad_count as f64 * mean * mean;
    let corrected = (raw - correction).max(0.0);
    (corrected / partials.sample_len as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::{ProfileSpan, StageTimings};

    fn partials(
        op: ReduceOp,
        values: Vec<f32>,
        group_size: usize,
        pad_count: usize,
        sample_len: usize,
    ) -> PartialResults {
        PartialResults {
            op,
            values,
            group_size,
            pad_count,
            sample_len,
            timings: StageTimings {
                op,
                kernel: ProfileSpan::default(),
                read: ProfileSpan::default(),
            },
        }
    }

    #[test]
    fn test_mean_divides_by_unpadded_len() {
        // groups of 4 over 6 samples + 2 pads
        let p = partials(ReduceOp::Sum, vec![10.0, 0.0, 0.0, 0.0, 11.0, 0.0, 0.0, 0.0], 4, 2, 6);
        assert_eq!(finalize(&p, None).unwrap(), 3.5);
    }

    #[test]
    fn test_min_scans_every_group() {
        // garbage in non-base slots must be ignored
        let p = partials(ReduceOp::Min, vec![4.0, -99.0, 2.0, -99.0, 7.0, -99.0], 2, 0, 6);
        assert_eq!(finalize(&p, None).unwrap(), 2.0);
    }

    #[test]
    fn test_max_scans_every_group() {
        let p = partials(ReduceOp::Max, vec![4.0, 99.0, 2.0, 99.0, 7.0, 99.0], 2, 0, 6);
        assert_eq!(finalize(&p, None).unwrap(), 7.0);
    }

    #[test]
    fn test_stdev_removes_padding_contribution() {
        // [2,4,4,4,5,5,7,9] padded to 10: deviations sum to 32, pads add 2 * 25
        let p = partials(
            ReduceOp::SquaredDeviation,
            vec![12.0, 0.0, 0.0, 0.0, 0.0, 70.0, 0.0, 0.0, 0.0, 0.0],
            5,
            2,
            8,
        );
        let stdev = finalize(&p, Some(5.0)).unwrap();
        assert!((stdev - 2.0).abs() < 1e-4, "stdev = {}", stdev);
    }

    #[test]
    fn test_stdev_clamps_rounding_below_zero() {
        let p = partials(ReduceOp::SquaredDeviation, vec![24.999998, 0.0], 2, 1, 1);
        assert_eq!(finalize(&p, Some(5.0)).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let p = partials(ReduceOp::Min, vec![4.0, 2.0], 0, 0, 2);
        assert_eq!(p.group_count(), 0);
        assert_eq!(p.group_bases().count(), 0);
        assert!(matches!(
            finalize(&p, None),
            Err(ReduceError::InvalidGroupSize { group_size: 0, max: 2 })
        ));
    }

    #[test]
    fn test_stdev_without_mean() {
        let p = partials(ReduceOp::SquaredDeviation, vec![1.0], 1, 0, 1);
        assert!(matches!(finalize(&p, None), Err(ReduceError::ScalarArgument { .. })));
    }
}
