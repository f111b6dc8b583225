use crate::error::ReduceError;
use crate::pipeline::Statistics;

/// Scalar CPU reference implementation for F32 statistics.
/// Two passes in f64; population standard deviation.
pub fn stats_f32(data: &[f32]) -> Result<Statistics, ReduceError> {
    if data.is_empty() {
        return Err(ReduceError::EmptySample);
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;

    for &val in data {
        min = min.min(val);
        max = max.max(val);
        sum += val as f64;
    }

    let n = data.len() as f64;
    let mean = sum / n;
    let sq_dev: f64 = data
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum();

    Ok(Statistics {
        mean: mean as f32,
        min,
        max,
        stdev: (sq_dev / n).sqrt() as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_textbook_series() {
        let stats = stats_f32(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.stdev, 2.0);
    }

    #[test]
    fn test_reference_rejects_empty() {
        assert!(matches!(stats_f32(&[]), Err(ReduceError::EmptySample)));
    }
}
