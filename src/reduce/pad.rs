//! Padding a sample sequence up to a multiple of the work-group size.

use crate::error::ReduceError;

/// A padded copy of the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Padded {
    pub values: Vec<f32>,
    pub pad_count: usize,
}

impl Padded {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Number of neutral elements needed so that `len + pad` divides evenly.
/// Panics if `group_size` is zero; use [`pad`] for checked input.
pub fn pad_count(len: usize, group_size: usize) -> usize {
    (group_size - len % group_size) % group_size
}

/// Copy `samples` and append `neutral` until the length is a multiple of
/// `group_size`.
pub fn pad(samples: &[f32], group_size: usize, neutral: f32) -> Result<Padded, ReduceError> {
    if group_size == 0 {
        return Err(ReduceError::InvalidGroupSize { group_size, max: 0 });
    }

    let pad_count = pad_count(samples.len(), group_size);
    let mut values = Vec::with_capacity(samples.len() + pad_count);
    values.extend_from_slice(samples);
    values.resize(samples.len() + pad_count, neutral);

    Ok(Padded { values, pad_count })
}
