//! Two-stage work-group reduction: pad, reduce per group on the device,
//! combine group partials on the host.

pub mod finalize;
pub mod pad;
pub mod partial;

use serde::{Deserialize, Serialize};

pub use finalize::finalize;
pub use pad::{pad, pad_count, Padded};
pub use partial::{PartialReducer, PartialResults};

/// Reduction operator. Each operator fixes its kernel name, its neutral
/// padding element and its finalisation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
    /// Sum of `(x - mean)^2`; needs the mean as a scalar argument.
    SquaredDeviation,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 4] = [
        ReduceOp::Sum,
        ReduceOp::Min,
        ReduceOp::Max,
        ReduceOp::SquaredDeviation,
    ];

    pub fn kernel_name(self) -> &'static str {
        match self {
            ReduceOp::Sum => "reduce_add",
            ReduceOp::Min => "reduce_min",
            ReduceOp::Max => "reduce_max",
            ReduceOp::SquaredDeviation => "reduce_std",
        }
    }

    pub fn from_kernel_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.kernel_name() == name)
    }

    /// Value appended when padding. It must not change the group result:
    /// padding for min/max can never win, and the additive identity is
    /// used for the sums (the variance pass corrects for it afterwards).
    pub fn neutral(self) -> f32 {
        match self {
            ReduceOp::Sum | ReduceOp::SquaredDeviation => 0.0,
            ReduceOp::Min => f32::INFINITY,
            ReduceOp::Max => f32::NEG_INFINITY,
        }
    }

    pub fn takes_scalar(self) -> bool {
        matches!(self, ReduceOp::SquaredDeviation)
    }

    /// Label used in logs and reports.
    pub fn label(self) -> &'static str {
        match self {
            ReduceOp::Sum => "Addition",
            ReduceOp::Min => "Minimum",
            ReduceOp::Max => "Maximum",
            ReduceOp::SquaredDeviation => "Standard Deviation",
        }
    }
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Work-group size per operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSizes {
    pub add: usize,
    pub min: usize,
    pub max: usize,
    pub std: usize,
}

impl Default for GroupSizes {
    fn default() -> Self {
        Self {
            add: 32,
            min: 256,
            max: 64,
            std: 32,
        }
    }
}

impl GroupSizes {
    pub fn uniform(size: usize) -> Self {
        Self {
            add: size,
            min: size,
            max: size,
            std: size,
        }
    }

    pub fn for_op(&self, op: ReduceOp) -> usize {
        match op {
            ReduceOp::Sum => self.add,
            ReduceOp::Min => self.min,
            ReduceOp::Max => self.max,
            ReduceOp::SquaredDeviation => self.std,
        }
    }
}
