//! Statistics pipeline: sum -> min -> max -> variance.
//!
//! The variance pass takes the mean as a kernel input, so the sum pass must
//! finish first. Min and max have no dependency but run in order too; one
//! controlling thread, one dispatch in flight.

use serde::Serialize;
use tracing::info;

use crate::accel::ComputeBackend;
use crate::error::ReduceError;
use crate::profiling::StageTimings;
use crate::reduce::{finalize, GroupSizes, PartialReducer, ReduceOp};

/// The four scalar results of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    /// Population standard deviation.
    pub stdev: f32,
}

/// Pipeline position. Each state carries what the earlier passes produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    Start,
    SumReduced { mean: f32 },
    MinReduced { mean: f32, min: f32 },
    MaxReduced { mean: f32, min: f32, max: f32 },
    VarianceReduced(Statistics),
    Done(Statistics),
}

impl Stage {
    /// Name of the pass that leaves this state.
    pub fn next_pass(&self) -> Option<&'static str> {
        match self {
            Stage::Start => Some("sum"),
            Stage::SumReduced { .. } => Some("min"),
            Stage::MinReduced { .. } => Some("max"),
            Stage::MaxReduced { .. } => Some("variance"),
            Stage::VarianceReduced(_) | Stage::Done(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub statistics: Statistics,
    /// One entry per pass, in execution order.
    pub timings: Vec<StageTimings>,
}

pub struct StatisticsPipeline<'a> {
    reducer: PartialReducer<'a>,
    groups: GroupSizes,
    timings: Vec<StageTimings>,
}

impl<'a> StatisticsPipeline<'a> {
    pub fn new(backend: &'a dyn ComputeBackend, groups: GroupSizes) -> Self {
        Self {
            reducer: PartialReducer::new(backend),
            groups,
            timings: Vec::with_capacity(ReduceOp::ALL.len()),
        }
    }

    /// Run every pass to completion. Any failed pass aborts the run; the
    /// error names the pass.
    pub fn run(mut self, samples: &[f32]) -> Result<PipelineOutput, ReduceError> {
        if samples.is_empty() {
            return Err(ReduceError::EmptySample);
        }

        info!(samples = samples.len(), groups = ?self.groups, "starting statistics pipeline");

        let mut stage = Stage::Start;
        loop {
            stage = self.step(stage, samples)?;
            if let Stage::Done(statistics) = stage {
                return Ok(PipelineOutput {
                    statistics,
                    timings: self.timings,
                });
            }
        }
    }

    /// Advance by one transition.
    pub fn step(&mut self, stage: Stage, samples: &[f32]) -> Result<Stage, ReduceError> {
        let next = match stage {
            Stage::Start => {
                let mean = self.pass(samples, ReduceOp::Sum, None, "sum")?;
                info!(mean, "sum pass complete");
                Stage::SumReduced { mean }
            }
            Stage::SumReduced { mean } => {
                let min = self.pass(samples, ReduceOp::Min, None, "min")?;
                info!(min, "min pass complete");
                Stage::MinReduced { mean, min }
            }
            Stage::MinReduced { mean, min } => {
                let max = self.pass(samples, ReduceOp::Max, None, "max")?;
                info!(max, "max pass complete");
                Stage::MaxReduced { mean, min, max }
            }
            Stage::MaxReduced { mean, min, max } => {
                let stdev =
                    self.pass(samples, ReduceOp::SquaredDeviation, Some(mean), "variance")?;
                info!(stdev, "variance pass complete");
                Stage::VarianceReduced(Statistics {
                    mean,
                    min,
                    max,
                    stdev,
                })
            }
            Stage::VarianceReduced(statistics) | Stage::Done(statistics) => {
                Stage::Done(statistics)
            }
        };
        Ok(next)
    }

    fn pass(
        &mut self,
        samples: &[f32],
        op: ReduceOp,
        mean: Option<f32>,
        stage: &'static str,
    ) -> Result<f32, ReduceError> {
        let group_size = self.groups.for_op(op);
        let partials = self
            .reducer
            .reduce(samples, op, group_size, mean)
            .map_err(|e| e.in_stage(stage))?;
        let value = finalize(&partials, mean).map_err(|e| e.in_stage(stage))?;
        self.timings.push(partials.timings);
        Ok(value)
    }
}
