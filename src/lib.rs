//! tempreduce -- work-group parallel statistics over temperature series.
//!
//! This crate provides the reduction engine (padding, per-group partial
//! reduction, host-side finalisation), the statistics pipeline that chains
//! the passes, and the compute backends the passes dispatch to.

pub mod accel;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod profiling;
pub mod reduce;
pub mod report;

use anyhow::{Context, Result};

use crate::accel::AccelerationManager;
use crate::config::StatsConfig;
use crate::pipeline::StatisticsPipeline;
use crate::report::RunReport;

pub use crate::error::ReduceError;
pub use crate::pipeline::Statistics;

/// Load samples, open the configured backend and run all four passes.
pub fn run(config: &StatsConfig) -> Result<RunReport> {
    // 1. Kernel program
    let source = config.kernels.load_source()?;

    // 2. Backend
    let backend = AccelerationManager::select(&config.backend, &source)
        .context("failed to initialise compute backend")?;

    // 3. Samples
    let samples = loader::load_samples(&config.data.path, config.data.malformed)?;

    // 4. Passes
    let output = StatisticsPipeline::new(backend.as_ref(), config.groups)
        .run(&samples)
        .context("statistics pipeline aborted")?;
    AccelerationManager::verify_against_reference(&output.statistics, &samples);

    Ok(RunReport::new(
        backend.info().clone(),
        samples.len(),
        config.groups,
        output,
    ))
}
