//! Run report formatting.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accel::{DeviceInfo, PlatformListing};
use crate::pipeline::{PipelineOutput, Statistics};
use crate::profiling::{Resolution, StageTimings};
use crate::reduce::GroupSizes;

/// Everything printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub generated_at: DateTime<Utc>,
    pub device: DeviceInfo,
    pub sample_count: usize,
    pub groups: GroupSizes,
    pub statistics: Statistics,
    pub timings: Vec<StageTimings>,
}

impl RunReport {
    pub fn new(
        device: DeviceInfo,
        sample_count: usize,
        groups: GroupSizes,
        output: PipelineOutput,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            generated_at: Utc::now(),
            device,
            sample_count,
            groups,
            statistics: output.statistics,
            timings: output.timings,
        }
    }
}

/// Header line naming the selected device.
pub fn format_device(device: &DeviceInfo) -> String {
    format!("Running on {}, {}", device.platform, device.name)
}

/// Human-readable report: kernel times, read-back times, then the four
/// statistics in the order mean, min, max, stdev.
pub fn format_text(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", format_device(&report.device));

    let _ = writeln!(out);
    for t in &report.timings {
        let _ = writeln!(
            out,
            "{} execution time: {} [ns], {}",
            t.op.label(),
            t.kernel.duration_ns(),
            t.kernel.describe(Resolution::Us)
        );
    }

    let _ = writeln!(out);
    for t in &report.timings {
        let _ = writeln!(
            out,
            "{} read time: {} [ns], {}",
            t.op.label(),
            t.read.duration_ns(),
            t.read.describe(Resolution::Us)
        );
    }

    let s = &report.statistics;
    let _ = writeln!(out);
    let _ = writeln!(out, "Mean Temperature:\t{}", s.mean);
    let _ = writeln!(out, "Minimum Temperature:\t{}", s.min);
    let _ = writeln!(out, "Maximum Temperature:\t{}", s.max);
    let _ = writeln!(out, "Standard Deviation:\t{}", s.stdev);
    out
}

/// Listing printed by `--list`.
pub fn format_listing(platforms: &[PlatformListing], host: &DeviceInfo) -> String {
    let mut out = String::new();
    if platforms.is_empty() {
        let _ = writeln!(out, "No OpenCL platforms found.");
    }
    for p in platforms {
        let _ = writeln!(out, "Platform {}: {}, vendor: {}", p.index, p.name, p.vendor);
        for (i, d) in p.devices.iter().enumerate() {
            let _ = writeln!(
                out,
                "  Device {}: {}, vendor: {}, type: {:?}, max work-group: {}",
                i, d.name, d.vendor, d.kind, d.max_work_group_size
            );
        }
    }
    let _ = writeln!(
        out,
        "Host backend (--backend cpu): {}, max work-group: {}",
        host.name, host.max_work_group_size
    );
    out
}
