//! Compute backends -- OpenCL device / host work-group emulation.
//!
//! A backend owns its context and queue. Callers hold it as an explicit
//! `&dyn ComputeBackend` handle; there is no global device state.

pub mod cpu;
pub mod manager;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod reference;

pub use manager::{AccelerationManager, BackendKind};

use serde::Serialize;

use crate::error::ReduceError;
use crate::profiling::ProfileSpan;

/// Embedded kernel program with the four reduction entry points.
pub const DEFAULT_KERNEL_SOURCE: &str = include_str!("kernels.cl");

/// Which kind of device a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Gpu,
    Cpu,
    Accelerator,
    /// Host threads emulating work-groups.
    Host,
}

/// Description of the device behind a backend.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub platform: String,
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
    pub max_work_group_size: usize,
}

/// One platform and its devices, as printed by `--list`.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformListing {
    pub index: usize,
    pub name: String,
    pub vendor: String,
    pub devices: Vec<DeviceInfo>,
}

/// A single NDRange dispatch of a reduction kernel.
///
/// `input.len()` is the global size and must be a multiple of `group_size`.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub kernel: &'a str,
    pub input: &'a [f32],
    pub group_size: usize,
    /// Extra read-only scalar input (the mean, for `reduce_std`).
    pub scalar: Option<f32>,
}

impl DispatchRequest<'_> {
    pub fn groups(&self) -> usize {
        if self.group_size == 0 {
            0
        } else {
            self.input.len() / self.group_size
        }
    }
}

/// Read-back buffer plus the profiling spans of the kernel and the read.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// One slot per input element; group `k`'s result sits at `k * group_size`.
    pub output: Vec<f32>,
    pub kernel: ProfileSpan,
    pub read: ProfileSpan,
}

/// A device that can run the named reduction kernels.
///
/// `dispatch` blocks until the kernel has finished and the output buffer has
/// been read back to the host.
pub trait ComputeBackend {
    fn info(&self) -> &DeviceInfo;

    fn max_work_group_size(&self) -> usize {
        self.info().max_work_group_size
    }

    fn has_kernel(&self, name: &str) -> bool;

    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<DispatchOutcome, ReduceError>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn info(&self) -> &DeviceInfo {
        (**self).info()
    }

    fn max_work_group_size(&self) -> usize {
        (**self).max_work_group_size()
    }

    fn has_kernel(&self, name: &str) -> bool {
        (**self).has_kernel(name)
    }

    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<DispatchOutcome, ReduceError> {
        (**self).dispatch(request)
    }
}
