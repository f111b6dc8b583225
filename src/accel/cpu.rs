//! Host backend: runs the reduction kernels on CPU threads with the same
//! work-group semantics as the device program.
//!
//! Every group gets a private scratch buffer standing in for local memory and
//! folds it with the same stride pattern as `kernels.cl`, so results match the
//! device order of operations.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::accel::{ComputeBackend, DeviceInfo, DeviceKind, DispatchOutcome, DispatchRequest};
use crate::error::{codes, ReduceError};
use crate::profiling::ProfileSpan;

/// Largest work-group the host backend accepts unless configured otherwise.
pub const DEFAULT_MAX_WORK_GROUP_SIZE: usize = 1024;

/// Loads one group into scratch and folds it. The scalar is only read by
/// kernels registered with `takes_scalar`.
type GroupBody = fn(group: &[f32], scalar: f32, scratch: &mut [f32]) -> f32;

#[derive(Clone, Copy)]
struct HostKernel {
    body: GroupBody,
    takes_scalar: bool,
}

pub struct CpuBackend {
    info: DeviceInfo,
    kernels: HashMap<&'static str, HostKernel>,
    epoch: Instant,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_max_work_group_size(DEFAULT_MAX_WORK_GROUP_SIZE)
    }

    pub fn with_max_work_group_size(max_work_group_size: usize) -> Self {
        let mut kernels = HashMap::new();
        kernels.insert("reduce_add", HostKernel { body: reduce_add, takes_scalar: false });
        kernels.insert("reduce_min", HostKernel { body: reduce_min, takes_scalar: false });
        kernels.insert("reduce_max", HostKernel { body: reduce_max, takes_scalar: false });
        kernels.insert("reduce_std", HostKernel { body: reduce_std, takes_scalar: true });

        let threads = rayon::current_num_threads();
        Self {
            info: DeviceInfo {
                platform: "Host".to_string(),
                name: format!("CPU work-group emulation ({} threads)", threads),
                vendor: "tempreduce".to_string(),
                kind: DeviceKind::Host,
                max_work_group_size,
            },
            kernels,
            epoch: Instant::now(),
        }
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn reject(request: &DispatchRequest<'_>, code: i32, message: String) -> ReduceError {
        ReduceError::Dispatch {
            kernel: request.kernel.to_string(),
            code,
            message,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn has_kernel(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<DispatchOutcome, ReduceError> {
        let queued = self.now_ns();

        let kernel = self
            .kernels
            .get(request.kernel)
            .copied()
            .ok_or_else(|| ReduceError::MissingKernel {
                name: request.kernel.to_string(),
            })?;

        let group_size = request.group_size;
        if group_size == 0 || group_size > self.info.max_work_group_size {
            return Err(Self::reject(
                request,
                codes::CL_INVALID_WORK_GROUP_SIZE,
                format!(
                    "local size {} outside 1..={}",
                    group_size, self.info.max_work_group_size
                ),
            ));
        }
        if request.input.is_empty() {
            return Err(Self::reject(
                request,
                codes::CL_INVALID_GLOBAL_WORK_SIZE,
                "global size is zero".to_string(),
            ));
        }
        if request.input.len() % group_size != 0 {
            return Err(Self::reject(
                request,
                codes::CL_INVALID_WORK_GROUP_SIZE,
                format!(
                    "global size {} is not a multiple of local size {}",
                    request.input.len(),
                    group_size
                ),
            ));
        }
        if kernel.takes_scalar != request.scalar.is_some() {
            return Err(ReduceError::ScalarArgument {
                kernel: request.kernel.to_string(),
            });
        }
        let scalar = request.scalar.unwrap_or(0.0);

        // Output buffer starts zero-filled like the device buffer.
        let mut device_out = vec![0.0f32; request.input.len()];
        let submitted = self.now_ns();

        let started = self.now_ns();
        device_out
            .par_chunks_mut(group_size)
            .zip(request.input.par_chunks(group_size))
            .for_each_init(
                || vec![0.0f32; group_size],
                |scratch, (out, group)| {
                    out[0] = (kernel.body)(group, scalar, scratch);
                },
            );
        let ended = self.now_ns();

        let read_queued = self.now_ns();
        let output = device_out;
        let read_ended = self.now_ns();

        debug!(
            kernel = request.kernel,
            group_size,
            groups = request.groups(),
            elapsed_ns = ended - started,
            "host dispatch complete"
        );

        Ok(DispatchOutcome {
            output,
            kernel: ProfileSpan {
                queued,
                submitted,
                started,
                ended,
            },
            read: ProfileSpan {
                queued: read_queued,
                submitted: read_queued,
                started: read_queued,
                ended: read_ended,
            },
        })
    }
}

/// In-place fold of local memory: at stride `s`, slot `l` (a multiple of
/// `2s`) absorbs slot `l + s` when it exists.
fn tree_fold(scratch: &mut [f32], combine: fn(f32, f32) -> f32) -> f32 {
    let n = scratch.len();
    let mut stride = 1;
    while stride < n {
        let mut lid = 0;
        while lid + stride < n {
            scratch[lid] = combine(scratch[lid], scratch[lid + stride]);
            lid += stride * 2;
        }
        stride *= 2;
    }
    scratch[0]
}

fn reduce_add(group: &[f32], _scalar: f32, scratch: &mut [f32]) -> f32 {
    scratch.copy_from_slice(group);
    tree_fold(scratch, |a, b| a + b)
}

fn reduce_min(group: &[f32], _scalar: f32, scratch: &mut [f32]) -> f32 {
    scratch.copy_from_slice(group);
    tree_fold(scratch, f32::min)
}

fn reduce_max(group: &[f32], _scalar: f32, scratch: &mut [f32]) -> f32 {
    scratch.copy_from_slice(group);
    tree_fold(scratch, f32::max)
}

fn reduce_std(group: &[f32], mean: f32, scratch: &mut [f32]) -> f32 {
    for (slot, &x) in scratch.iter_mut().zip(group) {
        let d = x - mean;
        *slot = d * d;
    }
    tree_fold(scratch, |a, b| a + b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kernel: &str, input: &[f32], group_size: usize, scalar: Option<f32>) -> Vec<f32> {
        CpuBackend::new()
            .dispatch(&DispatchRequest {
                kernel,
                input,
                group_size,
                scalar,
            })
            .unwrap()
            .output
    }

    #[test]
    fn test_group_results_land_on_group_bases() {
        let out = run("reduce_add", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, None);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], 6.0);
        assert_eq!(out[3], 15.0);
        // non-base slots keep the zero fill
        assert_eq!(out[1], 0.0);
        assert_eq!(out[5], 0.0);
    }

    #[test]
    fn test_tree_fold_handles_odd_group_sizes() {
        for n in 1..=40 {
            let mut scratch: Vec<f32> = (1..=n).map(|v| v as f32).collect();
            let expected = (n * (n + 1) / 2) as f32;
            assert_eq!(tree_fold(&mut scratch, |a, b| a + b), expected, "n={}", n);
        }
    }

    #[test]
    fn test_min_max_kernels() {
        let input = [5.0, 3.0, 9.0, 1.0];
        let min = run("reduce_min", &input, 2, None);
        let max = run("reduce_max", &input, 2, None);
        assert_eq!((min[0], min[2]), (3.0, 1.0));
        assert_eq!((max[0], max[2]), (5.0, 9.0));
    }

    #[test]
    fn test_std_kernel_uses_scalar() {
        let out = run("reduce_std", &[1.0, 3.0], 2, Some(2.0));
        assert_eq!(out[0], 2.0);
    }

    #[test]
    fn test_unknown_kernel() {
        let err = CpuBackend::new()
            .dispatch(&DispatchRequest {
                kernel: "reduce_median",
                input: &[1.0],
                group_size: 1,
                scalar: None,
            })
            .unwrap_err();
        assert!(matches!(err, ReduceError::MissingKernel { name } if name == "reduce_median"));
    }

    #[test]
    fn test_rejects_oversized_group() {
        let backend = CpuBackend::with_max_work_group_size(8);
        let input = vec![0.0; 16];
        let err = backend
            .dispatch(&DispatchRequest {
                kernel: "reduce_add",
                input: &input,
                group_size: 16,
                scalar: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ReduceError::Dispatch { code: codes::CL_INVALID_WORK_GROUP_SIZE, .. }
        ));
    }

    #[test]
    fn test_rejects_unaligned_global_size() {
        let err = CpuBackend::new()
            .dispatch(&DispatchRequest {
                kernel: "reduce_add",
                input: &[1.0, 2.0, 3.0],
                group_size: 2,
                scalar: None,
            })
            .unwrap_err();
        assert!(matches!(err, ReduceError::Dispatch { .. }));
    }

    #[test]
    fn test_scalar_mismatch() {
        let backend = CpuBackend::new();
        let missing = backend.dispatch(&DispatchRequest {
            kernel: "reduce_std",
            input: &[1.0, 2.0],
            group_size: 2,
            scalar: None,
        });
        let extra = backend.dispatch(&DispatchRequest {
            kernel: "reduce_add",
            input: &[1.0, 2.0],
            group_size: 2,
            scalar: Some(1.0),
        });
        assert!(matches!(missing, Err(ReduceError::ScalarArgument { .. })));
        assert!(matches!(extra, Err(ReduceError::ScalarArgument { .. })));
    }

    #[test]
    fn test_profile_spans_are_ordered() {
        let input = vec![1.0; 256];
        let outcome = CpuBackend::new()
            .dispatch(&DispatchRequest {
                kernel: "reduce_add",
                input: &input,
                group_size: 32,
                scalar: None,
            })
            .unwrap();
        let k = outcome.kernel;
        assert!(k.queued <= k.submitted && k.submitted <= k.started && k.started <= k.ended);
        assert!(k.ended <= outcome.read.queued);
        assert!(outcome.read.started <= outcome.read.ended);
    }
}
