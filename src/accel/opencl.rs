//! OpenCL device backend.
//!
//! Only compiled with the `opencl` feature:
//! ```bash
//! cargo build --features opencl
//! ```
//!
//! The backend owns one context, one profiling-enabled queue and the four
//! reduction kernels, built once at construction. Every dispatch allocates
//! its own buffers and releases them when it returns.

use std::collections::HashMap;
use std::mem::size_of;
use std::ptr;

use opencl3::command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE};
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU,
    CL_DEVICE_TYPE_GPU,
};
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_device_id, cl_device_type, cl_float, CL_BLOCKING};
use tracing::{debug, error};

use crate::accel::{
    ComputeBackend, DeviceInfo, DeviceKind, DispatchOutcome, DispatchRequest, PlatformListing,
};
use crate::error::{codes, ReduceError};
use crate::profiling::ProfileSpan;
use crate::reduce::ReduceOp;

pub struct OpenClBackend {
    info: DeviceInfo,
    context: Context,
    queue: CommandQueue,
    kernels: HashMap<&'static str, Kernel>,
}

impl std::fmt::Debug for OpenClBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClBackend")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn device_kind(dev_type: cl_device_type) -> DeviceKind {
    if dev_type & CL_DEVICE_TYPE_GPU != 0 {
        DeviceKind::Gpu
    } else if dev_type & CL_DEVICE_TYPE_CPU != 0 {
        DeviceKind::Cpu
    } else if dev_type & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceKind::Accelerator
    } else {
        DeviceKind::Host
    }
}

fn describe_device(platform: &str, device: &Device) -> DeviceInfo {
    DeviceInfo {
        platform: platform.to_string(),
        name: device.name().unwrap_or_default().trim().to_string(),
        vendor: device.vendor().unwrap_or_default().trim().to_string(),
        kind: device_kind(device.dev_type().unwrap_or(0)),
        max_work_group_size: device.max_work_group_size().unwrap_or(1),
    }
}

/// Enumerate every platform and its devices. Never errors; a machine
/// without an OpenCL runtime yields an empty list.
pub fn list_platforms() -> Vec<PlatformListing> {
    let platforms = match get_platforms() {
        Ok(p) => p,
        Err(_) => return Vec::new(),
    };

    platforms
        .iter()
        .enumerate()
        .map(|(index, platform)| {
            let name = platform.name().unwrap_or_default().trim().to_string();
            let vendor = platform.vendor().unwrap_or_default().trim().to_string();
            let devices = platform
                .get_devices(CL_DEVICE_TYPE_ALL)
                .unwrap_or_default()
                .into_iter()
                .map(|id| describe_device(&name, &Device::new(id)))
                .collect();
            PlatformListing {
                index,
                name,
                vendor,
                devices,
            }
        })
        .collect()
}

impl OpenClBackend {
    /// Open `device` on `platform` (both zero-based) and build `source` with
    /// `options`. Build diagnostics are logged and returned on failure.
    pub fn new(
        platform: usize,
        device: usize,
        source: &str,
        options: &str,
    ) -> Result<Self, ReduceError> {
        let unavailable = |reason: String| ReduceError::BackendUnavailable {
            platform,
            device,
            reason,
        };

        let platforms =
            get_platforms().map_err(|e| unavailable(format!("no OpenCL platforms: {}", e)))?;
        let platform_obj = platforms.get(platform).ok_or_else(|| {
            unavailable(format!("platform index out of range ({} found)", platforms.len()))
        })?;
        let platform_name = platform_obj.name().unwrap_or_default().trim().to_string();

        let device_ids = platform_obj
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| unavailable(format!("cannot enumerate devices: {}", e)))?;
        let device_id: cl_device_id = *device_ids.get(device).ok_or_else(|| {
            unavailable(format!("device index out of range ({} found)", device_ids.len()))
        })?;
        let device_obj = Device::new(device_id);
        let info = describe_device(&platform_name, &device_obj);

        let context = Context::from_device(&device_obj)
            .map_err(|e| unavailable(format!("context creation failed: {}", e)))?;

        // OpenCL 1.2 entry point; 2.0 properties are not available everywhere.
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, CL_QUEUE_PROFILING_ENABLE)
            .map_err(|e| unavailable(format!("queue creation failed: {}", e)))?;

        let program = build_program(&context, device_id, source, options)?;

        let mut kernels = HashMap::new();
        for op in ReduceOp::ALL {
            let name = op.kernel_name();
            let kernel = Kernel::create(&program, name).map_err(|_| ReduceError::MissingKernel {
                name: name.to_string(),
            })?;
            kernels.insert(name, kernel);
        }

        debug!(platform = %info.platform, device = %info.name, "OpenCL program built");

        Ok(Self {
            info,
            context,
            queue,
            kernels,
        })
    }
}

fn build_program(
    context: &Context,
    device_id: cl_device_id,
    source: &str,
    options: &str,
) -> Result<Program, ReduceError> {
    let mut program =
        Program::create_from_source(context, source).map_err(|e| ReduceError::Build {
            status: e.0,
            options: options.to_string(),
            log: String::new(),
        })?;

    if let Err(e) = program.build(context.devices(), options) {
        let status = program.get_build_status(device_id).unwrap_or(e.0);
        let build_options = program
            .get_build_options(device_id)
            .unwrap_or_else(|_| options.to_string());
        let log = program.get_build_log(device_id).unwrap_or_default();

        error!("Build Status: {}", status);
        error!("Build Options:\t{}", build_options);
        error!("Build Log:\t {}", log);

        return Err(ReduceError::Build {
            status,
            options: build_options,
            log,
        });
    }

    Ok(program)
}

fn span(event: &Event) -> Result<ProfileSpan, ClError> {
    Ok(ProfileSpan {
        queued: event.profiling_command_queued()?,
        submitted: event.profiling_command_submit()?,
        started: event.profiling_command_start()?,
        ended: event.profiling_command_end()?,
    })
}

impl ComputeBackend for OpenClBackend {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn has_kernel(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<DispatchOutcome, ReduceError> {
        let kernel = self
            .kernels
            .get(request.kernel)
            .ok_or_else(|| ReduceError::MissingKernel {
                name: request.kernel.to_string(),
            })?;

        let takes_scalar = ReduceOp::from_kernel_name(request.kernel)
            .map(ReduceOp::takes_scalar)
            .unwrap_or(false);
        if takes_scalar != request.scalar.is_some() {
            return Err(ReduceError::ScalarArgument {
                kernel: request.kernel.to_string(),
            });
        }

        let len = request.input.len();
        let group_size = request.group_size;
        if group_size == 0 || group_size > self.info.max_work_group_size || len % group_size != 0
        {
            return Err(ReduceError::Dispatch {
                kernel: request.kernel.to_string(),
                code: codes::CL_INVALID_WORK_GROUP_SIZE,
                message: format!(
                    "global size {} / local size {} (device maximum {})",
                    len, group_size, self.info.max_work_group_size
                ),
            });
        }

        let fail = |e: ClError| ReduceError::Dispatch {
            kernel: request.kernel.to_string(),
            code: e.0,
            message: e.to_string(),
        };

        let mut output = vec![0.0 as cl_float; len];

        // SAFETY: buffers are sized from `len`, host slices outlive the
        // blocking transfers, and every event is waited on before return.
        let (kernel_event, read_event) = unsafe {
            let mut input_buf =
                Buffer::<cl_float>::create(&self.context, CL_MEM_READ_ONLY, len, ptr::null_mut())
                    .map_err(fail)?;
            let mut output_buf =
                Buffer::<cl_float>::create(&self.context, CL_MEM_READ_WRITE, len, ptr::null_mut())
                    .map_err(fail)?;

            self.queue
                .enqueue_write_buffer(&mut input_buf, CL_BLOCKING, 0, request.input, &[])
                .map_err(fail)?;
            self.queue
                .enqueue_fill_buffer(
                    &mut output_buf,
                    &[0.0 as cl_float],
                    0,
                    len * size_of::<cl_float>(),
                    &[],
                )
                .map_err(fail)?
                .wait()
                .map_err(fail)?;

            let mean_buf = match request.scalar {
                Some(mean) => {
                    let mut buf = Buffer::<cl_float>::create(
                        &self.context,
                        CL_MEM_READ_ONLY,
                        1,
                        ptr::null_mut(),
                    )
                    .map_err(fail)?;
                    self.queue
                        .enqueue_write_buffer(&mut buf, CL_BLOCKING, 0, &[mean], &[])
                        .map_err(fail)?;
                    Some(buf)
                }
                None => None,
            };

            let mut exec = ExecuteKernel::new(kernel);
            exec.set_arg(&input_buf)
                .set_arg(&output_buf)
                .set_arg_local_buffer(group_size * size_of::<cl_float>());
            if let Some(buf) = &mean_buf {
                exec.set_arg(buf);
            }
            let kernel_event = exec
                .set_global_work_size(len)
                .set_local_work_size(group_size)
                .enqueue_nd_range(&self.queue)
                .map_err(fail)?;
            kernel_event.wait().map_err(fail)?;

            let read_event = self
                .queue
                .enqueue_read_buffer(&output_buf, CL_BLOCKING, 0, &mut output, &[])
                .map_err(fail)?;
            read_event.wait().map_err(fail)?;

            (kernel_event, read_event)
        };

        let kernel_span = span(&kernel_event).map_err(fail)?;
        let read_span = span(&read_event).map_err(fail)?;

        debug!(
            kernel = request.kernel,
            group_size,
            groups = request.groups(),
            elapsed_ns = kernel_span.duration_ns(),
            "device dispatch complete"
        );

        Ok(DispatchOutcome {
            output,
            kernel: kernel_span,
            read: read_span,
        })
    }
}
