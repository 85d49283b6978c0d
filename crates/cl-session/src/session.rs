//! The compute session: one device, one context, one command queue.

use std::sync::Arc;

use opencl3::command_queue::{
    CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE, CL_QUEUE_PROFILING_ENABLE, CommandQueue,
};
use opencl3::context::Context;
use opencl3::device::Device;
use opencl3::error_codes::CL_INVALID_KERNEL_NAME;
use opencl3::kernel::Kernel;
use opencl3::program::Program;
use opencl3::types::cl_command_queue_properties;

use crate::kernel::SessionKernel;
use crate::select::{DeviceProfile, Selector, discover};
use crate::{Error, Result};

/// Command-queue configuration applied at acquisition.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOptions {
    pub profiling: bool,
    pub out_of_order: bool,
}

impl QueueOptions {
    pub fn profiling(mut self, on: bool) -> Self {
        self.profiling = on;
        self
    }

    /// Out-of-order execution shifts ordering responsibility to the
    /// caller's wait-lists.
    pub fn out_of_order(mut self, on: bool) -> Self {
        self.out_of_order = on;
        self
    }

    fn bits(self) -> cl_command_queue_properties {
        let mut props: cl_command_queue_properties = 0;
        if self.profiling {
            props |= CL_QUEUE_PROFILING_ENABLE;
        }
        if self.out_of_order {
            props |= CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE;
        }
        props
    }
}

/// Queue and context behind one shared handle. Dependent resources hold
/// a clone, so the context outlives every buffer, image and kernel that
/// was allocated from it. Field order is release order: queue first.
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) queue: CommandQueue,
    pub(crate) context: Context,
}

// SAFETY: contexts, queues, kernels and memory objects are opaque
// handles; the OpenCL runtime serializes access to them internally.
unsafe impl Send for Core {}
unsafe impl Sync for Core {}

/// Owns the full lifecycle of one platform/device selection: context,
/// command queue, and everything allocated from them.
pub struct Session {
    core: Arc<Core>,
    device: Device,
    profile: DeviceProfile,
}

// SAFETY: see `Core`; the device id is an opaque runtime handle too.
// Sessions move across threads (one per device), they are not shared.
unsafe impl Send for Session {}

impl Session {
    /// Discover per `selector`, then acquire a context and queue on the
    /// matching device.
    pub fn create(selector: &Selector, options: QueueOptions) -> Result<Self> {
        let (_platform, device) = discover(selector)?;
        Self::from_device(device, options)
    }

    /// Acquire on an already-discovered device.
    pub fn from_device(device: Device, options: QueueOptions) -> Result<Self> {
        let profile = DeviceProfile::query(&device)?;
        let context = Context::from_device(&device)?;
        let queue = CommandQueue::create(&context, device.id(), options.bits())?;
        log::debug!("acquired context and queue on {}", profile.name);
        Ok(Self {
            core: Arc::new(Core { queue, context }),
            device,
            profile,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Attribute snapshot taken at acquisition.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.core.queue
    }

    pub fn context(&self) -> &Context {
        &self.core.context
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Compile `src` with `options` and extract the `entry` kernel.
    ///
    /// The intermediate program is released as soon as the kernel is
    /// extracted; the kernel retains everything dispatch needs. A build
    /// failure carries the backend's full diagnostic log.
    pub fn build_kernel(&self, src: &str, options: &str, entry: &str) -> Result<SessionKernel> {
        let program = Program::create_and_build_from_source(&self.core.context, src, options)
            .map_err(|log| Error::Compile {
                log: log.to_string(),
            })?;
        let kernel = Kernel::create(&program, entry).map_err(|e| {
            if e.0 == CL_INVALID_KERNEL_NAME {
                Error::EntryPointNotFound(entry.to_string())
            } else {
                Error::from(e)
            }
        })?;
        log::debug!("built kernel `{entry}`");
        SessionKernel::new(self, kernel, entry)
    }

    /// Block until every operation submitted to the queue has finished.
    pub fn finish(&self) -> Result<()> {
        self.core.queue.finish()?;
        Ok(())
    }

    /// Drain the queue and release, strictly: refuses while any buffer,
    /// image or kernel still holds the context.
    ///
    /// On refusal the session value is gone, but the context stays alive
    /// inside the surviving dependents and is released when the last of
    /// them drops. Plain `drop` is the best-effort variant used on error
    /// paths.
    pub fn close(self) -> Result<()> {
        let live = Arc::strong_count(&self.core) - 1;
        if live > 0 {
            return Err(Error::ResourceStillInUse(live));
        }
        self.core.queue.finish()?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let live = Arc::strong_count(&self.core) - 1;
        if live > 0 {
            log::warn!(
                "session on {} dropped with {live} dependent resource(s) still alive",
                self.profile.name
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.profile.name)
            .field("dependents", &(Arc::strong_count(&self.core) - 1))
            .finish_non_exhaustive()
    }
}
