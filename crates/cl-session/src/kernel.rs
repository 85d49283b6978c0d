//! Kernel handles and the dispatch builder.

use std::ptr;
use std::sync::Arc;

use opencl3::command_queue::CommandQueue;
use opencl3::kernel::Kernel;
use opencl3::types::{cl_event, cl_uint};

use crate::buffer::{GpuBuffer, State};
use crate::event::EventGuard;
use crate::image::Image2d;
use crate::session::{Core, Session};
use crate::{Error, Result};

#[cfg(feature = "metrics")]
use crate::metrics;

/// Device limits a dispatch is validated against before submission.
#[derive(Debug, Clone)]
pub(crate) struct WorkLimits {
    pub max_work_group_size: usize,
    pub max_dimensions: u32,
    pub max_item_sizes: Vec<usize>,
}

/// A named entry point extracted from a built program, bound to the
/// session it was compiled for.
#[derive(Debug)]
pub struct SessionKernel {
    kernel: Kernel,
    entry: String,
    num_args: u32,
    limits: WorkLimits,
    _core: Arc<Core>,
}

// SAFETY: see `Core`; kernel handles are runtime-serialized too.
unsafe impl Send for SessionKernel {}

impl SessionKernel {
    pub(crate) fn new(session: &Session, kernel: Kernel, entry: &str) -> Result<Self> {
        let num_args = kernel.num_args()?;
        let profile = session.profile();
        Ok(Self {
            kernel,
            entry: entry.to_string(),
            num_args,
            limits: WorkLimits {
                max_work_group_size: profile.max_work_group_size,
                max_dimensions: profile.max_work_item_dimensions,
                max_item_sizes: profile.max_work_item_sizes.clone(),
            },
            _core: session.core().clone(),
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Declared number of positional argument slots.
    pub fn num_args(&self) -> u32 {
        self.num_args
    }

    /// Start binding arguments for one dispatch.
    pub fn launch(&self) -> Launch<'_> {
        Launch {
            kernel: self,
            bound: vec![false; self.num_args as usize],
            global: Vec::new(),
            local: None,
            wait: Vec::new(),
        }
    }
}

/// One dispatch in preparation: positional argument slots plus work
/// geometry. Slots are applied to the kernel as they are bound and the
/// whole list is checked for completeness before submission.
pub struct Launch<'k> {
    kernel: &'k SessionKernel,
    bound: Vec<bool>,
    global: Vec<usize>,
    local: Option<Vec<usize>>,
    wait: Vec<&'k EventGuard<'k>>,
}

impl<'k> Launch<'k> {
    fn mark(&mut self, index: u32) -> Result<()> {
        let slot = self
            .bound
            .get_mut(index as usize)
            .ok_or_else(|| {
                Error::ArgumentBinding(format!(
                    "slot {index} out of range, kernel `{}` declares {} argument(s)",
                    self.kernel.entry, self.kernel.num_args
                ))
            })?;
        *slot = true;
        Ok(())
    }

    fn bind_err(&self, index: u32, e: opencl3::error_codes::ClError) -> Error {
        Error::ArgumentBinding(format!(
            "slot {index} of kernel `{}` rejected (status {})",
            self.kernel.entry, e.0
        ))
    }

    /// Bind a buffer handle at `index`.
    pub fn arg_buffer<S: State>(mut self, index: u32, buf: &GpuBuffer<S>) -> Result<Self> {
        self.kernel
            .kernel
            .set_arg(index, buf.raw())
            .map_err(|e| self.bind_err(index, e))?;
        self.mark(index)?;
        Ok(self)
    }

    /// Bind an image handle at `index`.
    pub fn arg_image(mut self, index: u32, image: &Image2d) -> Result<Self> {
        self.kernel
            .kernel
            .set_arg(index, image.raw())
            .map_err(|e| self.bind_err(index, e))?;
        self.mark(index)?;
        Ok(self)
    }

    /// Bind a plain-old-data scalar by value at `index`.
    pub fn arg<T: bytemuck::Pod>(mut self, index: u32, value: &T) -> Result<Self> {
        self.kernel
            .kernel
            .set_arg(index, value)
            .map_err(|e| self.bind_err(index, e))?;
        self.mark(index)?;
        Ok(self)
    }

    /// Reserve a local-memory slot of `len` bytes at `index`; local
    /// arguments carry a size and no host value.
    pub fn arg_local(mut self, index: u32, len: usize) -> Result<Self> {
        self.kernel
            .kernel
            .set_arg_local_buffer(index, len)
            .map_err(|e| self.bind_err(index, e))?;
        self.mark(index)?;
        Ok(self)
    }

    /// Set the global work size, one entry per dimension.
    pub fn global(mut self, sizes: &[usize]) -> Self {
        self.global = sizes.to_vec();
        self
    }

    /// Set the local (work-group) size; must match the global dimensions.
    pub fn local(mut self, sizes: &[usize]) -> Self {
        self.local = Some(sizes.to_vec());
        self
    }

    /// Events this dispatch must wait for before executing. Needed for
    /// correctness on out-of-order queues.
    pub fn wait_on(mut self, guards: &[&'k EventGuard<'k>]) -> Self {
        self.wait.extend_from_slice(guards);
        self
    }

    /// Validate slot completeness and work geometry, then submit.
    ///
    /// Work sizes are checked against the device limits here because the
    /// backend's own error for a bad local size is frequently opaque.
    pub fn enqueue(self, queue: &CommandQueue) -> Result<EventGuard<'k>> {
        if let Some(missing) = self.bound.iter().position(|b| !b) {
            return Err(Error::ArgumentBinding(format!(
                "slot {missing} of kernel `{}` left unbound",
                self.kernel.entry
            )));
        }
        check_work_size(&self.global, self.local.as_deref(), &self.kernel.limits)?;

        #[cfg(feature = "metrics")]
        let t = std::time::Instant::now();
        let wait: Vec<cl_event> = self.wait.iter().map(|g| g.raw()).collect();
        let local_ptr = self
            .local
            .as_ref()
            .map_or(ptr::null(), |l| l.as_ptr());
        let evt = queue.enqueue_nd_range_kernel(
            self.kernel.kernel.get(),
            self.global.len() as cl_uint,
            ptr::null(),
            self.global.as_ptr(),
            local_ptr,
            &wait,
        )?;
        #[cfg(feature = "metrics")]
        {
            metrics::count_dispatch();
            metrics::record("dispatch", t);
        }
        Ok(EventGuard::new(evt))
    }
}

fn check_work_size(global: &[usize], local: Option<&[usize]>, limits: &WorkLimits) -> Result<()> {
    if global.is_empty() || global.len() > limits.max_dimensions as usize {
        return Err(Error::InvalidWorkSize(format!(
            "{} dimension(s), device supports 1..={}",
            global.len(),
            limits.max_dimensions
        )));
    }
    if global.contains(&0) {
        return Err(Error::InvalidWorkSize("global size contains zero".into()));
    }
    let Some(local) = local else {
        return Ok(());
    };
    if local.len() != global.len() {
        return Err(Error::InvalidWorkSize(format!(
            "local has {} dimension(s), global has {}",
            local.len(),
            global.len()
        )));
    }
    let mut group = 1usize;
    for (dim, (&g, &l)) in global.iter().zip(local).enumerate() {
        if l == 0 || g % l != 0 {
            return Err(Error::InvalidWorkSize(format!(
                "local size {l} does not evenly divide global size {g} in dimension {dim}"
            )));
        }
        if let Some(&max) = limits.max_item_sizes.get(dim) {
            if l > max {
                return Err(Error::InvalidWorkSize(format!(
                    "local size {l} exceeds device maximum {max} in dimension {dim}"
                )));
            }
        }
        group *= l;
    }
    if group > limits.max_work_group_size {
        return Err(Error::InvalidWorkSize(format!(
            "work group of {group} item(s) exceeds device maximum {}",
            limits.max_work_group_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> WorkLimits {
        WorkLimits {
            max_work_group_size: 256,
            max_dimensions: 3,
            max_item_sizes: vec![256, 256, 64],
        }
    }

    #[test]
    fn global_only_is_valid() {
        assert!(check_work_size(&[1024], None, &limits()).is_ok());
    }

    #[test]
    fn dividing_local_is_valid() {
        assert!(check_work_size(&[1024], Some(&[128]), &limits()).is_ok());
        assert!(check_work_size(&[64, 64], Some(&[16, 16]), &limits()).is_ok());
    }

    #[test]
    fn non_dividing_local_is_rejected() {
        let err = check_work_size(&[1000], Some(&[128]), &limits()).unwrap_err();
        assert!(matches!(err, Error::InvalidWorkSize(_)));
    }

    #[test]
    fn oversized_group_is_rejected() {
        // 32 * 32 = 1024 > 256
        let err = check_work_size(&[1024, 1024], Some(&[32, 32]), &limits()).unwrap_err();
        assert!(matches!(err, Error::InvalidWorkSize(_)));
    }

    #[test]
    fn per_dimension_maximum_is_enforced() {
        let err = check_work_size(&[1, 1, 128], Some(&[1, 1, 128]), &limits()).unwrap_err();
        assert!(matches!(err, Error::InvalidWorkSize(_)));
    }

    #[test]
    fn dimension_count_is_bounded() {
        let err = check_work_size(&[2, 2, 2, 2], None, &limits()).unwrap_err();
        assert!(matches!(err, Error::InvalidWorkSize(_)));
        let err = check_work_size(&[], None, &limits()).unwrap_err();
        assert!(matches!(err, Error::InvalidWorkSize(_)));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(check_work_size(&[0], None, &limits()).is_err());
        assert!(check_work_size(&[64], Some(&[0]), &limits()).is_err());
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        assert!(check_work_size(&[64, 64], Some(&[8]), &limits()).is_err());
    }
}
