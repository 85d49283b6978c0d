//! Device buffers with a compile-time transfer lifecycle.
//!
//! A [`GpuBuffer`] is byte-addressed; callers view it through
//! `bytemuck::cast_slice` at the edges. Its type state tracks the
//! transfer protocol: [`Queued`] (allocated, untouched), [`InFlight`]
//! (a device operation is outstanding), [`Ready`] (all submitted
//! operations have completed). Non-blocking operations hand back an
//! [`EventGuard`](crate::EventGuard) that borrows the host slice until
//! the transfer is synchronized, so the slice cannot be reused early.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;
use std::sync::Arc;

use opencl3::command_queue::CommandQueue;
use opencl3::memory::{
    Buffer, CL_MAP_READ, CL_MAP_WRITE, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE,
    CL_MEM_USE_HOST_PTR, CL_MEM_WRITE_ONLY, ClMem,
};
use opencl3::types::{CL_BLOCKING, CL_NON_BLOCKING, cl_mem, cl_mem_flags};

use crate::event::EventGuard;
use crate::session::{Core, Session};
use crate::{Error, Result};

#[cfg(feature = "memtrace")]
use crate::memtracer;
#[cfg(feature = "metrics")]
use crate::metrics;

mod sealed {
    pub trait Sealed {}
}

/// Compile-time lifecycle marker for [`GpuBuffer`].
pub trait State: sealed::Sealed {}

/// Allocated; no transfer or dispatch has touched the buffer yet.
pub struct Queued;
/// A device operation referencing the buffer is outstanding.
pub struct InFlight;
/// Every submitted operation on the buffer has completed.
pub struct Ready;

impl sealed::Sealed for Queued {}
impl sealed::Sealed for InFlight {}
impl sealed::Sealed for Ready {}
impl State for Queued {}
impl State for InFlight {}
impl State for Ready {}

/// Device-side access mode, fixed at allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    pub(crate) fn flags(self) -> cl_mem_flags {
        match self {
            AccessMode::ReadOnly => CL_MEM_READ_ONLY,
            AccessMode::WriteOnly => CL_MEM_WRITE_ONLY,
            AccessMode::ReadWrite => CL_MEM_READ_WRITE,
        }
    }
}

/// A linear device allocation of `len` bytes.
pub struct GpuBuffer<S: State> {
    buf: Buffer<u8>,
    len: usize,
    core: Arc<Core>,
    _state: PhantomData<S>,
}

impl Session {
    /// Allocate `len` uninitialized device bytes.
    pub fn alloc(&self, len: usize, mode: AccessMode) -> Result<GpuBuffer<Queued>> {
        if len == 0 {
            return Err(Error::InvalidSize(len));
        }
        let buf = Buffer::<u8>::create(self.context(), mode.flags(), len, ptr::null_mut())?;
        #[cfg(feature = "metrics")]
        metrics::count_alloc(len);
        Ok(GpuBuffer {
            buf,
            len,
            core: self.core().clone(),
            _state: PhantomData,
        })
    }

    /// Allocate and snapshot `data` at call time (copy-from-host).
    pub fn alloc_from(&self, data: &[u8], mode: AccessMode) -> Result<GpuBuffer<Ready>> {
        if data.is_empty() {
            return Err(Error::InvalidSize(0));
        }
        let buf = Buffer::<u8>::create(
            self.context(),
            mode.flags() | CL_MEM_COPY_HOST_PTR,
            data.len(),
            data.as_ptr() as *mut std::ffi::c_void,
        )?;
        #[cfg(feature = "metrics")]
        metrics::count_alloc(data.len());
        Ok(GpuBuffer {
            buf,
            len: data.len(),
            core: self.core().clone(),
            _state: PhantomData,
        })
    }

    /// Alias `data` as the buffer's backing store (use-host-pointer).
    ///
    /// # Safety
    ///
    /// The caller must keep `data` alive and unmodified for the whole
    /// lifetime of the returned buffer; the backend may read or write
    /// through the aliased pointer at any point while device operations
    /// are outstanding.
    pub unsafe fn alloc_shared(&self, data: &mut [u8], mode: AccessMode) -> Result<GpuBuffer<Ready>> {
        if data.is_empty() {
            return Err(Error::InvalidSize(0));
        }
        let buf = Buffer::<u8>::create(
            self.context(),
            mode.flags() | CL_MEM_USE_HOST_PTR,
            data.len(),
            data.as_mut_ptr() as *mut std::ffi::c_void,
        )?;
        #[cfg(feature = "metrics")]
        metrics::count_alloc(data.len());
        Ok(GpuBuffer {
            buf,
            len: data.len(),
            core: self.core().clone(),
            _state: PhantomData,
        })
    }
}

impl<S: State> GpuBuffer<S> {
    fn transition<T: State>(self) -> GpuBuffer<T> {
        GpuBuffer {
            buf: self.buf,
            len: self.len,
            core: self.core,
            _state: PhantomData,
        }
    }

    /// The wrapped backend buffer.
    pub fn raw(&self) -> &Buffer<u8> {
        &self.buf
    }

    pub fn raw_mut(&mut self) -> &mut Buffer<u8> {
        &mut self.buf
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset.checked_add(len).ok_or(Error::InvalidSize(len))?;
        if end > self.len {
            return Err(Error::InvalidSize(end));
        }
        Ok(())
    }
}

impl GpuBuffer<Queued> {
    /// Non-blocking upload of `host`; the buffer moves in flight and the
    /// guard holds the borrow of `host` until synchronized.
    pub fn enqueue_write<'h>(
        mut self,
        queue: &CommandQueue,
        host: &'h [u8],
    ) -> Result<(GpuBuffer<InFlight>, EventGuard<'h>)> {
        if host.len() != self.len {
            return Err(Error::InvalidSize(host.len()));
        }
        #[cfg(feature = "metrics")]
        let t = std::time::Instant::now();
        #[cfg(feature = "memtrace")]
        let token = Box::new(memtracer::start(memtracer::Dir::H2D, host.len()));
        let evt = queue.enqueue_write_buffer(&mut self.buf, CL_NON_BLOCKING, 0, host, &[])?;
        #[cfg(feature = "memtrace")]
        memtracer::attach(&evt, token);
        #[cfg(feature = "metrics")]
        metrics::record("enqueue_write", t);
        Ok((self.transition(), EventGuard::new(evt)))
    }

    /// Blocking upload of `host`.
    pub fn write(mut self, queue: &CommandQueue, host: &[u8]) -> Result<GpuBuffer<Ready>> {
        if host.len() != self.len {
            return Err(Error::InvalidSize(host.len()));
        }
        #[cfg(feature = "metrics")]
        let t = std::time::Instant::now();
        queue.enqueue_write_buffer(&mut self.buf, CL_BLOCKING, 0, host, &[])?;
        #[cfg(feature = "metrics")]
        metrics::record("write", t);
        Ok(self.transition())
    }

    /// Hand the buffer to a dispatch without a host transfer; the kernel
    /// is expected to produce its contents.
    pub fn launch(self) -> GpuBuffer<InFlight> {
        self.transition()
    }
}

impl GpuBuffer<InFlight> {
    /// Wait for the outstanding operation and hand the buffer back.
    pub fn into_ready(self, guard: EventGuard<'_>) -> Result<GpuBuffer<Ready>> {
        guard.wait()?;
        Ok(self.transition())
    }
}

impl GpuBuffer<Ready> {
    /// Non-blocking read into `host_out`; the guard holds the borrow of
    /// `host_out` until synchronized.
    pub fn enqueue_read<'h>(
        self,
        queue: &CommandQueue,
        host_out: &'h mut [u8],
    ) -> Result<(GpuBuffer<InFlight>, EventGuard<'h>)> {
        if host_out.len() != self.len {
            return Err(Error::InvalidSize(host_out.len()));
        }
        #[cfg(feature = "metrics")]
        let t = std::time::Instant::now();
        #[cfg(feature = "memtrace")]
        let token = Box::new(memtracer::start(memtracer::Dir::D2H, host_out.len()));
        let evt = queue.enqueue_read_buffer(&self.buf, CL_NON_BLOCKING, 0, host_out, &[])?;
        #[cfg(feature = "memtrace")]
        memtracer::attach(&evt, token);
        #[cfg(feature = "metrics")]
        metrics::record("enqueue_read", t);
        Ok((self.transition(), EventGuard::new(evt)))
    }

    /// Blocking full read into `host_out`.
    pub fn read(&self, queue: &CommandQueue, host_out: &mut [u8]) -> Result<()> {
        self.read_at(queue, 0, host_out)
    }

    /// Blocking read of the byte range starting at `offset`.
    pub fn read_at(&self, queue: &CommandQueue, offset: usize, host_out: &mut [u8]) -> Result<()> {
        self.check_range(offset, host_out.len())?;
        queue.enqueue_read_buffer(&self.buf, CL_BLOCKING, offset, host_out, &[])?;
        Ok(())
    }

    /// Blocking write of `host` starting at byte `offset`. Bytes outside
    /// the range are left untouched.
    pub fn write_at(&mut self, queue: &CommandQueue, offset: usize, host: &[u8]) -> Result<()> {
        self.check_range(offset, host.len())?;
        queue.enqueue_write_buffer(&mut self.buf, CL_BLOCKING, offset, host, &[])?;
        Ok(())
    }

    /// Carve a sub-buffer aliasing `len` bytes from byte `origin`.
    /// The region shares storage with its parent.
    pub fn sub_buffer(&self, origin: usize, len: usize, mode: AccessMode) -> Result<GpuBuffer<Ready>> {
        if len == 0 {
            return Err(Error::InvalidSize(len));
        }
        self.check_range(origin, len)?;
        let buf = self.buf.create_sub_buffer(mode.flags(), origin, len)?;
        Ok(GpuBuffer {
            buf,
            len,
            core: self.core.clone(),
            _state: PhantomData,
        })
    }

    /// Map the buffer into host memory for direct access.
    ///
    /// The mapping waits for prior device writes, and the view unmaps on
    /// drop; the exclusive borrow keeps map/unmap strictly paired and
    /// non-overlapping per object.
    pub fn map<'b>(&'b mut self, queue: &'b CommandQueue) -> Result<MappedView<'b>> {
        let mut mapped: cl_mem = ptr::null_mut();
        queue.enqueue_map_buffer(
            &mut self.buf,
            CL_BLOCKING,
            CL_MAP_READ | CL_MAP_WRITE,
            0,
            self.len,
            &mut mapped,
            &[],
        )?;
        Ok(MappedView {
            ptr: mapped.cast::<u8>(),
            len: self.len,
            mem: self.buf.get(),
            queue,
        })
    }
}

/// A host view of a mapped buffer. Unmaps on drop.
pub struct MappedView<'a> {
    ptr: *mut u8,
    len: usize,
    mem: cl_mem,
    queue: &'a CommandQueue,
}

impl MappedView<'_> {
    /// Unmap explicitly, surfacing the backend status.
    pub fn unmap(self) -> Result<()> {
        let res = self.do_unmap();
        std::mem::forget(self);
        res
    }

    fn do_unmap(&self) -> Result<()> {
        let evt = self
            .queue
            .enqueue_unmap_mem_object(self.mem, self.ptr.cast(), &[])?;
        evt.wait()?;
        Ok(())
    }
}

impl Deref for MappedView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: the backend returned a host pointer valid for `len`
        // bytes until the unmap
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for MappedView<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Safety: see `deref`; the view is exclusively borrowed
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for MappedView<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.do_unmap() {
            log::warn!("unmap failed: {e}");
        }
    }
}
