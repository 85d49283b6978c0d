//! Two-dimensional image memory objects with rectangular region access.

use std::ptr;
use std::sync::Arc;

use opencl3::command_queue::CommandQueue;
use opencl3::memory::{CL_MEM_OBJECT_IMAGE2D, CL_RGBA, CL_UNSIGNED_INT8, Image};
use opencl3::types::{CL_BLOCKING, cl_image_desc, cl_image_format};

use crate::buffer::AccessMode;
use crate::session::{Core, Session};
use crate::{Error, Result};

/// Bytes per texel; images are RGBA with 8 bits per channel.
const TEXEL: usize = 4;

/// A 2-D RGBA8 image allocation.
pub struct Image2d {
    img: Image,
    width: usize,
    height: usize,
    _core: Arc<Core>,
}

impl Session {
    /// Allocate a `width` x `height` RGBA8 image.
    pub fn alloc_image2d(&self, width: usize, height: usize, mode: AccessMode) -> Result<Image2d> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidSize(width * height));
        }
        let format = cl_image_format {
            image_channel_order: CL_RGBA,
            image_channel_data_type: CL_UNSIGNED_INT8,
        };
        let desc = cl_image_desc {
            image_type: CL_MEM_OBJECT_IMAGE2D,
            image_width: width,
            image_height: height,
            image_depth: 1,
            image_array_size: 1,
            image_row_pitch: 0,
            image_slice_pitch: 0,
            num_mip_levels: 0,
            num_samples: 0,
            mem_object: ptr::null_mut(),
        };
        let img = Image::create(self.context(), mode.flags(), &format, &desc, ptr::null_mut())?;
        Ok(Image2d {
            img,
            width,
            height,
            _core: self.core().clone(),
        })
    }
}

impl Image2d {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn raw(&self) -> &Image {
        &self.img
    }

    /// Blocking write of a rectangular region.
    ///
    /// `data` is row-major with `row_pitch` bytes between rows (0 for
    /// tightly packed); the pitch is caller-computed and only
    /// bounds-checked here. Texels outside the region are untouched.
    pub fn write_region(
        &mut self,
        queue: &CommandQueue,
        origin: (usize, usize),
        size: (usize, usize),
        row_pitch: usize,
        data: &[u8],
    ) -> Result<()> {
        self.check_region(origin, size, row_pitch, data.len())?;
        let origin3 = [origin.0, origin.1, 0];
        let region3 = [size.0, size.1, 1];
        queue.enqueue_write_image(
            &mut self.img,
            CL_BLOCKING,
            origin3.as_ptr(),
            region3.as_ptr(),
            row_pitch,
            0,
            data.as_ptr() as *mut std::ffi::c_void,
            &[],
        )?;
        Ok(())
    }

    /// Blocking read of a rectangular region into `out` (same layout
    /// rules as [`write_region`](Self::write_region)).
    pub fn read_region(
        &self,
        queue: &CommandQueue,
        origin: (usize, usize),
        size: (usize, usize),
        row_pitch: usize,
        out: &mut [u8],
    ) -> Result<()> {
        self.check_region(origin, size, row_pitch, out.len())?;
        let origin3 = [origin.0, origin.1, 0];
        let region3 = [size.0, size.1, 1];
        queue.enqueue_read_image(
            &self.img,
            CL_BLOCKING,
            origin3.as_ptr(),
            region3.as_ptr(),
            row_pitch,
            0,
            out.as_mut_ptr() as *mut std::ffi::c_void,
            &[],
        )?;
        Ok(())
    }

    /// Blocking read of the whole image, tightly packed.
    pub fn read(&self, queue: &CommandQueue, out: &mut [u8]) -> Result<()> {
        self.read_region(queue, (0, 0), (self.width, self.height), 0, out)
    }

    fn check_region(
        &self,
        origin: (usize, usize),
        size: (usize, usize),
        row_pitch: usize,
        data_len: usize,
    ) -> Result<()> {
        let (w, h) = size;
        if w == 0 || h == 0 {
            return Err(Error::InvalidSize(0));
        }
        if origin.0 + w > self.width || origin.1 + h > self.height {
            return Err(Error::InvalidSize((origin.0 + w) * (origin.1 + h)));
        }
        let row_bytes = w * TEXEL;
        if row_pitch != 0 && row_pitch < row_bytes {
            return Err(Error::InvalidSize(row_pitch));
        }
        let needed = if row_pitch == 0 {
            row_bytes * h
        } else {
            row_pitch * (h - 1) + row_bytes
        };
        if data_len < needed {
            return Err(Error::InvalidSize(data_len));
        }
        Ok(())
    }
}
