use ndarray::{ArrayView3, ShapeBuilder};

use crate::shared::error::TrackError;

/// Pixel layout of a caller-supplied buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgr8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A borrowed, read-only view over caller-owned pixel memory.
///
/// Wrapping never copies; the backing buffer only has to outlive the call
/// the view is passed into. Rows may carry padding (`stride_bytes` >
/// `width * bytes_per_pixel`), as camera pipelines commonly produce.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride_bytes: usize,
    format: PixelFormat,
}

impl<'a> FrameView<'a> {
    /// Validates buffer geometry and wraps it without copying.
    pub fn wrap(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride_bytes: usize,
        format: PixelFormat,
    ) -> Result<Self, TrackError> {
        let invalid = |reason| TrackError::InvalidFrame {
            reason,
            width,
            height,
            stride_bytes,
        };

        if width == 0 || height == 0 {
            return Err(invalid("zero frame dimension"));
        }
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride_bytes < row_bytes {
            return Err(invalid("stride shorter than a pixel row"));
        }
        // The final row needs no padding after its last pixel.
        let spanned = stride_bytes * (height as usize - 1) + row_bytes;
        if data.len() < spanned {
            return Err(invalid("buffer shorter than the rows it must span"));
        }

        Ok(Self {
            data,
            width,
            height,
            stride_bytes,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride_bytes(&self) -> usize {
        self.stride_bytes
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Luma value of the pixel at `(x, y)`, converting from the view's
    /// pixel format. Coordinates must be in bounds.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        debug_assert!(x < self.width && y < self.height, "pixel out of bounds");
        let bpp = self.format.bytes_per_pixel();
        let base = y as usize * self.stride_bytes + x as usize * bpp;
        let px = &self.data[base..base + bpp];
        match self.format {
            PixelFormat::Gray8 => px[0],
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => luma_from_rgb(px[0], px[1], px[2]),
            PixelFormat::Bgr8 => luma_from_rgb(px[2], px[1], px[0]),
        }
    }

    /// `[H, W, C]` view over the pixels, honoring row stride.
    pub fn as_ndarray(&self) -> ArrayView3<'a, u8> {
        let bpp = self.format.bytes_per_pixel();
        let shape = (self.height as usize, self.width as usize, bpp);
        ArrayView3::from_shape(shape.strides((self.stride_bytes, bpp, 1)), self.data)
            .expect("validated frame geometry must map to an ndarray view")
    }

    /// Copies the view into an owned, densely packed frame.
    pub fn to_frame(&self) -> Frame {
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = self.width as usize * bpp;
        let mut data = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride_bytes;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Frame::new(data, self.width, self.height, self.format)
    }
}

/// BT.601 integer approximation.
fn luma_from_rgb(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// An owned, densely packed frame.
///
/// Produced when a detection cycle is dispatched: the caller's buffer is
/// only valid for the duration of the call, so the worker gets a copy.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel(),
            "data length must equal width * height * bytes_per_pixel"
        );
        Self {
            data,
            width,
            height,
            format,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride_bytes: self.width as usize * self.format.bytes_per_pixel(),
            format: self.format,
        }
    }
}
