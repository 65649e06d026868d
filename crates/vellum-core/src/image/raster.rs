//! Rasters and the `Image` variant type.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use super::buffer::{byte_len, BufferError, PixelBuffer};
use super::{PixelFormat, StorageMode};

/// A rectangular grid of pixels in a known format and storage.
#[derive(Debug)]
pub struct Raster {
    width: u32,
    height: u32,
    format: PixelFormat,
    buffer: PixelBuffer,
}

impl Raster {
    /// Create a fully transparent canonical raster on the heap.
    ///
    /// Uses an infallible allocation; callers sizing buffers from untrusted
    /// input go through [`Raster::allocate`] instead.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 4;
        Self {
            width,
            height,
            format: PixelFormat::CANONICAL,
            buffer: PixelBuffer::Heap(vec![0u8; len]),
        }
    }

    /// Fallible form of [`Raster::new`].
    ///
    /// Fails with [`BufferError`] instead of aborting when the canvas
    /// cannot be allocated.
    pub fn try_new(width: u32, height: u32) -> Result<Self, BufferError> {
        let len = byte_len(width, height, 4)?;
        Ok(Self {
            width,
            height,
            format: PixelFormat::CANONICAL,
            buffer: PixelBuffer::heap(len)?,
        })
    }

    /// Allocate a zeroed raster with the given format and storage.
    pub fn allocate(
        width: u32,
        height: u32,
        format: PixelFormat,
        mode: StorageMode,
        temp_root: &Path,
    ) -> Result<Self, BufferError> {
        let len = byte_len(width, height, format.layout.bytes_per_pixel())?;
        let buffer = PixelBuffer::allocate(mode, len, temp_root)?;
        Ok(Self {
            width,
            height,
            format,
            buffer,
        })
    }

    /// Wrap an existing buffer, checking that its length matches.
    pub fn from_buffer(
        width: u32,
        height: u32,
        format: PixelFormat,
        buffer: PixelBuffer,
    ) -> Result<Self, BufferError> {
        let expected = byte_len(width, height, format.layout.bytes_per_pixel())?;
        if buffer.len() != expected {
            return Err(BufferError::InvalidSize(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                buffer.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            buffer,
        })
    }

    /// Build a canonical heap raster from packed ARGB words.
    pub fn from_argb(width: u32, height: u32, pixels: &[u32]) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize,
            "Pixel buffer size mismatch"
        );
        let bytes = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
        Self {
            width,
            height,
            format: PixelFormat::CANONICAL,
            buffer: PixelBuffer::Heap(bytes),
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

    /// Storage mode of the backing buffer.
    pub fn storage(&self) -> StorageMode {
        self.buffer.storage()
    }

    #[inline]
    pub fn is_canonical(&self) -> bool {
        self.format.is_canonical()
    }

    /// Raw pixel bytes in this raster's layout.
    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.buffer.as_bytes_mut()
    }

    /// Bytes per scanline.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.layout.bytes_per_pixel()
    }

    /// One scanline of raw bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.bytes()[start..start + stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.bytes_mut()[start..start + stride]
    }

    /// Packed ARGB value of a pixel, converting from the native layout.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let bpp = self.format.layout.bytes_per_pixel();
        let idx = (y as usize * self.width as usize + x as usize) * bpp;
        self.format.layout.read_argb(&self.bytes()[idx..idx + bpp])
    }

    /// Store a packed ARGB value. Only valid on canonical rasters.
    pub fn set_pixel(&mut self, x: u32, y: u32, argb: u32) {
        debug_assert!(self.is_canonical(), "set_pixel on non-canonical raster");
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.bytes_mut()[idx..idx + 4].copy_from_slice(&argb.to_le_bytes());
    }

    /// All pixels as packed ARGB, row-major.
    pub fn to_argb(&self) -> Vec<u32> {
        let bpp = self.format.layout.bytes_per_pixel();
        self.bytes()
            .chunks_exact(bpp)
            .map(|px| self.format.layout.read_argb(px))
            .collect()
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A vector-backed image whose rasterization is deferred.
pub trait VectorSource: Send + Sync + fmt::Debug {
    /// Intrinsic width in pixels.
    fn width(&self) -> u32;

    /// Intrinsic height in pixels.
    fn height(&self) -> u32;

    /// Render the scene at the given scale and angle in degrees.
    fn rasterize(&self, scale: f64, angle_degrees: f64) -> Image;
}

/// Either a raster or a vector image.
///
/// Cloning is cheap: both variants are reference counted, and identity is
/// preserved through clones (see [`Image::ptr_eq`]).
#[derive(Debug, Clone)]
pub enum Image {
    Raster(Arc<Raster>),
    Vector(Arc<dyn VectorSource>),
}

static NULL_IMAGE: LazyLock<Image> = LazyLock::new(|| Image::Raster(Arc::new(Raster::new(1, 1))));

impl Image {
    /// The shared 1×1 transparent placeholder.
    pub fn null() -> Image {
        NULL_IMAGE.clone()
    }

    /// Returns true if this is the shared placeholder instance.
    pub fn is_null(&self) -> bool {
        self.ptr_eq(&NULL_IMAGE)
    }

    pub fn width(&self) -> u32 {
        match self {
            Image::Raster(r) => r.width(),
            Image::Vector(v) => v.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Image::Raster(r) => r.height(),
            Image::Vector(v) => v.height(),
        }
    }

    /// The raster, if this is a raster image.
    pub fn as_raster(&self) -> Option<&Arc<Raster>> {
        match self {
            Image::Raster(r) => Some(r),
            Image::Vector(_) => None,
        }
    }

    /// Returns true if both values refer to the same underlying image.
    pub fn ptr_eq(&self, other: &Image) -> bool {
        match (self, other) {
            (Image::Raster(a), Image::Raster(b)) => Arc::ptr_eq(a, b),
            (Image::Vector(a), Image::Vector(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl From<Raster> for Image {
    fn from(raster: Raster) -> Self {
        Image::Raster(Arc::new(raster))
    }
}
