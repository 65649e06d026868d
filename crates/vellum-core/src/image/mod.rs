//! In-memory image model.
//!
//! - [`Raster`]: pixel grid with a [`PixelFormat`] and a storage-tagged
//!   [`PixelBuffer`]
//! - [`Image`]: closed variant over rasters and deferred vector sources
//! - [`Image::null`]: the shared 1×1 transparent placeholder
//!
//! The canonical format is packed ARGB (`0xAARRGGBB`, little-endian words)
//! in sRGB. Every image handed back by the transform engine or the loader
//! is canonical.

mod buffer;
mod raster;
mod types;

pub use buffer::{byte_len, BufferError, MappedBuffer, PixelBuffer};
pub use raster::{Image, Raster, VectorSource};
pub use types::{pack_argb, unpack_argb, ColorSpace, PixelFormat, SampleLayout, StorageMode};

pub(crate) use types::{premultiply, quantize, unpremultiply};
