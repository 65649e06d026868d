//! Conversion of decoded rasters to the canonical packed-ARGB format.
//!
//! Two copy strategies exist:
//! - **Row-by-row copy**: one scanline at a time, samples reinterpreted as
//!   8-bit ARGB with no transfer-function math. Used only when the source
//!   is already sRGB and lives in the destination's storage family.
//! - **Color-convert copy**: a [`ColorConvert`] operator from the source
//!   color space to sRGB applied over the whole buffer.
//!
//! Small images always take the color-convert path into a fresh heap
//! raster ([`to_canonical_small`]). Large ones go through
//! [`to_canonical_large`], which retries with the alternate storage mode.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::image::{
    pack_argb, quantize, BufferError, ColorSpace, PixelFormat, Raster, StorageMode,
};
use crate::loader::LoadError;

/// Per-pixel color-space conversion operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorConvert {
    from: ColorSpace,
    to: ColorSpace,
}

impl ColorConvert {
    pub fn new(from: ColorSpace, to: ColorSpace) -> Self {
        Self { from, to }
    }

    /// Convert one normalized, non-premultiplied `[a, r, g, b]` sample.
    #[inline]
    pub fn convert(&self, px: [f32; 4]) -> [f32; 4] {
        let transfer: fn(f32) -> f32 = match (self.from, self.to) {
            (ColorSpace::LinearSrgb, ColorSpace::Srgb) => linear_to_srgb,
            (ColorSpace::Srgb, ColorSpace::LinearSrgb) => srgb_to_linear,
            _ => return px,
        };
        [px[0], transfer(px[1]), transfer(px[2]), transfer(px[3])]
    }

    /// Convert every pixel of `src` into the canonical raster `dst`.
    pub fn filter(&self, src: &Raster, dst: &mut Raster) {
        debug_assert!(dst.is_canonical());
        debug_assert_eq!((src.width(), src.height()), (dst.width(), dst.height()));

        let layout = src.format().layout;
        let bpp = layout.bytes_per_pixel();
        let out = dst.bytes_mut();
        for (i, px) in src.bytes().chunks_exact(bpp).enumerate() {
            let [a, r, g, b] = self.convert(layout.read_normalized(px));
            let argb = pack_argb(quantize(a), quantize(r), quantize(g), quantize(b));
            out[i * 4..i * 4 + 4].copy_from_slice(&argb.to_le_bytes());
        }
    }
}

/// sRGB opto-electronic transfer function.
#[inline]
fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Inverse of [`linear_to_srgb`].
#[inline]
fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.040_45 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Copy `src` into canonical `dst` one scanline at a time.
pub fn row_by_row_copy(src: &Raster, dst: &mut Raster) {
    debug_assert!(dst.is_canonical());
    let layout = src.format().layout;
    let bpp = layout.bytes_per_pixel();
    let mut row = vec![0u32; src.width() as usize];

    for y in 0..src.height() {
        for (slot, px) in row.iter_mut().zip(src.row(y).chunks_exact(bpp)) {
            *slot = layout.read_argb(px);
        }
        for (out, argb) in dst.row_mut(y).chunks_exact_mut(4).zip(&row) {
            out.copy_from_slice(&argb.to_le_bytes());
        }
    }
}

/// Copy `src` into canonical `dst` through a color-space conversion.
pub fn color_convert_copy(src: &Raster, dst: &mut Raster) {
    ColorConvert::new(src.format().color_space, dst.format().color_space).filter(src, dst);
}

/// Convert to canonical ARGB with the requested destination storage.
///
/// Canonical input is returned as-is (same `Arc`). Otherwise a destination
/// is allocated with `dest` storage. An sRGB source already in `dest`
/// storage is copied row by row; anything else goes through a color-space
/// conversion, so the pixels never depend on `dest`.
pub fn to_canonical(
    src: &Arc<Raster>,
    dest: StorageMode,
    temp_root: &Path,
) -> Result<Arc<Raster>, BufferError> {
    if src.is_canonical() {
        return Ok(Arc::clone(src));
    }
    trace!(
        width = src.width(),
        height = src.height(),
        layout = ?src.format().layout,
        source = ?src.storage(),
        ?dest,
        "to_canonical"
    );

    let mut dst = Raster::allocate(
        src.width(),
        src.height(),
        PixelFormat::CANONICAL,
        dest,
        temp_root,
    )?;

    if src.storage() == dest && src.format().color_space == ColorSpace::Srgb {
        debug!("Canonicalizing by row copy");
        row_by_row_copy(src, &mut dst);
    } else {
        debug!("Canonicalizing by color conversion");
        color_convert_copy(src, &mut dst);
    }
    Ok(Arc::new(dst))
}

/// Convert a small raster into a fresh canonical heap raster.
pub fn to_canonical_small(src: &Raster) -> Result<Raster, BufferError> {
    let mut dst = Raster::try_new(src.width(), src.height())?;
    color_convert_copy(src, &mut dst);
    Ok(dst)
}

/// Convert a large raster, trying `preferred` storage first and the other
/// mode second.
///
/// Fails with [`LoadError::OutOfMemory`] only when both allocations fail.
pub fn to_canonical_large(
    src: &Arc<Raster>,
    preferred: StorageMode,
    temp_root: &Path,
) -> Result<Arc<Raster>, LoadError> {
    if src.is_canonical() {
        return Ok(Arc::clone(src));
    }

    for mode in [preferred, preferred.other()] {
        match to_canonical(src, mode, temp_root) {
            Ok(raster) => return Ok(raster),
            Err(e) => warn!(?mode, error = %e, "Canonical copy failed, trying next storage mode"),
        }
    }
    Err(LoadError::OutOfMemory)
}

/// Copy any raster into a memory-mapped canonical raster.
pub fn to_memory_mapped(src: &Raster, temp_root: &Path) -> Result<Raster, BufferError> {
    let mut dst = Raster::allocate(
        src.width(),
        src.height(),
        PixelFormat::CANONICAL,
        StorageMode::MemoryMapped,
        temp_root,
    )?;
    if src.format().color_space == ColorSpace::Srgb {
        row_by_row_copy(src, &mut dst);
    } else {
        color_convert_copy(src, &mut dst);
    }
    Ok(dst)
}
