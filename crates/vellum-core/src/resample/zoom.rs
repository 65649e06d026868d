//! Separable filtered zoom.
//!
//! # Algorithm
//!
//! Two passes over premultiplied `f32` ARGB: horizontal into an intermediate
//! buffer of `dst_w × src_h`, then vertical into `dst_w × dst_h`. For each
//! output sample the source-space center is
//!
//! ```text
//! center = (dst + 0.5) / scale
//! ```
//!
//! and every source pixel within `support * max(1, 1/scale)` contributes
//! `kernel((src + 0.5 - center) / max(1, 1/scale))`. Taps that fall off the
//! image are clamped onto the edge pixel, and the weights of each output
//! sample are renormalized to sum to one, so edges keep their brightness.

use tracing::{debug, trace};

use super::Kernel;
use crate::canonical::to_canonical_small;
use crate::geometry::Bounds;
use crate::image::{premultiply, unpremultiply, BufferError, Raster};

/// Weights of one output sample over a contiguous run of source indices.
#[derive(Debug, Clone)]
struct Contribution {
    first: usize,
    weights: Vec<f32>,
}

/// Compute per-output contributions for resampling `src_len` to `dst_len`.
fn contributions(src_len: usize, dst_len: usize, kernel: Kernel) -> Vec<Contribution> {
    let scale = dst_len as f32 / src_len as f32;
    let filter_scale = (1.0 / scale).max(1.0);
    let support = kernel.support() * filter_scale;
    let last = src_len as isize - 1;

    (0..dst_len)
        .map(|d| {
            let center = (d as f32 + 0.5) / scale;
            let left = (center - support).floor() as isize;
            let right = (center + support).ceil() as isize;

            let first = left.clamp(0, last) as usize;
            let end = right.clamp(0, last) as usize;
            let mut weights = vec![0.0f32; end - first + 1];

            for s in left..=right {
                let w = kernel.weight((s as f32 + 0.5 - center) / filter_scale);
                if w == 0.0 {
                    continue;
                }
                let idx = s.clamp(0, last) as usize;
                weights[idx - first] += w;
            }

            let sum: f32 = weights.iter().sum();
            if sum.abs() > f32::EPSILON {
                for w in &mut weights {
                    *w /= sum;
                }
            } else {
                // Degenerate footprint: fall back to the nearest source pixel.
                weights.iter_mut().for_each(|w| *w = 0.0);
                let nearest = (center.floor() as isize).clamp(0, last) as usize;
                weights[nearest - first] = 1.0;
            }

            Contribution { first, weights }
        })
        .collect()
}

#[inline]
fn accumulate(acc: &mut [f32; 4], px: &[f32; 4], w: f32) {
    for c in 0..4 {
        acc[c] += px[c] * w;
    }
}

/// Resample `src` to `dest.width × dest.height` with `kernel`.
///
/// Non-canonical sources are converted first. The result is always a
/// canonical heap raster; a canvas that cannot be allocated is reported as
/// [`BufferError`].
pub fn zoom(dest: &Bounds, src: &Raster, kernel: Kernel) -> Result<Raster, BufferError> {
    if !src.is_canonical() {
        let canonical = to_canonical_small(src)?;
        return zoom(dest, &canonical, kernel);
    }

    let (src_w, src_h) = (src.width() as usize, src.height() as usize);
    let (dst_w, dst_h) = (dest.width as usize, dest.height as usize);
    trace!(src_w, src_h, dst_w, dst_h, ?kernel, "zoom");

    let mut out = Raster::try_new(dest.width, dest.height)?;
    if dst_w == 0 || dst_h == 0 || src_w == 0 || src_h == 0 {
        return Ok(out);
    }
    debug!(?kernel, "Filtered zoom {}x{} -> {}x{}", src_w, src_h, dst_w, dst_h);

    let pixels: Vec<[f32; 4]> = src.to_argb().into_iter().map(premultiply).collect();

    // Horizontal pass: src_w x src_h -> dst_w x src_h
    let horizontal = contributions(src_w, dst_w, kernel);
    let mut temp = scratch(dst_w * src_h)?;
    for y in 0..src_h {
        let row = &pixels[y * src_w..(y + 1) * src_w];
        for (x, contrib) in horizontal.iter().enumerate() {
            let mut acc = [0.0f32; 4];
            for (i, &w) in contrib.weights.iter().enumerate() {
                accumulate(&mut acc, &row[contrib.first + i], w);
            }
            temp[y * dst_w + x] = acc;
        }
    }

    // Vertical pass: dst_w x src_h -> dst_w x dst_h
    let vertical = contributions(src_h, dst_h, kernel);
    for (y, contrib) in vertical.iter().enumerate() {
        for x in 0..dst_w {
            let mut acc = [0.0f32; 4];
            for (i, &w) in contrib.weights.iter().enumerate() {
                accumulate(&mut acc, &temp[(contrib.first + i) * dst_w + x], w);
            }
            out.set_pixel(x as u32, y as u32, unpremultiply(acc));
        }
    }

    Ok(out)
}

/// Zeroed intermediate buffer, failing instead of aborting when too large.
fn scratch(len: usize) -> Result<Vec<[f32; 4]>, BufferError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| BufferError::OutOfMemory(len.saturating_mul(16)))?;
    buf.resize(len, [0.0; 4]);
    Ok(buf)
}
