//! Affine rasterizer.
//!
//! Uses inverse mapping: for each destination pixel center we compute the
//! source position through the inverse transform and sample there with the
//! interpolation named by the hints.
//!
//! Edge policy: with antialiasing on, taps that fall outside the source
//! read as transparent, so edges fade over one pixel. With antialiasing
//! off, only destination pixels whose center maps inside the source are
//! written, and their taps are clamped to the source edge.

use crate::geometry::Affine;
use crate::image::{premultiply, unpremultiply, Raster};

use super::{Interpolation, RenderingHints};

/// Premultiplied, normalized `[a, r, g, b]`.
type Sample = [f32; 4];

const TRANSPARENT: Sample = [0.0; 4];

/// Source pixel fetch honoring the edge policy.
struct Sampler<'a> {
    src: &'a Raster,
    w: i64,
    h: i64,
    clamp: bool,
}

impl Sampler<'_> {
    #[inline]
    fn fetch(&self, x: i64, y: i64) -> Sample {
        if self.clamp {
            let x = x.clamp(0, self.w - 1) as u32;
            let y = y.clamp(0, self.h - 1) as u32;
            premultiply(self.src.pixel(x, y))
        } else if x < 0 || y < 0 || x >= self.w || y >= self.h {
            TRANSPARENT
        } else {
            premultiply(self.src.pixel(x as u32, y as u32))
        }
    }

    fn nearest(&self, u: f64, v: f64) -> Sample {
        self.fetch(u.floor() as i64, v.floor() as i64)
    }

    fn bilinear(&self, u: f64, v: f64) -> Sample {
        let x = u - 0.5;
        let y = v - 0.5;
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;

        let p00 = self.fetch(x0, y0);
        let p10 = self.fetch(x0 + 1, y0);
        let p01 = self.fetch(x0, y0 + 1);
        let p11 = self.fetch(x0 + 1, y0 + 1);

        let mut out = [0.0f32; 4];
        for c in 0..4 {
            out[c] = p00[c] * (1.0 - fx) * (1.0 - fy)
                + p10[c] * fx * (1.0 - fy)
                + p01[c] * (1.0 - fx) * fy
                + p11[c] * fx * fy;
        }
        out
    }

    fn bicubic(&self, u: f64, v: f64) -> Sample {
        let x = u - 0.5;
        let y = v - 0.5;
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;

        let wx = catmull_rom_weights(fx);
        let wy = catmull_rom_weights(fy);

        let mut out = [0.0f32; 4];
        for (j, wy) in wy.iter().enumerate() {
            for (i, wx) in wx.iter().enumerate() {
                let p = self.fetch(x0 - 1 + i as i64, y0 - 1 + j as i64);
                let w = wx * wy;
                for c in 0..4 {
                    out[c] += p[c] * w;
                }
            }
        }
        // Cubic overshoot may push color above alpha.
        let a = out[0].clamp(0.0, 1.0);
        [a, out[1].clamp(0.0, a), out[2].clamp(0.0, a), out[3].clamp(0.0, a)]
    }
}

/// Catmull-Rom weights for taps at offsets -1, 0, 1, 2 from the sample.
#[inline]
fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

/// Draw `src` into `dst` through `transform` (source → destination pixels).
///
/// `dst` must be canonical. `src` samples are read as 8-bit sRGB with no
/// transfer function, so linear sources are converted beforehand.
pub fn draw_transformed(dst: &mut Raster, src: &Raster, transform: &Affine, hints: &RenderingHints) {
    debug_assert!(dst.is_canonical());
    let Some(inverse) = transform.inverse() else {
        return;
    };
    if src.width() == 0 || src.height() == 0 {
        return;
    }

    let sampler = Sampler {
        src,
        w: src.width() as i64,
        h: src.height() as i64,
        clamp: !hints.antialiasing,
    };
    let (sw, sh) = (src.width() as f64, src.height() as f64);
    // With antialiasing, pixels up to one source pixel outside still pick
    // up partial coverage.
    let margin = if hints.antialiasing { 1.0 } else { 0.0 };

    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let (u, v) = inverse.apply(x as f64 + 0.5, y as f64 + 0.5);
            if u < -margin || v < -margin || u >= sw + margin || v >= sh + margin {
                continue;
            }

            let px = match hints.interpolation {
                Interpolation::NearestNeighbor => {
                    if u < 0.0 || v < 0.0 || u >= sw || v >= sh {
                        continue;
                    }
                    sampler.nearest(u, v)
                }
                Interpolation::Bilinear => sampler.bilinear(u, v),
                Interpolation::Bicubic => sampler.bicubic(u, v),
            };
            dst.set_pixel(x, y, unpremultiply(px));
        }
    }
}
