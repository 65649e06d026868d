//! Bounding-rectangle geometry for transforms.
//!
//! # Coordinate System
//!
//! Bounds are expressed relative to the *pseudo-center* of the image they
//! were derived from: a `w × h` image has bounds `(-(w/2), -(h/2), w, h)`
//! with integer division, so the pseudo-center sits on a pixel corner even
//! for odd sizes. Rotations pivot on that point, which keeps quadrant
//! rotations on the integer grid.
//!
//! Angles are in degrees and are applied as a rotation by `-angle` radians
//! in the y-down matrix convention of [`Affine`], so on screen a positive
//! angle turns the image counter-clockwise.

mod affine;

pub use affine::Affine;

use serde::{Deserialize, Serialize};

use crate::image::{Image, Raster};

/// Degrees to radians, negated for the display-angle convention.
pub const DEG_TO_RAD: f64 = -std::f64::consts::PI / 180.0;

/// Corners closer than this to an integer are snapped before rounding out.
const SNAP_EPSILON: f64 = 1e-9;

/// Integer rectangle in pseudo-center coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bounds of an untransformed `width × height` image.
    pub fn centered(width: u32, height: u32) -> Self {
        Self {
            x: -((width / 2) as i32),
            y: -((height / 2) as i32),
            width,
            height,
        }
    }

    /// Bounds of an untransformed raster.
    pub fn of(raster: &Raster) -> Self {
        Self::centered(raster.width(), raster.height())
    }

    /// Bounds of an untransformed image of either kind.
    pub fn of_image(image: &Image) -> Self {
        Self::centered(image.width(), image.height())
    }

    /// The rectangle's pseudo-center.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x + (self.width / 2) as i32) as f64,
            (self.y + (self.height / 2) as i32) as f64,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The four corners, clockwise from top-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (x0, y0) = (self.x as f64, self.y as f64);
        let (x1, y1) = (x0 + self.width as f64, y0 + self.height as f64);
        [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    /// Smallest integer rectangle enclosing the image of `self` under `t`.
    pub fn transformed_by(&self, t: &Affine) -> Bounds {
        let mut min = (f64::INFINITY, f64::INFINITY);
        let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (cx, cy) in self.corners() {
            let (x, y) = t.apply(cx, cy);
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }

        let x0 = snap(min.0).floor();
        let y0 = snap(min.1).floor();
        let x1 = snap(max.0).ceil();
        let y1 = snap(max.1).ceil();

        Bounds {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0).max(0.0) as u32,
            height: (y1 - y0).max(0.0) as u32,
        }
    }
}

/// Snap a coordinate to the nearest integer if it is within tolerance.
#[inline]
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON {
        r
    } else {
        v
    }
}

/// The rotation-then-scale map used by [`transform_bounds`]:
/// rotation about the bounds' pseudo-center applied after uniform scaling.
pub fn rotate_scale(src: &Bounds, scale: f64, angle_degrees: f64) -> Affine {
    let (cx, cy) = src.center();
    let mut t = Affine::identity();
    t.rotate_about(DEG_TO_RAD * angle_degrees, cx, cy)
        .scale(scale, scale);
    t
}

/// Bounds of `src` after rotating by `angle_degrees` about its pseudo-center
/// and scaling by `scale`, rounded out to whole pixels.
///
/// Always computed from untransformed bounds; feeding the result back in
/// accumulates rounding.
///
/// # Example
///
/// ```
/// use vellum_core::geometry::{transform_bounds, Bounds};
///
/// let b = transform_bounds(&Bounds::centered(4, 3), 1.0, 90.0);
/// assert_eq!((b.width, b.height), (3, 4));
/// ```
pub fn transform_bounds(src: &Bounds, scale: f64, angle_degrees: f64) -> Bounds {
    src.transformed_by(&rotate_scale(src, scale, angle_degrees))
}
