//! 2D affine transforms.
//!
//! Matrices act on column vectors in a y-down coordinate system:
//!
//! ```text
//! [x']   [m00 m01 m02] [x]
//! [y'] = [m10 m11 m12] [y]
//!                      [1]
//! ```
//!
//! The builder methods post-multiply, so operations read in the order they
//! apply to the *matrix*, and in reverse order to points: after
//! `t.translate(a); t.scale(s)` a point is scaled first, then translated.

/// Tolerance for snapping sines and cosines of quadrant angles.
const TRIG_EPSILON: f64 = 1e-12;

/// A 2×3 affine matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub m00: f64,
    pub m01: f64,
    pub m02: f64,
    pub m10: f64,
    pub m11: f64,
    pub m12: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub const fn identity() -> Self {
        Self {
            m00: 1.0,
            m01: 0.0,
            m02: 0.0,
            m10: 0.0,
            m11: 1.0,
            m12: 0.0,
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            m02: tx,
            m12: ty,
            ..Self::identity()
        }
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self {
            m00: sx,
            m11: sy,
            ..Self::identity()
        }
    }

    /// Rotation by `theta` radians about the origin.
    ///
    /// Quadrant angles produce exact 0/±1 entries.
    pub fn rotation(theta: f64) -> Self {
        let (mut sin, mut cos) = theta.sin_cos();
        if (sin.abs() - 1.0).abs() < TRIG_EPSILON {
            sin = sin.signum();
            cos = 0.0;
        } else if (cos.abs() - 1.0).abs() < TRIG_EPSILON {
            cos = cos.signum();
            sin = 0.0;
        }
        Self {
            m00: cos,
            m01: -sin,
            m02: 0.0,
            m10: sin,
            m11: cos,
            m12: 0.0,
        }
    }

    /// Matrix product `self · other`.
    pub fn concat(&self, other: &Affine) -> Affine {
        Affine {
            m00: self.m00 * other.m00 + self.m01 * other.m10,
            m01: self.m00 * other.m01 + self.m01 * other.m11,
            m02: self.m00 * other.m02 + self.m01 * other.m12 + self.m02,
            m10: self.m10 * other.m00 + self.m11 * other.m10,
            m11: self.m10 * other.m01 + self.m11 * other.m11,
            m12: self.m10 * other.m02 + self.m11 * other.m12 + self.m12,
        }
    }

    pub fn translate(&mut self, tx: f64, ty: f64) -> &mut Self {
        *self = self.concat(&Affine::translation(tx, ty));
        self
    }

    pub fn scale(&mut self, sx: f64, sy: f64) -> &mut Self {
        *self = self.concat(&Affine::scaling(sx, sy));
        self
    }

    pub fn rotate(&mut self, theta: f64) -> &mut Self {
        *self = self.concat(&Affine::rotation(theta));
        self
    }

    /// Rotate by `theta` radians about the point `(cx, cy)`.
    pub fn rotate_about(&mut self, theta: f64, cx: f64, cy: f64) -> &mut Self {
        self.translate(cx, cy).rotate(theta).translate(-cx, -cy)
    }

    /// Map a point.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m00 * x + self.m01 * y + self.m02,
            self.m10 * x + self.m11 * y + self.m12,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// Inverse transform, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            m00: self.m11 * inv,
            m01: -self.m01 * inv,
            m02: (self.m01 * self.m12 - self.m11 * self.m02) * inv,
            m10: -self.m10 * inv,
            m11: self.m00 * inv,
            m12: (self.m10 * self.m02 - self.m00 * self.m12) * inv,
        })
    }
}
