//! Windowed resampling kernels.

use serde::{Deserialize, Serialize};

/// Separable filter kernel used by [`zoom`](super::zoom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kernel {
    /// Mitchell-Netravali cubic (B = C = 1/3). Moderately sharp; used when
    /// enlarging.
    Mitchell,
    /// Lanczos windowed sinc with three lobes. Wide support with strong
    /// anti-aliasing; used when shrinking.
    Lanczos3,
}

/// Kernel used for magnification.
pub const MAGNIFY: Kernel = Kernel::Mitchell;

/// Kernel used for minification.
pub const MINIFY: Kernel = Kernel::Lanczos3;

impl Kernel {
    /// Pick the kernel for a zoom factor: Mitchell above 1.0, Lanczos3 otherwise.
    pub fn for_scale(scale: f64) -> Self {
        if scale > 1.0 {
            MAGNIFY
        } else {
            MINIFY
        }
    }

    /// Support radius in source pixels at unit scale.
    #[inline]
    pub fn support(self) -> f32 {
        match self {
            Kernel::Mitchell => 2.0,
            Kernel::Lanczos3 => 3.0,
        }
    }

    /// Kernel response at offset `x`.
    #[inline]
    pub fn weight(self, x: f32) -> f32 {
        match self {
            Kernel::Mitchell => mitchell_weight(x),
            Kernel::Lanczos3 => lanczos_weight(x, 3.0),
        }
    }
}

/// Mitchell-Netravali cubic with B = C = 1/3.
#[inline]
fn mitchell_weight(x: f32) -> f32 {
    const B: f32 = 1.0 / 3.0;
    const C: f32 = 1.0 / 3.0;
    let ax = x.abs();
    if ax < 1.0 {
        ((12.0 - 9.0 * B - 6.0 * C) * ax * ax * ax
            + (-18.0 + 12.0 * B + 6.0 * C) * ax * ax
            + (6.0 - 2.0 * B))
            / 6.0
    } else if ax < 2.0 {
        ((-B - 6.0 * C) * ax * ax * ax
            + (6.0 * B + 30.0 * C) * ax * ax
            + (-12.0 * B - 48.0 * C) * ax
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        0.0
    }
}

/// Lanczos kernel: `sinc(x) * sinc(x / a)` inside `|x| < a`, zero outside.
#[inline]
fn lanczos_weight(x: f32, a: f32) -> f32 {
    let ax = x.abs();
    if ax < 1e-8 {
        1.0
    } else if ax < a {
        let pi_x = std::f32::consts::PI * ax;
        let pi_x_a = pi_x / a;
        (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_for_scale() {
        assert_eq!(Kernel::for_scale(2.0), Kernel::Mitchell);
        assert_eq!(Kernel::for_scale(1.0), Kernel::Lanczos3);
        assert_eq!(Kernel::for_scale(0.5), Kernel::Lanczos3);
    }

    #[test]
    fn test_lanczos_weight_at_zero() {
        assert!((Kernel::Lanczos3.weight(0.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lanczos_weight_vanishes_at_integers() {
        for x in [1.0, 2.0, -1.0, -2.0, 3.0] {
            assert!(Kernel::Lanczos3.weight(x).abs() < 1e-6, "x = {}", x);
        }
    }

    #[test]
    fn test_weights_are_symmetric() {
        for kernel in [Kernel::Mitchell, Kernel::Lanczos3] {
            for x in [0.25, 0.5, 1.3, 1.9] {
                assert!((kernel.weight(x) - kernel.weight(-x)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_weights_outside_support_are_zero() {
        for kernel in [Kernel::Mitchell, Kernel::Lanczos3] {
            assert_eq!(kernel.weight(kernel.support()), 0.0);
            assert_eq!(kernel.weight(kernel.support() + 0.5), 0.0);
        }
    }

    #[test]
    fn test_mitchell_partition_of_unity() {
        // Integer-spaced taps of a Mitchell cubic sum to one.
        for offset in [0.0f32, 0.25, 0.5, 0.75] {
            let sum: f32 = (-2..=2).map(|i| Kernel::Mitchell.weight(i as f32 + offset)).sum();
            assert!((sum - 1.0).abs() < 1e-4, "offset {} sum {}", offset, sum);
        }
    }
}
