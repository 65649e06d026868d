//! Rendering hints for affine drawing.

use serde::{Deserialize, Serialize};

use crate::preferences::Quality;

/// Pixel interpolation used by the affine rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Nearest source pixel; no blending.
    NearestNeighbor,
    /// 2×2 linear blend.
    #[default]
    Bilinear,
    /// 4×4 Catmull-Rom cubic.
    Bicubic,
}

/// Extended interpolation hint for consumers that understand filtered
/// resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtInterpolation {
    Bilinear,
    /// Mitchell for enlarging, Lanczos3 for shrinking.
    LanczosMitchell,
}

/// Hint set passed to the transform engine.
///
/// The quadrant and filtered paths overwrite fields in place to force the
/// settings they require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingHints {
    pub interpolation: Interpolation,
    /// Soften edges by blending with transparent surroundings.
    pub antialiasing: bool,
    pub ext_interpolation: Option<ExtInterpolation>,
}

impl Default for RenderingHints {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
            antialiasing: true,
            ext_interpolation: Some(ExtInterpolation::LanczosMitchell),
        }
    }
}

impl RenderingHints {
    /// Default hints for a quality level.
    pub fn for_quality(quality: Quality) -> Self {
        match quality {
            Quality::Low => Self {
                interpolation: Interpolation::NearestNeighbor,
                antialiasing: false,
                ext_interpolation: Some(ExtInterpolation::Bilinear),
            },
            Quality::Medium => Self {
                ext_interpolation: Some(ExtInterpolation::Bilinear),
                ..Self::default()
            },
            Quality::High => Self::default(),
        }
    }

    /// Force exact pixel remapping: nearest neighbor, no antialiasing.
    pub fn force_nearest(&mut self) {
        self.interpolation = Interpolation::NearestNeighbor;
        self.antialiasing = false;
    }
}
