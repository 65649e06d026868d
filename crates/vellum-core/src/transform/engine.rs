//! Path selection for scale + rotate requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::canonical::to_canonical_small;
use crate::geometry::{rotate_scale, transform_bounds, Affine, Bounds};
use crate::image::{BufferError, Image, Raster};
use crate::preferences::{OpCache, Preferences, Quality, QualitySubscription};
use crate::resample::{zoom, Kernel};

use super::draw::draw_transformed;
use super::{ExtInterpolation, RenderingHints};

/// A single transform request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformRequest {
    /// Uniform scale factor.
    pub scale: f64,
    /// Rotation in degrees.
    pub angle: f64,
    /// Overrides the preference quality when set.
    #[serde(default)]
    pub quality: Option<Quality>,
    /// Overrides the default hints when set.
    #[serde(default)]
    pub hints: Option<RenderingHints>,
}

impl TransformRequest {
    pub fn new(scale: f64, angle: f64) -> Self {
        Self {
            scale,
            angle,
            quality: None,
            hints: None,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_hints(mut self, hints: RenderingHints) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.angle == 0.0
    }
}

/// Transform engine bound to a shared preference state.
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    preferences: Arc<Preferences>,
    _subscription: Option<Arc<QualitySubscription>>,
}

impl ImageTransformer {
    pub fn new(preferences: Arc<Preferences>) -> Self {
        Self {
            preferences,
            _subscription: None,
        }
    }

    /// Create a transformer that clears `cache` whenever the quality
    /// preference changes.
    ///
    /// The registration ends when the last clone of this transformer is
    /// dropped. Transformers sharing one cache clear it once per change.
    pub fn with_cache(preferences: Arc<Preferences>, cache: Arc<dyn OpCache>) -> Self {
        let subscription = preferences.clear_on_quality_change(&cache);
        Self {
            preferences,
            _subscription: Some(Arc::new(subscription)),
        }
    }

    pub fn preferences(&self) -> &Arc<Preferences> {
        &self.preferences
    }

    /// Hints used when a request carries none.
    pub fn default_hints(&self) -> RenderingHints {
        RenderingHints::for_quality(self.preferences.quality())
    }

    /// Transform with default hints and the preference quality.
    pub fn transform(&self, image: &Image, scale: f64, angle: f64) -> Image {
        self.transform_with(image, scale, angle, None, None)
    }

    /// Transform with optional caller hints and quality override.
    ///
    /// Caller hints may be overwritten by the quadrant and filtered paths.
    pub fn transform_with(
        &self,
        image: &Image,
        scale: f64,
        angle: f64,
        hints: Option<&mut RenderingHints>,
        quality: Option<Quality>,
    ) -> Image {
        let quality = quality.unwrap_or_else(|| self.preferences.quality());
        let mut defaults = RenderingHints::for_quality(quality);
        let hints = hints.unwrap_or(&mut defaults);
        transform_image(image, scale, angle, hints, quality)
    }

    /// Run a request. Hints carried by the request are updated in place the
    /// same way [`transform_with`](Self::transform_with) updates caller hints.
    pub fn transform_request(&self, image: &Image, request: &mut TransformRequest) -> Image {
        self.transform_with(
            image,
            request.scale,
            request.angle,
            request.hints.as_mut(),
            request.quality,
        )
    }
}

/// Scale by `scale` and rotate by `angle` degrees about the pseudo-center.
///
/// Paths, in order:
/// 1. identity request: the input itself
/// 2. scaled size rounds to zero: [`Image::null`]
/// 3. vector input: delegated to [`VectorSource::rasterize`](crate::image::VectorSource::rasterize)
/// 4. unit scale, multiple of 90°: exact remap (nearest, no antialiasing)
/// 5. [`Quality::High`]: rotate, then filtered zoom
/// 6. otherwise: one affine draw with the given hints
///
/// Raster sources are converted to canonical sRGB before any path runs. A
/// destination canvas too large to allocate yields [`Image::null`].
pub fn transform_image(
    image: &Image,
    scale: f64,
    angle: f64,
    hints: &mut RenderingHints,
    quality: Quality,
) -> Image {
    if scale == 1.0 && angle == 0.0 {
        return image.clone();
    }

    let scaled_w = (image.width() as f64 * scale).floor();
    let scaled_h = (image.height() as f64 * scale).floor();
    if scaled_w <= 0.0 || scaled_h <= 0.0 {
        trace!(scale, width = image.width(), height = image.height(), "Scaled to nothing");
        return Image::null();
    }

    let src = match image {
        Image::Vector(vector) => return vector.rasterize(scale, angle),
        Image::Raster(raster) => raster,
    };
    trace!(width = src.width(), height = src.height(), scale, angle, ?quality, "transform");

    match render(src, scale, angle, hints, quality) {
        Ok(out) => Image::from(out),
        Err(e) => {
            warn!(scale, angle, error = %e, "Transform canvas allocation failed");
            Image::null()
        }
    }
}

fn render(
    src: &Raster,
    scale: f64,
    angle: f64,
    hints: &mut RenderingHints,
    quality: Quality,
) -> Result<Raster, BufferError> {
    let converted;
    let src = if src.is_canonical() {
        src
    } else {
        debug!(layout = ?src.format().layout, "Canonicalizing transform source");
        converted = to_canonical_small(src)?;
        &converted
    };

    if scale == 1.0 && angle % 90.0 == 0.0 {
        debug!(angle, "Quadrant rotation");
        hints.force_nearest();
        affine_draw(src, 1.0, angle, hints)
    } else if quality == Quality::High {
        hints.ext_interpolation = Some(ExtInterpolation::LanczosMitchell);
        filtered(src, scale, angle, hints)
    } else {
        affine_draw(src, scale, angle, hints)
    }
}

/// Rotate with the affine rasterizer, then resize with a windowed filter.
fn filtered(
    src: &Raster,
    scale: f64,
    angle: f64,
    hints: &RenderingHints,
) -> Result<Raster, BufferError> {
    let kernel = Kernel::for_scale(scale);
    debug!(?kernel, scale, angle, "Filtered transform");

    if angle == 0.0 {
        return zoom(&transform_bounds(&Bounds::of(src), scale, 0.0), src, kernel);
    }
    let rotated = affine_draw(src, 1.0, angle, hints)?;
    if scale == 1.0 {
        return Ok(rotated);
    }
    zoom(&transform_bounds(&Bounds::of(&rotated), scale, 0.0), &rotated, kernel)
}

/// Single affine draw into a canvas sized by [`transform_bounds`].
fn affine_draw(
    src: &Raster,
    scale: f64,
    angle: f64,
    hints: &RenderingHints,
) -> Result<Raster, BufferError> {
    let ubox = Bounds::of(src);
    let tbox = transform_bounds(&ubox, scale, angle);

    // Pixel space -> pseudo-center space -> rotate/scale -> canvas space.
    let mut t = Affine::translation(-tbox.x as f64, -tbox.y as f64)
        .concat(&rotate_scale(&ubox, scale, angle));
    t.translate(ubox.x as f64, ubox.y as f64);

    let mut dst = Raster::try_new(tbox.width, tbox.height)?;
    draw_transformed(&mut dst, src, &t, hints);
    Ok(dst)
}
