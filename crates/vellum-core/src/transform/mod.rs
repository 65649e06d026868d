//! Scale and rotate transforms.
//!
//! [`ImageTransformer`] picks one of four paths per request:
//!
//! - **Identity**: scale 1, angle 0; the input is returned untouched
//! - **Quadrant**: scale 1, angle a multiple of 90°; an exact pixel remap
//! - **Filtered**: quality [`High`](crate::preferences::Quality::High);
//!   rotation through the affine rasterizer, then a windowed-filter zoom
//! - **Standard**: one affine draw using the request's [`RenderingHints`]
//!
//! Vector images skip all of these and are rasterized by their source at
//! the requested scale and angle. Output bounds always come from
//! [`transform_bounds`](crate::geometry::transform_bounds).

mod draw;
mod engine;
mod hints;

pub use draw::draw_transformed;
pub use engine::{transform_image, ImageTransformer, TransformRequest};
pub use hints::{ExtInterpolation, Interpolation, RenderingHints};
