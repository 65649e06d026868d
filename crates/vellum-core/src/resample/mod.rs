//! High-quality filtered resampling.
//!
//! Two fixed kernels cover the quality path of the transform engine:
//! - **Mitchell** ([`MAGNIFY`]): enlarging
//! - **Lanczos3** ([`MINIFY`]): shrinking
//!
//! [`zoom`] only performs uniform scaling. Rotation is handled beforehand
//! by the affine rasterizer.

mod kernel;
mod zoom;

pub use kernel::{Kernel, MAGNIFY, MINIFY};
pub use zoom::zoom;
