//! Vellum Core - image transform and adaptive loading
//!
//! This crate produces rotated and scaled copies of in-memory images at a
//! chosen quality, and loads very large images into heap or memory-mapped
//! pixel buffers, falling back from one to the other when the first fails.
//! Everything runs synchronously on the calling thread.

pub mod canonical;
pub mod geometry;
pub mod image;
pub mod loader;
pub mod preferences;
pub mod resample;
pub mod transform;

pub use geometry::{transform_bounds, Affine, Bounds};
pub use crate::image::{Image, PixelFormat, Raster, StorageMode, VectorSource};
pub use loader::{DirectorySource, ImageCrateDecoders, ImageSource, LargeImageLoader, LoadError};
pub use preferences::{OpCache, PreferenceSettings, Preferences, Quality, QualitySubscription};
pub use transform::{ImageTransformer, RenderingHints, TransformRequest};
