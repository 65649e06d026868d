//! Adaptive image loading.
//!
//! # Architecture
//!
//! A load pulls bytes from an [`ImageSource`], copies them into a
//! [`CachedStream`] under the caller's temp root, and hands that to a
//! [`DecoderProvider`] which returns a [`RasterDecoder`] positioned past
//! the header.
//!
//! # Large images
//!
//! [`LargeImageLoader::load_large`] makes at most two tries, the preferred
//! [`StorageMode`](crate::image::StorageMode) first and the other second,
//! re-opening the stream each time:
//!
//! - **MemoryMapped**: decode straight into a mapped temp-file buffer. Any
//!   allocation, I/O or decode failure is soft.
//! - **Heap**: decode into a fresh heap buffer. Only memory exhaustion is
//!   soft; other decode errors are returned as-is.
//!
//! An unrecognized format stops the loop at once. If both tries fail
//! softly the load fails with [`LoadError::OutOfMemory`]. A successful
//! load is converted to canonical ARGB before it is returned.

mod decoder;
mod large;
mod source;
mod types;

pub use decoder::{DecoderProvider, ImageCrateDecoders, RasterDecoder};
pub use large::{is_large_image, LargeImageLoader, LARGE_IMAGE_BYTES};
pub use source::{CachedStream, DirectorySource, ImageSource};
pub use types::{DecodeError, LoadError, TryOutcome};
