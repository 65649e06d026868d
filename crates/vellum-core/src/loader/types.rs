//! Error and outcome types for image loading.

use std::io;

use image::error::{ImageError, LimitErrorKind};
use thiserror::Error;

use crate::image::{BufferError, Raster};

/// Errors raised by a [`RasterDecoder`](super::RasterDecoder).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The destination buffer could not be allocated.
    #[error("Out of memory during decoding")]
    OutOfMemory,

    /// I/O error while reading the stream or writing a mapped buffer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The image data is corrupted or incomplete.
    #[error("Corrupted or incomplete image: {0}")]
    Corrupt(String),

    /// The decoder produces a sample layout with no raster counterpart.
    #[error("Unsupported sample layout: {0}")]
    UnsupportedLayout(String),
}

impl From<BufferError> for DecodeError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::OutOfMemory(_) => DecodeError::OutOfMemory,
            BufferError::Io(e) => DecodeError::Io(e),
            BufferError::InvalidSize(msg) => DecodeError::Corrupt(msg),
        }
    }
}

impl From<ImageError> for DecodeError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::IoError(e) => DecodeError::Io(e),
            ImageError::Limits(e) if matches!(e.kind(), LimitErrorKind::InsufficientMemory) => {
                DecodeError::OutOfMemory
            }
            ImageError::Unsupported(e) => DecodeError::UnsupportedLayout(e.to_string()),
            other => DecodeError::Corrupt(other.to_string()),
        }
    }
}

/// Errors surfaced by the loader.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No decoder recognizes the stream. Never retried.
    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    /// Every storage strategy was exhausted.
    #[error("Out of memory loading image")]
    OutOfMemory,

    /// Opening or caching the stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Decoding failed for a reason other than memory exhaustion.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result of a single load try.
#[derive(Debug)]
pub enum TryOutcome {
    /// Pixels were decoded into a buffer of the try's storage mode.
    Loaded(Raster),
    /// The try failed in a way the next storage mode may avoid.
    Soft(DecodeError),
}
