//! Storage-tagged pixel buffers.
//!
//! A [`PixelBuffer`] is either a plain heap allocation or a memory-mapped
//! temp file. The variant doubles as the buffer's [`StorageMode`] tag, and
//! [`PixelBuffer::allocate`] is the single factory for both.
//!
//! Heap allocations go through `Vec::try_reserve_exact` so that running out
//! of memory surfaces as [`BufferError::OutOfMemory`] instead of aborting.
//! Mapped allocations create an already-unlinked file under the supplied
//! temp root, so nothing is left behind once the buffer is dropped.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;
use tracing::trace;

use super::StorageMode;

/// Errors raised while allocating pixel storage.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The heap allocation could not be satisfied.
    #[error("Out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// Creating or mapping the backing file failed.
    #[error("Memory-mapped allocation failed: {0}")]
    Io(#[from] io::Error),

    /// The requested size is zero or overflows.
    #[error("Invalid buffer size: {0}")]
    InvalidSize(String),
}

/// A memory-mapped region backed by an unlinked temp file.
pub struct MappedBuffer {
    map: MmapMut,
    // The mapping outlives the descriptor on every platform we target, but
    // holding the file keeps the backing storage accounted to this buffer.
    _file: File,
}

impl MappedBuffer {
    fn create(len: usize, temp_root: &Path) -> io::Result<Self> {
        let file = tempfile::tempfile_in(temp_root)?;
        file.set_len(len as u64)?;
        // SAFETY: the file is private to this process (already unlinked) and
        // never resized after mapping.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        Ok(Self { map, _file: file })
    }
}

/// Pixel bytes together with their physical backing.
pub enum PixelBuffer {
    /// Heap-resident bytes.
    Heap(Vec<u8>),
    /// Memory-mapped bytes.
    Mapped(MappedBuffer),
}

impl PixelBuffer {
    /// Allocate a zeroed buffer of `len` bytes using the given storage mode.
    ///
    /// `temp_root` is only consulted for [`StorageMode::MemoryMapped`].
    pub fn allocate(mode: StorageMode, len: usize, temp_root: &Path) -> Result<Self, BufferError> {
        match mode {
            StorageMode::Heap => Self::heap(len),
            StorageMode::MemoryMapped => Self::mapped(len, temp_root),
        }
    }

    /// Allocate a zeroed heap buffer, reporting exhaustion as an error.
    pub fn heap(len: usize) -> Result<Self, BufferError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| BufferError::OutOfMemory(len))?;
        bytes.resize(len, 0);
        trace!(len, "heap pixel buffer");
        Ok(PixelBuffer::Heap(bytes))
    }

    /// Allocate a zeroed memory-mapped buffer under `temp_root`.
    pub fn mapped(len: usize, temp_root: &Path) -> Result<Self, BufferError> {
        if len == 0 {
            return Err(BufferError::InvalidSize(
                "cannot map an empty buffer".to_string(),
            ));
        }
        let mapped = MappedBuffer::create(len, temp_root)?;
        trace!(len, root = %temp_root.display(), "mapped pixel buffer");
        Ok(PixelBuffer::Mapped(mapped))
    }

    /// Storage mode tag of this buffer.
    pub fn storage(&self) -> StorageMode {
        match self {
            PixelBuffer::Heap(_) => StorageMode::Heap,
            PixelBuffer::Mapped(_) => StorageMode::MemoryMapped,
        }
    }

    /// Buffer contents.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PixelBuffer::Heap(bytes) => bytes,
            PixelBuffer::Mapped(mapped) => &mapped.map,
        }
    }

    /// Mutable buffer contents.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            PixelBuffer::Heap(bytes) => bytes,
            PixelBuffer::Mapped(mapped) => &mut mapped.map,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("storage", &self.storage())
            .field("len", &self.len())
            .finish()
    }
}

/// Byte length of a `width × height` buffer with `bytes_per_pixel`.
pub fn byte_len(width: u32, height: u32, bytes_per_pixel: usize) -> Result<usize, BufferError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(bytes_per_pixel))
        .ok_or_else(|| {
            BufferError::InvalidSize(format!(
                "{}x{} at {} bytes per pixel overflows",
                width, height, bytes_per_pixel
            ))
        })
}
