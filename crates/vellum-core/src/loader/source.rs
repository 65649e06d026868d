//! Named byte-stream sources and the temp-file stream cache.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use tracing::trace;

/// Supplies fresh byte streams for named images.
///
/// Each call to [`open`](ImageSource::open) must return an independent
/// stream; the loader re-opens on every try.
pub trait ImageSource: Send + Sync {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Release a stream returned by [`open`](ImageSource::open).
    fn close(&self, stream: Box<dyn Read + Send>) -> io::Result<()> {
        drop(stream);
        Ok(())
    }
}

/// Images stored as plain files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || !contained {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("image name escapes source root: {:?}", name),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ImageSource for DirectorySource {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let path = self.resolve(name)?;
        trace!(path = %path.display(), "open");
        Ok(Box::new(File::open(path)?))
    }
}

/// A stream copied in full to an unlinked temp file, readable and seekable.
pub struct CachedStream {
    reader: BufReader<File>,
    len: u64,
}

impl CachedStream {
    /// Copy `input` to a temp file under `temp_root` and rewind it.
    pub fn cache(mut input: impl Read, temp_root: &Path) -> io::Result<Self> {
        let mut file = tempfile::tempfile_in(temp_root)?;
        let len = io::copy(&mut input, &mut file)?;
        file.rewind()?;
        trace!(len, root = %temp_root.display(), "cached stream");
        Ok(Self {
            reader: BufReader::new(file),
            len,
        })
    }

    /// Number of cached bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for CachedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedStream").field("len", &self.len).finish()
    }
}

impl Read for CachedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for CachedStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

impl Seek for CachedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}
