//! Storage-alternating loader.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::canonical::{to_canonical_large, to_canonical_small};
use crate::image::{byte_len, Image, PixelBuffer, Raster, StorageMode};
use crate::preferences::Preferences;

use super::{
    CachedStream, DecodeError, DecoderProvider, ImageSource, LoadError, RasterDecoder, TryOutcome,
};

/// Images above this many canonical bytes take the large-image path.
pub const LARGE_IMAGE_BYTES: u64 = 1024 * 1024;

/// Returns true if a `width × height` canonical raster exceeds
/// [`LARGE_IMAGE_BYTES`].
pub fn is_large_image(width: u32, height: u32) -> bool {
    (width as u64 * height as u64).saturating_mul(4) > LARGE_IMAGE_BYTES
}

/// Loads named images, choosing storage from the shared preferences.
pub struct LargeImageLoader {
    source: Arc<dyn ImageSource>,
    decoders: Arc<dyn DecoderProvider>,
    temp_root: PathBuf,
    preferences: Arc<Preferences>,
}

impl std::fmt::Debug for LargeImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LargeImageLoader")
            .field("temp_root", &self.temp_root)
            .field("preferences", &self.preferences)
            .finish_non_exhaustive()
    }
}

impl LargeImageLoader {
    pub fn new(
        source: Arc<dyn ImageSource>,
        decoders: Arc<dyn DecoderProvider>,
        temp_root: impl Into<PathBuf>,
        preferences: Arc<Preferences>,
    ) -> Self {
        Self {
            source,
            decoders,
            temp_root: temp_root.into(),
            preferences,
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Storage modes in try order: preferred first, then the other.
    pub fn strategies(&self) -> [StorageMode; 2] {
        let preferred = self.preferences.storage_mode();
        [preferred, preferred.other()]
    }

    /// Load `name`, taking the large path if its declared size calls for it.
    ///
    /// The stream opened to read the header is decoded by the first try, so
    /// a successful load caches the source once.
    pub fn load(&self, name: &str) -> Result<Image, LoadError> {
        let decoder = self.decoders.select(self.open_cached(name)?)?;
        let (width, height) = decoder.dimensions();
        if is_large_image(width, height) {
            self.load_large_from(name, Some(decoder))
        } else {
            self.finish_small(decoder)
        }
    }

    /// Declared dimensions of `name`, without decoding pixel data.
    pub fn image_size(&self, name: &str) -> Result<(u32, u32), LoadError> {
        let decoder = self.decoders.select(self.open_cached(name)?)?;
        Ok(decoder.dimensions())
    }

    /// Decode `name` to the heap in one go and canonicalize it.
    pub fn load_small(&self, name: &str) -> Result<Image, LoadError> {
        trace!(name, "load_small");
        let decoder = self.decoders.select(self.open_cached(name)?)?;
        self.finish_small(decoder)
    }

    fn finish_small(&self, decoder: Box<dyn RasterDecoder>) -> Result<Image, LoadError> {
        let raster = decoder.decode().map_err(small_failure)?;
        if raster.is_canonical() {
            Ok(Image::from(raster))
        } else {
            let canonical = to_canonical_small(&raster).map_err(|e| small_failure(e.into()))?;
            Ok(Image::from(canonical))
        }
    }

    /// Load `name` with at most two tries, alternating storage mode.
    ///
    /// Soft failures move on to the next mode. Fails with
    /// [`LoadError::OutOfMemory`] when both tries fail softly, and
    /// immediately on [`LoadError::UnrecognizedFormat`] or a hard decode
    /// error.
    pub fn load_large(&self, name: &str) -> Result<Image, LoadError> {
        self.load_large_from(name, None)
    }

    /// `opened` is an already selected decoder the first try uses instead of
    /// re-opening the stream.
    fn load_large_from(
        &self,
        name: &str,
        mut opened: Option<Box<dyn RasterDecoder>>,
    ) -> Result<Image, LoadError> {
        let strategies = self.strategies();
        trace!(name, preferred = ?strategies[0], reuse = opened.is_some(), "load_large");

        for (attempt, mode) in strategies.into_iter().enumerate() {
            let outcome = match opened.take() {
                Some(decoder) => self.decode_as(decoder, mode)?,
                None => self.attempt(name, mode)?,
            };
            match outcome {
                TryOutcome::Loaded(raster) => {
                    debug!(name, ?mode, attempt, "Loaded large image");
                    let raster = to_canonical_large(&Arc::new(raster), strategies[0], &self.temp_root)?;
                    return Ok(Image::Raster(raster));
                }
                TryOutcome::Soft(error) => {
                    warn!(name, ?mode, attempt, %error, "Load attempt failed");
                }
            }
        }
        Err(LoadError::OutOfMemory)
    }

    /// One try with a fresh stream.
    fn attempt(&self, name: &str, mode: StorageMode) -> Result<TryOutcome, LoadError> {
        let stream = match self.open_cached(name) {
            Ok(stream) => stream,
            Err(e) => return Ok(TryOutcome::Soft(e.into())),
        };
        let decoder = self.decoders.select(stream)?;
        self.decode_as(decoder, mode)
    }

    fn decode_as(
        &self,
        decoder: Box<dyn RasterDecoder>,
        mode: StorageMode,
    ) -> Result<TryOutcome, LoadError> {
        match mode {
            StorageMode::MemoryMapped => Ok(self.decode_mapped(decoder)),
            StorageMode::Heap => match decoder.decode() {
                Ok(raster) => Ok(TryOutcome::Loaded(raster)),
                Err(DecodeError::OutOfMemory) => Ok(TryOutcome::Soft(DecodeError::OutOfMemory)),
                Err(e) => Err(LoadError::Decode(e)),
            },
        }
    }

    /// Decode straight into a mapped buffer; every failure is soft.
    fn decode_mapped(&self, decoder: Box<dyn RasterDecoder>) -> TryOutcome {
        let (width, height) = decoder.dimensions();
        let format = decoder.format();

        let result = byte_len(width, height, format.layout.bytes_per_pixel())
            .and_then(|len| PixelBuffer::mapped(len, &self.temp_root))
            .map_err(DecodeError::from)
            .and_then(|mut buffer| {
                decoder.decode_into(buffer.as_bytes_mut())?;
                Ok(Raster::from_buffer(width, height, format, buffer)?)
            });

        match result {
            Ok(raster) => TryOutcome::Loaded(raster),
            Err(e) => TryOutcome::Soft(e),
        }
    }

    /// Open `name`, cache it under the temp root, then close the source stream.
    fn open_cached(&self, name: &str) -> io::Result<CachedStream> {
        let mut input = self.source.open(name)?;
        let cached = CachedStream::cache(&mut input, &self.temp_root);
        if let Err(e) = self.source.close(input) {
            warn!(name, error = %e, "Failed to close image stream");
        }
        cached
    }
}

fn small_failure(e: DecodeError) -> LoadError {
    match e {
        DecodeError::OutOfMemory => LoadError::OutOfMemory,
        other => LoadError::Decode(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{pack_argb, PixelFormat, SampleLayout};
    use crate::loader::{DirectorySource, ImageCrateDecoders};
    use crate::preferences::Quality;
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source counting opens and closes.
    #[derive(Default)]
    struct MemorySource {
        files: HashMap<String, Vec<u8>>,
        opens: AtomicUsize,
        closes: AtomicUsize,
        fail_close: bool,
    }

    impl MemorySource {
        fn with(name: &str, bytes: &[u8]) -> Self {
            let mut files = HashMap::new();
            files.insert(name.to_string(), bytes.to_vec());
            Self {
                files,
                ..Self::default()
            }
        }
    }

    impl ImageSource for MemorySource {
        fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let bytes = self
                .files
                .get(name)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
            Ok(Box::new(Cursor::new(bytes)))
        }

        fn close(&self, _stream: Box<dyn Read + Send>) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        OutOfMemory,
        Io,
        Corrupt,
    }

    impl Behavior {
        fn run(self, dest: &mut [u8]) -> Result<(), DecodeError> {
            match self {
                Behavior::Succeed => {
                    for px in dest.chunks_exact_mut(4) {
                        px.copy_from_slice(&0xFF11_2233u32.to_le_bytes());
                    }
                    Ok(())
                }
                Behavior::OutOfMemory => Err(DecodeError::OutOfMemory),
                Behavior::Io => Err(DecodeError::Io(io::Error::other("mapped write failed"))),
                Behavior::Corrupt => Err(DecodeError::Corrupt("bad data".into())),
            }
        }
    }

    /// Decoder provider whose mapped and heap decodes behave as configured.
    struct FakeDecoders {
        mapped: Behavior,
        heap: Behavior,
        size: (u32, u32),
        recognized: bool,
        selects: AtomicUsize,
    }

    impl FakeDecoders {
        fn new(mapped: Behavior, heap: Behavior) -> Self {
            Self {
                mapped,
                heap,
                size: (4, 3),
                recognized: true,
                selects: AtomicUsize::new(0),
            }
        }

        fn tries(&self) -> usize {
            self.selects.load(Ordering::SeqCst)
        }
    }

    struct FakeDecoder {
        mapped: Behavior,
        heap: Behavior,
        size: (u32, u32),
    }

    impl RasterDecoder for FakeDecoder {
        fn dimensions(&self) -> (u32, u32) {
            self.size
        }

        fn format(&self) -> PixelFormat {
            PixelFormat::CANONICAL
        }

        fn decode_into(self: Box<Self>, dest: &mut [u8]) -> Result<(), DecodeError> {
            self.mapped.run(dest)
        }

        fn decode(self: Box<Self>) -> Result<Raster, DecodeError> {
            let mut raster = Raster::new(self.size.0, self.size.1);
            self.heap.run(raster.bytes_mut())?;
            Ok(raster)
        }
    }

    impl DecoderProvider for FakeDecoders {
        fn select(&self, _stream: CachedStream) -> Result<Box<dyn RasterDecoder>, LoadError> {
            self.selects.fetch_add(1, Ordering::SeqCst);
            if !self.recognized {
                return Err(LoadError::UnrecognizedFormat);
            }
            Ok(Box::new(FakeDecoder {
                mapped: self.mapped,
                heap: self.heap,
                size: self.size,
            }))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: Arc<MemorySource>,
        decoders: Arc<FakeDecoders>,
        loader: LargeImageLoader,
    }

    fn fixture(preferred: StorageMode, source: MemorySource, decoders: FakeDecoders) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(source);
        let decoders = Arc::new(decoders);
        let loader = LargeImageLoader::new(
            source.clone(),
            decoders.clone(),
            dir.path(),
            Arc::new(Preferences::new(preferred, Quality::High)),
        );
        Fixture {
            _dir: dir,
            source,
            decoders,
            loader,
        }
    }

    fn loaded_raster(image: &Image) -> &Arc<Raster> {
        image.as_raster().expect("raster")
    }

    #[test]
    fn test_is_large_image() {
        assert!(!is_large_image(512, 512));
        assert!(is_large_image(513, 512));
        assert!(!is_large_image(0, u32::MAX));
        assert!(is_large_image(u32::MAX, u32::MAX));
    }

    #[test]
    fn test_mapped_failure_falls_back_to_heap() {
        for preferred in [StorageMode::MemoryMapped, StorageMode::Heap] {
            let f = fixture(
                preferred,
                MemorySource::with("big", b"bytes"),
                FakeDecoders::new(Behavior::Io, Behavior::Succeed),
            );
            let image = f.loader.load_large("big").unwrap();
            let raster = loaded_raster(&image);
            assert_eq!(raster.storage(), StorageMode::Heap);
            assert_eq!(raster.pixel(3, 2), 0xFF11_2233);
            assert!(f.decoders.tries() <= 2, "{:?}: {} tries", preferred, f.decoders.tries());
        }
    }

    #[test]
    fn test_heap_exhaustion_falls_back_to_mapped() {
        let f = fixture(
            StorageMode::Heap,
            MemorySource::with("big", b"bytes"),
            FakeDecoders::new(Behavior::Succeed, Behavior::OutOfMemory),
        );
        let image = f.loader.load_large("big").unwrap();
        assert_eq!(loaded_raster(&image).storage(), StorageMode::MemoryMapped);
        assert_eq!(f.decoders.tries(), 2);
        // Each try re-opens the stream.
        assert_eq!(f.source.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_both_strategies_exhausted() {
        let f = fixture(
            StorageMode::MemoryMapped,
            MemorySource::with("big", b"bytes"),
            FakeDecoders::new(Behavior::Io, Behavior::OutOfMemory),
        );
        assert!(matches!(f.loader.load_large("big"), Err(LoadError::OutOfMemory)));
        assert_eq!(f.decoders.tries(), 2);
    }

    #[test]
    fn test_unrecognized_format_is_not_retried() {
        let mut decoders = FakeDecoders::new(Behavior::Succeed, Behavior::Succeed);
        decoders.recognized = false;
        let f = fixture(StorageMode::MemoryMapped, MemorySource::with("big", b"?"), decoders);
        assert!(matches!(
            f.loader.load_large("big"),
            Err(LoadError::UnrecognizedFormat)
        ));
        assert_eq!(f.decoders.tries(), 1);
    }

    #[test]
    fn test_heap_decode_error_is_hard() {
        let f = fixture(
            StorageMode::Heap,
            MemorySource::with("big", b"bytes"),
            FakeDecoders::new(Behavior::Succeed, Behavior::Corrupt),
        );
        assert!(matches!(
            f.loader.load_large("big"),
            Err(LoadError::Decode(DecodeError::Corrupt(_)))
        ));
        assert_eq!(f.decoders.tries(), 1);
    }

    #[test]
    fn test_mapped_decode_error_is_soft() {
        let f = fixture(
            StorageMode::MemoryMapped,
            MemorySource::with("big", b"bytes"),
            FakeDecoders::new(Behavior::Corrupt, Behavior::Succeed),
        );
        assert!(f.loader.load_large("big").is_ok());
        assert_eq!(f.decoders.tries(), 2);
    }

    #[test]
    fn test_open_failure_is_soft() {
        let f = fixture(
            StorageMode::Heap,
            MemorySource::default(),
            FakeDecoders::new(Behavior::Succeed, Behavior::Succeed),
        );
        assert!(matches!(f.loader.load_large("missing"), Err(LoadError::OutOfMemory)));
        assert_eq!(f.source.opens.load(Ordering::SeqCst), 2);
        assert_eq!(f.decoders.tries(), 0);
    }

    #[test]
    fn test_close_errors_are_swallowed() {
        let mut source = MemorySource::with("big", b"bytes");
        source.fail_close = true;
        let f = fixture(
            StorageMode::Heap,
            source,
            FakeDecoders::new(Behavior::Succeed, Behavior::Succeed),
        );
        assert!(f.loader.load_large("big").is_ok());
        assert_eq!(f.source.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_reuses_header_stream() {
        let f = fixture(
            StorageMode::Heap,
            MemorySource::with("img", b"bytes"),
            FakeDecoders::new(Behavior::Succeed, Behavior::Succeed),
        );
        f.loader.load("img").unwrap();
        assert_eq!(f.source.opens.load(Ordering::SeqCst), 1);
        assert_eq!(f.decoders.tries(), 1);

        let mut decoders = FakeDecoders::new(Behavior::Succeed, Behavior::Succeed);
        decoders.size = (600, 600);
        let f = fixture(StorageMode::MemoryMapped, MemorySource::with("img", b"bytes"), decoders);
        let image = f.loader.load("img").unwrap();
        assert_eq!(loaded_raster(&image).storage(), StorageMode::MemoryMapped);
        assert_eq!(f.source.opens.load(Ordering::SeqCst), 1);
        assert_eq!(f.decoders.tries(), 1);
    }

    #[test]
    fn test_load_reopens_only_for_fallback() {
        let mut decoders = FakeDecoders::new(Behavior::Io, Behavior::Succeed);
        decoders.size = (600, 600);
        let f = fixture(StorageMode::MemoryMapped, MemorySource::with("img", b"bytes"), decoders);
        let image = f.loader.load("img").unwrap();
        let raster = loaded_raster(&image);
        assert_eq!(raster.storage(), StorageMode::Heap);
        assert_eq!(raster.pixel(599, 599), 0xFF11_2233);
        assert_eq!(f.source.opens.load(Ordering::SeqCst), 2);
        assert_eq!(f.decoders.tries(), 2);
    }

    #[test]
    fn test_strategies_follow_preference() {
        let f = fixture(
            StorageMode::Heap,
            MemorySource::default(),
            FakeDecoders::new(Behavior::Succeed, Behavior::Succeed),
        );
        assert_eq!(f.loader.strategies(), [StorageMode::Heap, StorageMode::MemoryMapped]);
        f.loader
            .preferences
            .set_storage_mode(StorageMode::MemoryMapped);
        assert_eq!(f.loader.strategies(), [StorageMode::MemoryMapped, StorageMode::Heap]);
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> image::RgbaImage {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 77, 255])
        });
        img.save(dir.join(name)).unwrap();
        img
    }

    fn png_loader(root: &Path, temp: &Path, preferred: StorageMode) -> LargeImageLoader {
        LargeImageLoader::new(
            Arc::new(DirectorySource::new(root)),
            Arc::new(ImageCrateDecoders),
            temp,
            Arc::new(Preferences::new(preferred, Quality::High)),
        )
    }

    #[test]
    fn test_png_large_load_is_canonical() {
        let images = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let expected = write_png(images.path(), "board.png", 40, 30);

        let loader = png_loader(images.path(), temp.path(), StorageMode::MemoryMapped);
        let image = loader.load_large("board.png").unwrap();
        let raster = loaded_raster(&image);

        assert!(raster.is_canonical());
        assert_eq!(raster.storage(), StorageMode::MemoryMapped);
        assert_eq!((raster.width(), raster.height()), (40, 30));
        let px = expected.get_pixel(13, 21);
        assert_eq!(raster.pixel(13, 21), pack_argb(px[3], px[0], px[1], px[2]));
    }

    #[test]
    fn test_load_dispatches_on_size() {
        let images = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        write_png(images.path(), "small.png", 8, 8);
        write_png(images.path(), "large.png", 600, 600);

        let loader = png_loader(images.path(), temp.path(), StorageMode::MemoryMapped);
        assert_eq!(loader.image_size("large.png").unwrap(), (600, 600));

        let small = loader.load("small.png").unwrap();
        assert_eq!(loaded_raster(&small).storage(), StorageMode::Heap);
        assert!(loaded_raster(&small).is_canonical());

        let large = loader.load("large.png").unwrap();
        assert_eq!(loaded_raster(&large).storage(), StorageMode::MemoryMapped);
    }

    #[test]
    fn test_load_small_converts_layout() {
        let images = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let gray = image::GrayImage::from_fn(3, 2, |x, y| image::Luma([(x * 50 + y * 10) as u8]));
        gray.save(images.path().join("gray.png")).unwrap();

        let loader = png_loader(images.path(), temp.path(), StorageMode::Heap);
        let image = loader.load_small("gray.png").unwrap();
        let raster = loaded_raster(&image);
        assert_eq!(raster.format(), PixelFormat::native(SampleLayout::Argb32));
        assert_eq!(raster.pixel(2, 1), pack_argb(255, 110, 110, 110));
    }

    #[test]
    fn test_missing_file_in_small_path_is_io_error() {
        let images = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let loader = png_loader(images.path(), temp.path(), StorageMode::Heap);
        assert!(matches!(loader.load("nope.png"), Err(LoadError::Io(_))));
    }
}
