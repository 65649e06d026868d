//! Decoder abstraction and its `image`-crate implementation.

use image::{ImageDecoder, ImageReader};
use tracing::{debug, trace};

use crate::image::{byte_len, PixelBuffer, PixelFormat, Raster, SampleLayout};

use super::{CachedStream, DecodeError, LoadError};

/// A decoder positioned on one image, with its header already read.
pub trait RasterDecoder {
    /// Declared `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Native sample layout and color space of the decoded pixels.
    fn format(&self) -> PixelFormat;

    /// Decode into a caller-supplied buffer sized for
    /// [`dimensions`](RasterDecoder::dimensions) and [`format`](RasterDecoder::format).
    fn decode_into(self: Box<Self>, dest: &mut [u8]) -> Result<(), DecodeError>;

    /// Decode into a fresh heap raster.
    fn decode(self: Box<Self>) -> Result<Raster, DecodeError> {
        let (width, height) = self.dimensions();
        let format = self.format();
        let mut buffer = PixelBuffer::heap(byte_len(width, height, format.layout.bytes_per_pixel())?)?;
        self.decode_into(buffer.as_bytes_mut())?;
        Ok(Raster::from_buffer(width, height, format, buffer)?)
    }
}

/// Chooses a decoder for a cached stream.
pub trait DecoderProvider: Send + Sync {
    /// Fails with [`LoadError::UnrecognizedFormat`] when no decoder matches.
    fn select(&self, stream: CachedStream) -> Result<Box<dyn RasterDecoder>, LoadError>;
}

/// Decoders from the `image` crate, format guessed from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoders;

impl DecoderProvider for ImageCrateDecoders {
    fn select(&self, stream: CachedStream) -> Result<Box<dyn RasterDecoder>, LoadError> {
        let reader = ImageReader::new(stream).with_guessed_format()?;
        let Some(format) = reader.format() else {
            return Err(LoadError::UnrecognizedFormat);
        };
        trace!(?format, "select decoder");

        let decoder = match reader.into_decoder() {
            Ok(decoder) => decoder,
            Err(image::ImageError::Unsupported(e)) => {
                debug!(error = %e, "No decoder for format");
                return Err(LoadError::UnrecognizedFormat);
            }
            Err(e) => return Err(LoadError::Decode(e.into())),
        };

        let color = decoder.color_type();
        let layout = SampleLayout::from_color_type(color).ok_or_else(|| {
            LoadError::Decode(DecodeError::UnsupportedLayout(format!("{:?}", color)))
        })?;

        Ok(Box::new(ImageCrateDecoder {
            inner: Box::new(decoder),
            format: PixelFormat::native(layout),
        }))
    }
}

struct ImageCrateDecoder {
    inner: Box<dyn ImageDecoder>,
    format: PixelFormat,
}

impl RasterDecoder for ImageCrateDecoder {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn decode_into(self: Box<Self>, dest: &mut [u8]) -> Result<(), DecodeError> {
        let (width, height) = self.inner.dimensions();
        let expected = byte_len(width, height, self.format.layout.bytes_per_pixel())?;
        if dest.len() != expected {
            return Err(DecodeError::Corrupt(format!(
                "destination holds {} bytes, decoder produces {}",
                dest.len(),
                expected
            )));
        }
        self.inner.read_image_boxed(dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 10) as u8, (y * 10) as u8, 200, 255 - x as u8])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn cached(bytes: Vec<u8>, dir: &std::path::Path) -> CachedStream {
        CachedStream::cache(Cursor::new(bytes), dir).unwrap()
    }

    #[test]
    fn test_selects_png_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = ImageCrateDecoders
            .select(cached(png_bytes(6, 4), dir.path()))
            .unwrap();
        assert_eq!(decoder.dimensions(), (6, 4));
        assert_eq!(decoder.format(), PixelFormat::native(SampleLayout::Rgba8));

        let raster = decoder.decode().unwrap();
        assert_eq!(raster.pixel(3, 2), crate::image::pack_argb(252, 30, 20, 200));
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let result = ImageCrateDecoders.select(cached(b"definitely not an image".to_vec(), dir.path()));
        assert!(matches!(result, Err(LoadError::UnrecognizedFormat)));
    }

    #[test]
    fn test_decode_into_checks_size() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = ImageCrateDecoders
            .select(cached(png_bytes(2, 2), dir.path()))
            .unwrap();
        let mut short = vec![0u8; 3];
        assert!(matches!(
            decoder.decode_into(&mut short),
            Err(DecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = png_bytes(32, 32);
        bytes.truncate(bytes.len() / 2);
        let result = ImageCrateDecoders
            .select(cached(bytes, dir.path()))
            .and_then(|d| d.decode().map_err(LoadError::from));
        assert!(matches!(result, Err(LoadError::Decode(_))));
    }
}
