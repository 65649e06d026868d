//! Pixel format and storage descriptors.

use serde::{Deserialize, Serialize};

/// Physical sample layout of a pixel buffer.
///
/// `Argb32` is the canonical layout: one packed `0xAARRGGBB` word per pixel,
/// stored little-endian. All other layouts are decoder-native and are
/// stored in the byte order the decoder produced (native-endian for the
/// 16-bit and float variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleLayout {
    /// Packed ARGB, 4 bytes per pixel (canonical).
    Argb32,
    /// 8-bit grayscale.
    Luma8,
    /// 8-bit grayscale with alpha.
    LumaA8,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit RGBA, non-premultiplied.
    Rgba8,
    /// 16-bit grayscale.
    Luma16,
    /// 16-bit grayscale with alpha.
    LumaA16,
    /// 16-bit RGB.
    Rgb16,
    /// 16-bit RGBA.
    Rgba16,
    /// 32-bit float RGB.
    Rgb32F,
    /// 32-bit float RGBA.
    Rgba32F,
}

impl SampleLayout {
    /// Number of bytes one pixel occupies in this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            SampleLayout::Luma8 => 1,
            SampleLayout::LumaA8 | SampleLayout::Luma16 => 2,
            SampleLayout::Rgb8 => 3,
            SampleLayout::Argb32 | SampleLayout::Rgba8 | SampleLayout::LumaA16 => 4,
            SampleLayout::Rgb16 => 6,
            SampleLayout::Rgba16 => 8,
            SampleLayout::Rgb32F => 12,
            SampleLayout::Rgba32F => 16,
        }
    }

    /// Returns true if the layout carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            SampleLayout::Argb32
                | SampleLayout::LumaA8
                | SampleLayout::Rgba8
                | SampleLayout::LumaA16
                | SampleLayout::Rgba16
                | SampleLayout::Rgba32F
        )
    }

    /// Map an `image` crate color type to the matching layout.
    ///
    /// Returns `None` for color types with no layout counterpart.
    pub fn from_color_type(color: image::ColorType) -> Option<Self> {
        use image::ColorType;
        match color {
            ColorType::L8 => Some(SampleLayout::Luma8),
            ColorType::La8 => Some(SampleLayout::LumaA8),
            ColorType::Rgb8 => Some(SampleLayout::Rgb8),
            ColorType::Rgba8 => Some(SampleLayout::Rgba8),
            ColorType::L16 => Some(SampleLayout::Luma16),
            ColorType::La16 => Some(SampleLayout::LumaA16),
            ColorType::Rgb16 => Some(SampleLayout::Rgb16),
            ColorType::Rgba16 => Some(SampleLayout::Rgba16),
            ColorType::Rgb32F => Some(SampleLayout::Rgb32F),
            ColorType::Rgba32F => Some(SampleLayout::Rgba32F),
            _ => None,
        }
    }

    /// Read one pixel as normalized, non-premultiplied `[a, r, g, b]`.
    pub(crate) fn read_normalized(self, px: &[u8]) -> [f32; 4] {
        #[inline]
        fn u8n(v: u8) -> f32 {
            v as f32 / 255.0
        }
        #[inline]
        fn u16n(px: &[u8], i: usize) -> f32 {
            u16::from_ne_bytes([px[2 * i], px[2 * i + 1]]) as f32 / 65535.0
        }
        #[inline]
        fn f32n(px: &[u8], i: usize) -> f32 {
            f32::from_ne_bytes([px[4 * i], px[4 * i + 1], px[4 * i + 2], px[4 * i + 3]])
                .clamp(0.0, 1.0)
        }

        match self {
            SampleLayout::Argb32 => {
                let [a, r, g, b] = unpack_argb(u32::from_le_bytes([px[0], px[1], px[2], px[3]]));
                [u8n(a), u8n(r), u8n(g), u8n(b)]
            }
            SampleLayout::Luma8 => [1.0, u8n(px[0]), u8n(px[0]), u8n(px[0])],
            SampleLayout::LumaA8 => [u8n(px[1]), u8n(px[0]), u8n(px[0]), u8n(px[0])],
            SampleLayout::Rgb8 => [1.0, u8n(px[0]), u8n(px[1]), u8n(px[2])],
            SampleLayout::Rgba8 => [u8n(px[3]), u8n(px[0]), u8n(px[1]), u8n(px[2])],
            SampleLayout::Luma16 => {
                let l = u16n(px, 0);
                [1.0, l, l, l]
            }
            SampleLayout::LumaA16 => {
                let l = u16n(px, 0);
                [u16n(px, 1), l, l, l]
            }
            SampleLayout::Rgb16 => [1.0, u16n(px, 0), u16n(px, 1), u16n(px, 2)],
            SampleLayout::Rgba16 => [u16n(px, 3), u16n(px, 0), u16n(px, 1), u16n(px, 2)],
            SampleLayout::Rgb32F => [1.0, f32n(px, 0), f32n(px, 1), f32n(px, 2)],
            SampleLayout::Rgba32F => [f32n(px, 3), f32n(px, 0), f32n(px, 1), f32n(px, 2)],
        }
    }

    /// Read one pixel as packed ARGB, truncating samples to 8 bits.
    ///
    /// No transfer function is applied: sample values are reinterpreted.
    pub(crate) fn read_argb(self, px: &[u8]) -> u32 {
        match self {
            SampleLayout::Argb32 => u32::from_le_bytes([px[0], px[1], px[2], px[3]]),
            SampleLayout::Luma8 => pack_argb(255, px[0], px[0], px[0]),
            SampleLayout::LumaA8 => pack_argb(px[1], px[0], px[0], px[0]),
            SampleLayout::Rgb8 => pack_argb(255, px[0], px[1], px[2]),
            SampleLayout::Rgba8 => pack_argb(px[3], px[0], px[1], px[2]),
            _ => {
                let [a, r, g, b] = self.read_normalized(px);
                pack_argb(quantize(a), quantize(r), quantize(g), quantize(b))
            }
        }
    }
}

/// Color space the sample values are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Gamma-encoded sRGB.
    Srgb,
    /// Linear-light sRGB primaries.
    LinearSrgb,
}

/// Pixel format tag: sample layout plus color space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelFormat {
    pub layout: SampleLayout,
    pub color_space: ColorSpace,
}

impl PixelFormat {
    /// The canonical packed-ARGB sRGB format.
    pub const CANONICAL: PixelFormat = PixelFormat {
        layout: SampleLayout::Argb32,
        color_space: ColorSpace::Srgb,
    };

    /// Format for a decoder-native layout.
    ///
    /// Float layouts are treated as linear light, integer layouts as sRGB.
    pub fn native(layout: SampleLayout) -> Self {
        let color_space = match layout {
            SampleLayout::Rgb32F | SampleLayout::Rgba32F => ColorSpace::LinearSrgb,
            _ => ColorSpace::Srgb,
        };
        Self {
            layout,
            color_space,
        }
    }

    /// Returns true for the canonical packed-ARGB sRGB format.
    #[inline]
    pub fn is_canonical(&self) -> bool {
        *self == Self::CANONICAL
    }
}

/// How a pixel buffer is physically backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageMode {
    /// Backed by a memory-mapped temp file.
    MemoryMapped,
    /// Backed by a heap allocation.
    #[default]
    Heap,
}

impl StorageMode {
    /// The alternate storage mode.
    pub fn other(self) -> Self {
        match self {
            StorageMode::MemoryMapped => StorageMode::Heap,
            StorageMode::Heap => StorageMode::MemoryMapped,
        }
    }
}

/// Pack 8-bit channels into a `0xAARRGGBB` word.
#[inline]
pub fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Split a `0xAARRGGBB` word into `[a, r, g, b]`.
#[inline]
pub fn unpack_argb(argb: u32) -> [u8; 4] {
    [
        (argb >> 24) as u8,
        (argb >> 16) as u8,
        (argb >> 8) as u8,
        argb as u8,
    ]
}

#[inline]
pub(crate) fn quantize(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}

/// Packed ARGB to normalized, premultiplied `[a, r, g, b]`.
#[inline]
pub(crate) fn premultiply(argb: u32) -> [f32; 4] {
    let [a, r, g, b] = unpack_argb(argb);
    let a = a as f32 / 255.0;
    [a, r as f32 / 255.0 * a, g as f32 / 255.0 * a, b as f32 / 255.0 * a]
}

/// Inverse of [`premultiply`]; near-zero alpha becomes transparent black.
#[inline]
pub(crate) fn unpremultiply(px: [f32; 4]) -> u32 {
    let a = px[0].clamp(0.0, 1.0);
    if a <= 0.5 / 255.0 {
        return 0;
    }
    pack_argb(
        quantize(a),
        quantize(px[1] / a),
        quantize(px[2] / a),
        quantize(px[3] / a),
    )
}
