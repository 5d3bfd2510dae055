//! The codec adapter: materializing pixels from compressed bytes and back.
//!
//! Decoding always produces a canonical layout: `RGBA U8` when the codec
//! carries alpha, `RGB U8` otherwise. Encoding converts as needed; encoding
//! alpha into an alpha-less codec composites against a background color
//! first (opaque black unless the caller says otherwise).
use std::io::Cursor;

use image::ImageEncoder;

use crate::buffer::{BufferLayout, ColorLayout, ImageBuffer, PixelFormat};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::kernel::convert;
use crate::kernel::Sample;

/// A supported compressed-image codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Gif,
}

impl Codec {
    pub const ALL: [Codec; 5] = [Codec::Jpeg, Codec::Png, Codec::WebP, Codec::Bmp, Codec::Gif];

    /// The stable identifier used in serialization and metadata.
    pub fn id(self) -> &'static str {
        match self {
            Codec::Jpeg => "jpeg",
            Codec::Png => "png",
            Codec::WebP => "webp",
            Codec::Bmp => "bmp",
            Codec::Gif => "gif",
        }
    }

    pub fn from_id(id: &str) -> Result<Self> {
        Ok(match id {
            "jpeg" | "jpg" => Codec::Jpeg,
            "png" => Codec::Png,
            "webp" => Codec::WebP,
            "bmp" => Codec::Bmp,
            "gif" => Codec::Gif,
            other => return Err(Error::unsupported_codec(other)),
        })
    }

    /// Whether decoded pixels carry an alpha channel.
    pub fn carries_alpha(self) -> bool {
        matches!(self, Codec::Png | Codec::WebP | Codec::Gif)
    }

    /// Whether the quality parameter means anything.
    pub fn is_lossy(self) -> bool {
        matches!(self, Codec::Jpeg)
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            Codec::Jpeg => image::ImageFormat::Jpeg,
            Codec::Png => image::ImageFormat::Png,
            Codec::WebP => image::ImageFormat::WebP,
            Codec::Bmp => image::ImageFormat::Bmp,
            Codec::Gif => image::ImageFormat::Gif,
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Result<Self> {
        Ok(match format {
            image::ImageFormat::Jpeg => Codec::Jpeg,
            image::ImageFormat::Png => Codec::Png,
            image::ImageFormat::WebP => Codec::WebP,
            image::ImageFormat::Bmp => Codec::Bmp,
            image::ImageFormat::Gif => Codec::Gif,
            other => return Err(Error::unsupported_codec(format!("{:?}", other))),
        })
    }
}

/// Sniff the codec of a compressed byte stream.
pub fn decode_probe(bytes: &[u8]) -> Result<Codec> {
    Codec::from_image_format(image::guess_format(bytes).map_err(Error::codec)?)
}

/// Decode compressed bytes; the codec is sniffed when not named.
///
/// Returns the canonical-layout buffer and the codec that was used.
pub fn decode(bytes: &[u8], codec: Option<Codec>) -> Result<(ImageBuffer, Codec)> {
    let codec = match codec {
        Some(codec) => codec,
        None => Codec::from_image_format(image::guess_format(bytes).map_err(Error::codec)?)?,
    };
    log::debug!("decoding {} bytes as {}", bytes.len(), codec.id());
    let decoded =
        image::load_from_memory_with_format(bytes, codec.image_format()).map_err(Error::codec)?;

    let buffer = if decoded.color().has_alpha() {
        let rgba = decoded.to_rgba8();
        let layout = BufferLayout::new(rgba.width(), rgba.height(), PixelFormat::RGBA_U8)
            .ok_or_else(|| Error::exhausted("decoded image layout"))?;
        ImageBuffer::from_u8(layout, rgba.into_raw())
            .ok_or_else(|| Error::exhausted("decoded image"))?
    } else {
        let rgb = decoded.to_rgb8();
        let layout = BufferLayout::new(rgb.width(), rgb.height(), PixelFormat::RGB_U8)
            .ok_or_else(|| Error::exhausted("decoded image layout"))?;
        ImageBuffer::from_u8(layout, rgb.into_raw())
            .ok_or_else(|| Error::exhausted("decoded image"))?
    };
    Ok((buffer, codec))
}

/// Decode only the dimensions, when cheaply available.
pub fn probe_dimensions(bytes: &[u8], codec: Option<Codec>) -> Option<(u32, u32)> {
    let format = codec.map(Codec::image_format).or_else(|| image::guess_format(bytes).ok())?;
    let mut reader = image::ImageReader::new(Cursor::new(bytes));
    reader.set_format(format);
    reader.into_dimensions().ok()
}

/// Composite over `background` and drop the alpha channel.
fn strip_alpha(src: &ImageBuffer, background: Color) -> Result<ImageBuffer> {
    debug_assert!(src.format() == PixelFormat::RGBA_U8);
    let layout = src
        .layout()
        .with_format(PixelFormat::RGB_U8)
        .ok_or_else(|| Error::exhausted("pixel buffer layout"))?;
    let data = src.as_u8().unwrap_or(&[]);
    let [bg_r, bg_g, bg_b, _] = background.to_f32();
    let mut out = Vec::with_capacity(layout.byte_len());
    for pixel in data.chunks_exact(4) {
        let alpha = pixel[3].to_f32();
        for (&value, &bg) in pixel[..3].iter().zip([bg_r, bg_g, bg_b].iter()) {
            let mixed = value.to_f32() * alpha + bg * (1.0 - alpha);
            out.push(u8::from_f32(mixed));
        }
    }
    ImageBuffer::from_u8(layout, out).ok_or_else(|| Error::exhausted("pixel buffer"))
}

/// Encode a raw buffer.
///
/// `quality` (1..=100) applies to lossy codecs only and is ignored
/// elsewhere. RGBA into an alpha-less codec composites against
/// `background`.
pub fn encode(
    src: &ImageBuffer,
    codec: Codec,
    quality: Option<u8>,
    background: Color,
) -> Result<Vec<u8>> {
    if let Some(quality) = quality {
        if codec.is_lossy() && !(1..=100).contains(&quality) {
            return Err(Error::invalid_argument("quality", "quality must be within 1..=100"));
        }
    }

    // Normalize to what the codec consumes.
    let has_alpha = src.format().layout.has_alpha();
    let prepared = if codec.carries_alpha() && has_alpha {
        convert::convert(src, PixelFormat::RGBA_U8)?
    } else if has_alpha {
        let rgba = convert::convert(src, PixelFormat::RGBA_U8)?;
        strip_alpha(&rgba, background)?
    } else {
        convert::convert(src, PixelFormat::RGB_U8)?
    };
    let (width, height) = prepared.layout().size();
    let color_type = if prepared.format().layout == ColorLayout::Rgba {
        image::ExtendedColorType::Rgba8
    } else {
        image::ExtendedColorType::Rgb8
    };
    let data = prepared.as_u8().unwrap_or(&[]);
    log::debug!(
        "encoding {}x{} as {} (quality {:?})",
        width,
        height,
        codec.id(),
        quality
    );

    let mut bytes = Vec::new();
    match codec {
        Codec::Jpeg => {
            let quality = quality.unwrap_or(90);
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality);
            encoder
                .encode(data, width, height, color_type)
                .map_err(Error::codec)?;
        }
        Codec::Png => {
            image::codecs::png::PngEncoder::new(Cursor::new(&mut bytes))
                .write_image(data, width, height, color_type)
                .map_err(Error::codec)?;
        }
        Codec::WebP => {
            image::codecs::webp::WebPEncoder::new_lossless(Cursor::new(&mut bytes))
                .write_image(data, width, height, color_type)
                .map_err(Error::codec)?;
        }
        Codec::Bmp => {
            let mut cursor = Cursor::new(&mut bytes);
            let mut encoder = image::codecs::bmp::BmpEncoder::new(&mut cursor);
            encoder
                .encode(data, width, height, color_type)
                .map_err(Error::codec)?;
        }
        Codec::Gif => {
            let mut encoder = image::codecs::gif::GifEncoder::new(Cursor::new(&mut bytes));
            let frame = image::Frame::new(
                image::RgbaImage::from_raw(
                    width,
                    height,
                    if color_type == image::ExtendedColorType::Rgba8 {
                        data.to_vec()
                    } else {
                        // GIF frames are RGBA; widen RGB input.
                        let mut widened = Vec::with_capacity(data.len() / 3 * 4);
                        for pixel in data.chunks_exact(3) {
                            widened.extend_from_slice(pixel);
                            widened.push(255);
                        }
                        widened
                    },
                )
                .ok_or_else(|| Error::exhausted("gif frame"))?,
            );
            encoder.encode_frames(Some(frame).into_iter()).map_err(Error::codec)?;
        }
    }
    Ok(bytes)
}

/// The canonical decode format of a codec, so callers can plan
/// conversions without decoding.
pub fn canonical_format(codec: Codec) -> PixelFormat {
    if codec.carries_alpha() {
        PixelFormat::RGBA_U8
    } else {
        PixelFormat::RGB_U8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> ImageBuffer {
        let layout = BufferLayout::new(width, height, PixelFormat::RGBA_U8).unwrap();
        let mut data = Vec::with_capacity(layout.byte_len());
        for y in 0..height {
            for x in 0..width {
                let on = (x + y) % 2 == 0;
                data.extend_from_slice(if on {
                    &[200, 60, 20, 255]
                } else {
                    &[10, 90, 160, 128]
                });
            }
        }
        ImageBuffer::from_u8(layout, data).unwrap()
    }

    #[test]
    fn png_round_trip_is_exact() {
        let src = checker(8, 6);
        let bytes = encode(&src, Codec::Png, None, Color::BLACK).unwrap();
        let (decoded, codec) = decode(&bytes, None).unwrap();
        assert_eq!(codec, Codec::Png);
        assert_eq!(decoded.as_u8(), src.as_u8());
    }

    #[test]
    fn webp_lossless_round_trip() {
        let src = checker(8, 8);
        let bytes = encode(&src, Codec::WebP, None, Color::BLACK).unwrap();
        let (decoded, codec) = decode(&bytes, Some(Codec::WebP)).unwrap();
        assert_eq!(codec, Codec::WebP);
        assert_eq!(decoded.as_u8(), src.as_u8());
    }

    #[test]
    fn jpeg_strips_alpha() {
        let src = checker(8, 8);
        let bytes = encode(&src, Codec::Jpeg, Some(85), Color::BLACK).unwrap();
        let (decoded, _) = decode(&bytes, Some(Codec::Jpeg)).unwrap();
        assert_eq!(decoded.format(), PixelFormat::RGB_U8);
        assert_eq!(decoded.layout().size(), (8, 8));
    }

    #[test]
    fn unknown_codec_id_refused() {
        let err = Codec::from_id("tiff").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedCodec);
    }

    #[test]
    fn garbage_bytes_fail_with_codec_error() {
        let err = decode(&[0u8; 16], Some(Codec::Png)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CodecFailure);
        assert!(err.codec_diagnostic().is_some());
    }

    #[test]
    fn quality_domain_checked() {
        let src = checker(4, 4);
        assert!(encode(&src, Codec::Jpeg, Some(0), Color::BLACK).is_err());
        // Quality is ignored for lossless codecs, even out of range.
        assert!(encode(&src, Codec::Png, Some(0), Color::BLACK).is_ok());
    }
}
