//! The polymorphic image value.
//!
//! An [`Image`] is raw pixels, compressed bytes, or both at once: the first
//! request for pixels decodes and publishes the raw form next to the
//! retained compressed bytes. Decoding is a pure function, so the
//! first-writer-wins publication is harmless. Mutation never happens in
//! place; operations produce new values.
use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::buffer::{BufferLayout, ColorLayout, ElementType, ImageBuffer, PixelFormat};
use crate::codec::{self, Codec};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::geometry::GeometryList;
use crate::kernel::convert;

/// Auxiliary values attached to an image by key.
pub type MetaMap = BTreeMap<String, MetaValue>;

/// One auxiliary value.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A coordinate-like pair, e.g. an effect's canvas origin shift.
    IntPair(i64, i64),
    Geometry(GeometryList),
}

/// The compressed form: bytes plus their codec.
#[derive(Clone, Debug)]
pub struct CompressedData {
    bytes: Arc<[u8]>,
    codec: Codec,
    dims: OnceCell<(u32, u32)>,
}

impl CompressedData {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

/// A polymorphic image value.
///
/// Cheap to clone: compressed bytes are shared, metadata is shared, and a
/// cloned raw buffer is the copy-on-write snapshot at the engine boundary.
#[derive(Clone, Debug)]
pub struct Image {
    compressed: Option<CompressedData>,
    raw: OnceCell<ImageBuffer>,
    meta: Option<Arc<MetaMap>>,
}

impl Image {
    /// An image over an existing pixel buffer.
    pub fn from_buffer(buffer: ImageBuffer) -> Self {
        let raw = OnceCell::new();
        let _ = raw.set(buffer);
        Image {
            compressed: None,
            raw,
            meta: None,
        }
    }

    /// An image from raw bytes and an explicit wire format.
    pub fn from_raw_bytes(
        bytes: &[u8],
        width: u32,
        height: u32,
        element: ElementType,
        layout: ColorLayout,
    ) -> Result<Self> {
        let buffer_layout = BufferLayout::new(width, height, PixelFormat::new(element, layout))
            .ok_or_else(|| Error::exhausted("pixel buffer layout"))?;
        let buffer = ImageBuffer::from_bytes(buffer_layout, bytes).ok_or_else(|| {
            Error::invalid_argument("bytes", "length does not match the described layout")
        })?;
        Ok(Image::from_buffer(buffer))
    }

    /// An image over compressed bytes. Decoding is deferred until pixels
    /// are requested.
    pub fn from_compressed(bytes: impl Into<Arc<[u8]>>, codec: Codec) -> Self {
        Image {
            compressed: Some(CompressedData {
                bytes: bytes.into(),
                codec,
                dims: OnceCell::new(),
            }),
            raw: OnceCell::new(),
            meta: None,
        }
    }

    /// Sniff the codec from the byte stream.
    pub fn from_compressed_sniffed(bytes: impl Into<Arc<[u8]>>, hint: Option<Codec>) -> Result<Self> {
        let bytes = bytes.into();
        let codec = match hint {
            Some(codec) => codec,
            None => codec::decode_probe(&bytes)?,
        };
        Ok(Image::from_compressed(bytes, codec))
    }

    /// Whether raw pixels are currently materialized.
    pub fn is_materialized(&self) -> bool {
        self.raw.get().is_some()
    }

    /// The compressed form, when still attached.
    pub fn compressed(&self) -> Option<&CompressedData> {
        self.compressed.as_ref()
    }

    /// The pixels, decoding on first use. The decoded buffer is retained.
    pub fn pixels(&self) -> Result<&ImageBuffer> {
        self.raw.get_or_try_init(|| match &self.compressed {
            Some(data) => {
                let (buffer, _) = codec::decode(&data.bytes, Some(data.codec))?;
                let _ = data.dims.set(buffer.layout().size());
                Ok(buffer)
            }
            // Invariant: one of the two forms is always present.
            None => Err(Error::invalid_argument("image", "empty image value")),
        })
    }

    /// The pixel dimensions, avoiding a full decode when the header knows.
    pub fn size(&self) -> Result<(u32, u32)> {
        if let Some(buffer) = self.raw.get() {
            return Ok(buffer.layout().size());
        }
        if let Some(data) = &self.compressed {
            if let Some(&dims) = data.dims.get() {
                return Ok(dims);
            }
            if let Some(dims) = codec::probe_dimensions(&data.bytes, Some(data.codec)) {
                let _ = data.dims.set(dims);
                return Ok(dims);
            }
        }
        self.pixels().map(|buffer| buffer.layout().size())
    }

    /// The format of the materialized pixels, or the canonical decode
    /// format of the compressed bytes.
    pub fn format(&self) -> PixelFormat {
        match self.raw.get() {
            Some(buffer) => buffer.format(),
            None => match &self.compressed {
                Some(data) => codec::canonical_format(data.codec),
                None => PixelFormat::RGBA_U8,
            },
        }
    }

    /// Pixels converted into `format`, decoding first when necessary.
    pub fn to_format(&self, format: PixelFormat) -> Result<ImageBuffer> {
        let pixels = self.pixels()?;
        convert::convert(pixels, format)
    }

    /// A new image with the raw cache materialized.
    pub fn materialized(&self) -> Result<Image> {
        let _ = self.pixels()?;
        Ok(self.clone())
    }

    /// A new image without the compressed bytes. Pixels are materialized
    /// first so no information is lost.
    pub fn without_compressed(&self) -> Result<Image> {
        let _ = self.pixels()?;
        Ok(Image {
            compressed: None,
            raw: self.raw.clone(),
            meta: self.meta.clone(),
        })
    }

    /// Encode into `codec`.
    ///
    /// When the image still holds compressed bytes of that codec and no
    /// quality override is requested, the bytes pass through unchanged.
    pub fn encode(&self, codec: Codec, quality: Option<u8>, background: Color) -> Result<Vec<u8>> {
        if quality.is_none() {
            if let Some(data) = &self.compressed {
                if data.codec == codec {
                    return Ok(data.bytes.to_vec());
                }
            }
        }
        codec::encode(self.pixels()?, codec, quality, background)
    }

    /// The attached metadata, if any.
    pub fn meta(&self) -> Option<&MetaMap> {
        self.meta.as_deref()
    }

    /// One metadata value by key.
    pub fn meta_value(&self, key: &str) -> Option<&MetaValue> {
        self.meta.as_deref().and_then(|map| map.get(key))
    }

    /// A new image with `key` set. The map is copied, the pixel forms are
    /// shared structurally.
    pub fn with_meta(&self, key: impl Into<String>, value: MetaValue) -> Image {
        let mut map = self.meta.as_deref().cloned().unwrap_or_default();
        map.insert(key.into(), value);
        Image {
            compressed: self.compressed.clone(),
            raw: self.raw.clone(),
            meta: Some(Arc::new(map)),
        }
    }

    /// A new image carrying `meta` wholesale.
    pub fn with_meta_map(&self, meta: Arc<MetaMap>) -> Image {
        Image {
            compressed: self.compressed.clone(),
            raw: self.raw.clone(),
            meta: Some(meta),
        }
    }

    /// Replace the pixel content, keeping metadata.
    pub(crate) fn with_buffer_keeping_meta(&self, buffer: ImageBuffer) -> Image {
        let raw = OnceCell::new();
        let _ = raw.set(buffer);
        Image {
            compressed: None,
            raw,
            meta: self.meta.clone(),
        }
    }
}

impl From<ImageBuffer> for Image {
    fn from(buffer: ImageBuffer) -> Image {
        Image::from_buffer(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let layout = BufferLayout::new(3, 2, PixelFormat::RGBA_U8).unwrap();
        let buffer = ImageBuffer::from_u8(
            layout,
            vec![
                255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 9, 9, 9, 128, 77, 66, 55, 255, 1,
                2, 3, 4,
            ],
        )
        .unwrap();
        codec::encode(&buffer, Codec::Png, None, Color::BLACK).unwrap()
    }

    #[test]
    fn lazy_decode_retains_both_forms() {
        let image = Image::from_compressed(tiny_png(), Codec::Png);
        assert!(!image.is_materialized());
        assert_eq!(image.size().unwrap(), (3, 2));
        // Probing dimensions must not force a decode.
        assert!(!image.is_materialized());

        let pixels = image.pixels().unwrap();
        assert_eq!(pixels.format(), PixelFormat::RGBA_U8);
        assert!(image.is_materialized());
        assert!(image.compressed().is_some());

        let stripped = image.without_compressed().unwrap();
        assert!(stripped.compressed().is_none());
        assert!(stripped.is_materialized());
    }

    #[test]
    fn encode_pass_through_for_same_codec() {
        let bytes = tiny_png();
        let image = Image::from_compressed(bytes.clone(), Codec::Png);
        let encoded = image.encode(Codec::Png, None, Color::BLACK).unwrap();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn metadata_is_structurally_shared() {
        let image = Image::from_buffer(ImageBuffer::with_layout(
            BufferLayout::new(1, 1, PixelFormat::GRAY_U8).unwrap(),
        ));
        let tagged = image.with_meta("frame", MetaValue::Int(7));
        assert!(image.meta().is_none());
        assert_eq!(tagged.meta_value("frame"), Some(&MetaValue::Int(7)));
        let retagged = tagged.with_meta("frame", MetaValue::Int(8));
        assert_eq!(tagged.meta_value("frame"), Some(&MetaValue::Int(7)));
        assert_eq!(retagged.meta_value("frame"), Some(&MetaValue::Int(8)));
    }
}
