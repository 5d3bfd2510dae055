//! Conversion between pixel formats.
//!
//! Swizzles between the RGB-ordered layouts are exact channel permutations.
//! Conversions involving `Gray` or `Hsv` go through `f32` component math
//! with quantization only at the `U8` boundary, so that the `U8` path and
//! the `F32` path agree.
use crate::buffer::{BufferLayout, ColorLayout, ElementType, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::kernel::Sample;

/// Rec.709 luma weights, applied to the encoded values.
pub(crate) const LUMA_R: f32 = 0.2126;
pub(crate) const LUMA_G: f32 = 0.7152;
pub(crate) const LUMA_B: f32 = 0.0722;

/// Convert a buffer into the target format.
///
/// Lossless except where channels are dropped (alpha) or resampled into a
/// coarser encoding (`Hsv` hue in `U8`).
pub fn convert(src: &ImageBuffer, target: PixelFormat) -> Result<ImageBuffer> {
    let source = src.format();
    if source == target {
        return Ok(src.clone());
    }

    if source.layout == target.layout {
        return element_cast(src, target.element);
    }

    if is_rgb_family(source.layout) && is_rgb_family(target.layout) {
        let swizzled = swizzle(src, target.layout)?;
        return if swizzled.format().element == target.element {
            Ok(swizzled)
        } else {
            element_cast(&swizzled, target.element)
        };
    }

    componentwise(src, target)
}

/// Layouts that are channel permutations of each other.
fn is_rgb_family(layout: ColorLayout) -> bool {
    matches!(
        layout,
        ColorLayout::Rgb | ColorLayout::Rgba | ColorLayout::Bgr | ColorLayout::Bgra
    )
}

/// The RGBA component (0=r, 1=g, 2=b, 3=a) stored in each channel.
fn components(layout: ColorLayout) -> &'static [usize] {
    match layout {
        ColorLayout::Rgb => &[0, 1, 2],
        ColorLayout::Rgba => &[0, 1, 2, 3],
        ColorLayout::Bgr => &[2, 1, 0],
        ColorLayout::Bgra => &[2, 1, 0, 3],
        // Not part of the swizzle family.
        ColorLayout::Gray | ColorLayout::Hsv => &[],
    }
}

fn output_layout(src: &ImageBuffer, format: PixelFormat) -> Result<BufferLayout> {
    src.layout()
        .with_format(format)
        .ok_or_else(|| Error::exhausted("pixel buffer layout"))
}

/// Pure channel permutation between RGB-ordered layouts, element preserved.
fn swizzle(src: &ImageBuffer, target: ColorLayout) -> Result<ImageBuffer> {
    let element = src.format().element;
    let layout = output_layout(src, PixelFormat::new(element, target))?;

    // map[target_channel] = source channel, or None for opaque alpha fill.
    let src_components = components(src.format().layout);
    let map: Vec<Option<usize>> = components(target)
        .iter()
        .map(|component| src_components.iter().position(|c| c == component))
        .collect();

    match element {
        ElementType::U8 => {
            let data = swizzle_samples(src.as_u8().unwrap_or(&[]), &map, 255u8, src.channels());
            ImageBuffer::from_u8(layout, data).ok_or_else(|| Error::exhausted("pixel buffer"))
        }
        ElementType::F32 => {
            let data = swizzle_samples(src.as_f32().unwrap_or(&[]), &map, 1.0f32, src.channels());
            ImageBuffer::from_f32(layout, data).ok_or_else(|| Error::exhausted("pixel buffer"))
        }
    }
}

fn swizzle_samples<S: Copy>(
    src: &[S],
    map: &[Option<usize>],
    opaque: S,
    src_channels: usize,
) -> Vec<S> {
    let pixels = src.len() / src_channels;
    let mut out = Vec::with_capacity(pixels * map.len());
    for pixel in src.chunks_exact(src_channels) {
        for &source in map {
            out.push(match source {
                Some(channel) => pixel[channel],
                None => opaque,
            });
        }
    }
    out
}

/// Change the element type, layout unchanged.
fn element_cast(src: &ImageBuffer, element: ElementType) -> Result<ImageBuffer> {
    let source = src.format();
    if source.element == element {
        return Ok(src.clone());
    }
    let layout = output_layout(src, PixelFormat::new(element, source.layout))?;

    // Hue in `U8` lives on a 0..=180 scale, not 0..=255.
    let hue_stride = if source.layout == ColorLayout::Hsv {
        Some(src.channels())
    } else {
        None
    };

    match element {
        ElementType::F32 => {
            let bytes = src.as_u8().unwrap_or(&[]);
            let mut data = Vec::with_capacity(bytes.len());
            for (index, &byte) in bytes.iter().enumerate() {
                let value = if hue_stride.map_or(false, |stride| index % stride == 0) {
                    f32::from(byte) / 180.0
                } else {
                    byte.to_f32()
                };
                data.push(value);
            }
            ImageBuffer::from_f32(layout, data).ok_or_else(|| Error::exhausted("pixel buffer"))
        }
        ElementType::U8 => {
            let floats = src.as_f32().unwrap_or(&[]);
            let mut data = Vec::with_capacity(floats.len());
            for (index, &value) in floats.iter().enumerate() {
                let byte = if hue_stride.map_or(false, |stride| index % stride == 0) {
                    quantize_scaled(value, 180.0)
                } else {
                    u8::from_f32(value)
                };
                data.push(byte);
            }
            ImageBuffer::from_u8(layout, data).ok_or_else(|| Error::exhausted("pixel buffer"))
        }
    }
}

#[inline]
fn quantize_scaled(value: f32, scale: f32) -> u8 {
    let scaled = value * scale + 0.5;
    if scaled <= 0.0 {
        0
    } else if scaled >= 255.0 {
        255
    } else {
        scaled as u8
    }
}

/// General conversion through per-pixel `f32` component math.
fn componentwise(src: &ImageBuffer, target: PixelFormat) -> Result<ImageBuffer> {
    let layout = output_layout(src, target)?;
    let mut out = ImageBuffer::with_layout(layout);
    let pixels = (src.width() as usize) * (src.height() as usize);
    let src_channels = src.channels();
    let dst_channels = target.channels();

    let read = reader(src.format());
    let write = writer(target);

    match (src.format().element, target.element) {
        (_, ElementType::U8) => {
            let hue_first = target.layout == ColorLayout::Hsv;
            let dst = out.as_u8_mut().unwrap_or(&mut []);
            for index in 0..pixels {
                let rgba = read(src, index * src_channels);
                let encoded = write(rgba);
                let slots = &mut dst[index * dst_channels..][..dst_channels];
                for (channel, slot) in slots.iter_mut().enumerate() {
                    *slot = if hue_first && channel == 0 {
                        quantize_scaled(encoded[0], 180.0)
                    } else {
                        u8::from_f32(encoded[channel])
                    };
                }
            }
        }
        (_, ElementType::F32) => {
            let dst = out.as_f32_mut().unwrap_or(&mut []);
            for index in 0..pixels {
                let rgba = read(src, index * src_channels);
                let encoded = write(rgba);
                dst[index * dst_channels..][..dst_channels].copy_from_slice(&encoded[..dst_channels]);
            }
        }
    }
    Ok(out)
}

type Reader = fn(&ImageBuffer, usize) -> [f32; 4];
type Writer = fn([f32; 4]) -> [f32; 4];

/// Read one pixel as linear RGBA components in `[0, 1]` space.
fn reader(format: PixelFormat) -> Reader {
    match (format.element, format.layout) {
        (ElementType::U8, ColorLayout::Rgb) => |img, at| {
            let p = &img.as_u8().unwrap_or(&[])[at..];
            [p[0].to_f32(), p[1].to_f32(), p[2].to_f32(), 1.0]
        },
        (ElementType::U8, ColorLayout::Rgba) => |img, at| {
            let p = &img.as_u8().unwrap_or(&[])[at..];
            [p[0].to_f32(), p[1].to_f32(), p[2].to_f32(), p[3].to_f32()]
        },
        (ElementType::U8, ColorLayout::Bgr) => |img, at| {
            let p = &img.as_u8().unwrap_or(&[])[at..];
            [p[2].to_f32(), p[1].to_f32(), p[0].to_f32(), 1.0]
        },
        (ElementType::U8, ColorLayout::Bgra) => |img, at| {
            let p = &img.as_u8().unwrap_or(&[])[at..];
            [p[2].to_f32(), p[1].to_f32(), p[0].to_f32(), p[3].to_f32()]
        },
        (ElementType::U8, ColorLayout::Gray) => |img, at| {
            let v = img.as_u8().unwrap_or(&[])[at].to_f32();
            [v, v, v, 1.0]
        },
        (ElementType::U8, ColorLayout::Hsv) => |img, at| {
            let p = &img.as_u8().unwrap_or(&[])[at..];
            let (r, g, b) = hsv_to_rgb(f32::from(p[0]) / 180.0, p[1].to_f32(), p[2].to_f32());
            [r, g, b, 1.0]
        },
        (ElementType::F32, ColorLayout::Rgb) => |img, at| {
            let p = &img.as_f32().unwrap_or(&[])[at..];
            [p[0], p[1], p[2], 1.0]
        },
        (ElementType::F32, ColorLayout::Rgba) => |img, at| {
            let p = &img.as_f32().unwrap_or(&[])[at..];
            [p[0], p[1], p[2], p[3]]
        },
        (ElementType::F32, ColorLayout::Bgr) => |img, at| {
            let p = &img.as_f32().unwrap_or(&[])[at..];
            [p[2], p[1], p[0], 1.0]
        },
        (ElementType::F32, ColorLayout::Bgra) => |img, at| {
            let p = &img.as_f32().unwrap_or(&[])[at..];
            [p[2], p[1], p[0], p[3]]
        },
        (ElementType::F32, ColorLayout::Gray) => |img, at| {
            let v = img.as_f32().unwrap_or(&[])[at];
            [v, v, v, 1.0]
        },
        (ElementType::F32, ColorLayout::Hsv) => |img, at| {
            let p = &img.as_f32().unwrap_or(&[])[at..];
            let (r, g, b) = hsv_to_rgb(p[0], p[1], p[2]);
            [r, g, b, 1.0]
        },
    }
}

/// Encode RGBA components into the channels of the target layout.
///
/// Returns channel values still in `f32`; quantization is the caller's.
fn writer(format: PixelFormat) -> Writer {
    match format.layout {
        ColorLayout::Rgb => |[r, g, b, _]| [r, g, b, 0.0],
        ColorLayout::Rgba => |rgba| rgba,
        ColorLayout::Bgr => |[r, g, b, _]| [b, g, r, 0.0],
        ColorLayout::Bgra => |[r, g, b, a]| [b, g, r, a],
        ColorLayout::Gray => |[r, g, b, _]| {
            let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
            [luma, 0.0, 0.0, 0.0]
        },
        ColorLayout::Hsv => |[r, g, b, _]| {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            [h, s, v, 0.0]
        },
    }
}

impl ImageBuffer {
    /// Convenience forwarding to [`convert`].
    pub fn convert_to(&self, target: PixelFormat) -> Result<ImageBuffer> {
        convert(self, target)
    }
}

/// RGB to HSV; hue as a fraction of a full turn in `[0, 1)`.
pub(crate) fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let value = max;
    let saturation = if max > 0.0 { delta / max } else { 0.0 };
    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        let mut h = (g - b) / delta;
        if h < 0.0 {
            h += 6.0;
        }
        h / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    (hue, saturation, value)
}

/// HSV to RGB; hue wraps modulo a full turn.
pub(crate) fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h = h - h.floor();
    let h6 = h * 6.0;
    let sector = (h6 as i32).min(5);
    let f = h6 - sector as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferLayout, PixelFormat};

    fn rgba(pixels: &[u8]) -> ImageBuffer {
        let layout = BufferLayout::new(pixels.len() as u32 / 4, 1, PixelFormat::RGBA_U8).unwrap();
        ImageBuffer::from_u8(layout, pixels.to_vec()).unwrap()
    }

    #[test]
    fn swizzle_is_exact() {
        let src = rgba(&[1, 2, 3, 4, 250, 251, 252, 253]);
        let bgra = convert(&src, PixelFormat::new(ElementType::U8, ColorLayout::Bgra)).unwrap();
        assert_eq!(bgra.as_u8().unwrap(), &[3, 2, 1, 4, 252, 251, 250, 253]);
        let back = convert(&bgra, PixelFormat::RGBA_U8).unwrap();
        assert_eq!(back.as_u8(), src.as_u8());
    }

    #[test]
    fn alpha_drop_and_fill() {
        let src = rgba(&[10, 20, 30, 77]);
        let rgb = convert(&src, PixelFormat::RGB_U8).unwrap();
        assert_eq!(rgb.as_u8().unwrap(), &[10, 20, 30]);
        let again = convert(&rgb, PixelFormat::RGBA_U8).unwrap();
        assert_eq!(again.as_u8().unwrap(), &[10, 20, 30, 255]);
    }

    #[test]
    fn gray_replication() {
        let layout = BufferLayout::new(2, 1, PixelFormat::GRAY_U8).unwrap();
        let gray = ImageBuffer::from_u8(layout, vec![0, 200]).unwrap();
        let rgb = convert(&gray, PixelFormat::RGB_U8).unwrap();
        assert_eq!(rgb.as_u8().unwrap(), &[0, 0, 0, 200, 200, 200]);
        let back = convert(&rgb, PixelFormat::GRAY_U8).unwrap();
        assert_eq!(back.as_u8().unwrap(), &[0, 200]);
    }

    #[test]
    fn hsv_primaries() {
        let (h, s, v) = rgb_to_hsv(1.0, 0.0, 0.0);
        assert_eq!((h, s, v), (0.0, 1.0, 1.0));
        let (h, _, _) = rgb_to_hsv(0.0, 1.0, 0.0);
        assert!((h - 1.0 / 3.0).abs() < 1e-6);
        let (r, g, b) = hsv_to_rgb(2.0 / 3.0, 1.0, 1.0);
        assert_eq!((r, g, b), (0.0, 0.0, 1.0));
    }

    #[test]
    fn element_round_trip() {
        let src = rgba(&[0, 1, 127, 128, 254, 255, 63, 64]);
        let floats = convert(&src, PixelFormat::RGBA_F32).unwrap();
        let back = convert(&floats, PixelFormat::RGBA_U8).unwrap();
        assert_eq!(back.as_u8(), src.as_u8());
    }
}
