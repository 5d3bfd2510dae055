//! Point operations: every output sample depends on exactly one input
//! sample (plus parameters).
//!
//! For `U8` buffers the scalar curve is evaluated once per possible byte
//! into a 256-entry lookup table, published in a write-once cache keyed by
//! the parameter fingerprint. Racing writers compute equal tables, so the
//! first published entry wins harmlessly.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::buffer::{ColorLayout, ElementType, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::kernel::convert::{LUMA_B, LUMA_G, LUMA_R};
use crate::kernel::Sample;

/// How to reduce color to a single gray channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrayMethod {
    /// Rec.709 weighted sum.
    Luminosity,
    /// Plain channel mean.
    Average,
}

impl GrayMethod {
    pub fn name(self) -> &'static str {
        match self {
            GrayMethod::Luminosity => "luminosity",
            GrayMethod::Average => "average",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "luminosity" => GrayMethod::Luminosity,
            "average" => GrayMethod::Average,
            _ => return None,
        })
    }
}

// Identifiers for the LUT cache. Never reused across curves.
const OP_THRESHOLD: u8 = 1;
const OP_INVERT: u8 = 2;
const OP_BRIGHTNESS: u8 = 3;
const OP_CONTRAST: u8 = 4;
const OP_GAMMA: u8 = 5;
const OP_LOG: u8 = 6;
const OP_SIGMOID: u8 = 7;
const OP_POSTERIZE: u8 = 8;
const OP_SOLARIZE: u8 = 9;

static POINT_LUTS: Lazy<Mutex<HashMap<(u8, u64), Arc<[u8; 256]>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn lut_for(op: u8, fingerprint: u64, curve: impl Fn(f32) -> f32) -> Arc<[u8; 256]> {
    let mut cache = POINT_LUTS.lock().unwrap_or_else(|poison| poison.into_inner());
    cache
        .entry((op, fingerprint))
        .or_insert_with(|| {
            let mut table = [0u8; 256];
            for (byte, slot) in table.iter_mut().enumerate() {
                *slot = u8::from_f32(curve((byte as u8).to_f32()));
            }
            Arc::new(table)
        })
        .clone()
}

fn fingerprint(params: &[f32]) -> u64 {
    // FNV-1a over the raw bits; only identity matters, not distribution.
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &param in params {
        hash ^= u64::from(param.to_bits());
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Index of the alpha channel of a layout, if it carries one.
fn alpha_channel(layout: ColorLayout) -> Option<usize> {
    if layout.has_alpha() {
        Some(3)
    } else {
        None
    }
}

/// Apply a scalar curve to every color channel, leaving alpha untouched.
fn map_channels(
    src: &ImageBuffer,
    op: u8,
    params: &[f32],
    curve: impl Fn(f32) -> f32 + Copy,
) -> Result<ImageBuffer> {
    let channels = src.channels();
    let alpha = alpha_channel(src.format().layout);
    let mut out = src.clone();

    match src.format().element {
        ElementType::U8 => {
            let lut = lut_for(op, fingerprint(params), curve);
            let data = out.as_u8_mut().unwrap_or(&mut []);
            for (index, sample) in data.iter_mut().enumerate() {
                if alpha == Some(index % channels) {
                    continue;
                }
                *sample = lut[usize::from(*sample)];
            }
        }
        ElementType::F32 => {
            let data = out.as_f32_mut().unwrap_or(&mut []);
            for (index, sample) in data.iter_mut().enumerate() {
                if alpha == Some(index % channels) {
                    continue;
                }
                *sample = curve(*sample);
            }
        }
    }
    Ok(out)
}

/// Binary threshold: samples at or above `value` (normalized) saturate.
pub fn threshold(src: &ImageBuffer, value: f32) -> Result<ImageBuffer> {
    map_channels(src, OP_THRESHOLD, &[value], move |v| {
        if v >= value {
            1.0
        } else {
            0.0
        }
    })
}

pub fn invert(src: &ImageBuffer) -> Result<ImageBuffer> {
    map_channels(src, OP_INVERT, &[], |v| 1.0 - v)
}

/// Add a constant offset to every color sample.
pub fn brightness(src: &ImageBuffer, amount: f32) -> Result<ImageBuffer> {
    map_channels(src, OP_BRIGHTNESS, &[amount], move |v| v + amount)
}

/// Scale contrast around the mid-point.
pub fn contrast(src: &ImageBuffer, factor: f32) -> Result<ImageBuffer> {
    if factor < 0.0 {
        return Err(Error::invalid_argument("factor", "contrast factor must be non-negative"));
    }
    map_channels(src, OP_CONTRAST, &[factor], move |v| (v - 0.5) * factor + 0.5)
}

/// Power curve `v^(1/gamma)`.
pub fn gamma(src: &ImageBuffer, gamma: f32) -> Result<ImageBuffer> {
    if !(gamma > 0.0) {
        return Err(Error::invalid_argument("gamma", "gamma must be positive"));
    }
    let exponent = 1.0 / gamma;
    map_channels(src, OP_GAMMA, &[gamma], move |v| {
        if v <= 0.0 {
            0.0
        } else {
            v.powf(exponent)
        }
    })
}

/// Logarithmic tone curve `ln(1 + v) / ln(2)`.
pub fn log_curve(src: &ImageBuffer) -> Result<ImageBuffer> {
    map_channels(src, OP_LOG, &[], |v| {
        if v <= -1.0 {
            0.0
        } else {
            (1.0 + v).ln() / core::f32::consts::LN_2
        }
    })
}

/// Logistic curve with the given gain around `midpoint`.
pub fn sigmoid(src: &ImageBuffer, gain: f32, midpoint: f32) -> Result<ImageBuffer> {
    if !(gain > 0.0) {
        return Err(Error::invalid_argument("gain", "sigmoid gain must be positive"));
    }
    map_channels(src, OP_SIGMOID, &[gain, midpoint], move |v| {
        1.0 / (1.0 + (-gain * (v - midpoint)).exp())
    })
}

/// Reduce to `levels` evenly spaced values per channel.
pub fn posterize(src: &ImageBuffer, levels: u8) -> Result<ImageBuffer> {
    if levels < 2 {
        return Err(Error::invalid_argument("levels", "posterize needs at least 2 levels"));
    }
    let steps = f32::from(levels - 1);
    map_channels(src, OP_POSTERIZE, &[steps], move |v| {
        (v * steps + 0.5).floor() / steps
    })
}

/// Invert samples at or above the threshold.
pub fn solarize(src: &ImageBuffer, threshold: f32) -> Result<ImageBuffer> {
    map_channels(src, OP_SOLARIZE, &[threshold], move |v| {
        if v >= threshold {
            1.0 - v
        } else {
            v
        }
    })
}

/// Per-pixel saturation scale around the pixel's luma.
pub fn saturation(src: &ImageBuffer, factor: f32) -> Result<ImageBuffer> {
    if factor < 0.0 {
        return Err(Error::invalid_argument("factor", "saturation factor must be non-negative"));
    }
    let layout = src.format().layout;
    let (r_at, g_at, b_at) = match layout {
        ColorLayout::Rgb | ColorLayout::Rgba => (0, 1, 2),
        ColorLayout::Bgr | ColorLayout::Bgra => (2, 1, 0),
        _ => {
            return Err(Error::layout_mismatch(
                src.format(),
                &[PixelFormat::RGB_U8, PixelFormat::RGBA_U8],
            ))
        }
    };
    let channels = src.channels();
    let mut out = src.clone();

    let adjust = move |pixel: &mut [f32]| {
        let luma = LUMA_R * pixel[r_at] + LUMA_G * pixel[g_at] + LUMA_B * pixel[b_at];
        for &at in [r_at, g_at, b_at].iter() {
            pixel[at] = luma + (pixel[at] - luma) * factor;
        }
    };

    match src.format().element {
        ElementType::F32 => {
            let data = out.as_f32_mut().unwrap_or(&mut []);
            for pixel in data.chunks_exact_mut(channels) {
                adjust(pixel);
            }
        }
        ElementType::U8 => {
            let data = out.as_u8_mut().unwrap_or(&mut []);
            for pixel in data.chunks_exact_mut(channels) {
                let mut values = [0.0f32; 4];
                for (slot, &byte) in values.iter_mut().zip(pixel.iter()) {
                    *slot = byte.to_f32();
                }
                adjust(&mut values[..channels]);
                // Alpha passes through the identity quantization unchanged.
                for (byte, &value) in pixel.iter_mut().zip(values.iter()) {
                    *byte = u8::from_f32(value);
                }
            }
        }
    }
    Ok(out)
}

/// Reduce to a single gray channel.
pub fn grayscale(src: &ImageBuffer, method: GrayMethod) -> Result<ImageBuffer> {
    let layout = src.format().layout;
    let (r_at, g_at, b_at) = match layout {
        ColorLayout::Rgb | ColorLayout::Rgba => (0, 1, 2),
        ColorLayout::Bgr | ColorLayout::Bgra => (2, 1, 0),
        ColorLayout::Gray => return Ok(src.clone()),
        ColorLayout::Hsv => {
            return Err(Error::layout_mismatch(
                src.format(),
                &[PixelFormat::RGB_U8, PixelFormat::RGBA_U8],
            ))
        }
    };
    let channels = src.channels();
    let element = src.format().element;
    let target = src
        .layout()
        .with_format(PixelFormat::new(element, ColorLayout::Gray))
        .ok_or_else(|| Error::exhausted("pixel buffer layout"))?;
    let mut out = ImageBuffer::with_layout(target);

    let reduce = move |r: f32, g: f32, b: f32| match method {
        GrayMethod::Luminosity => LUMA_R * r + LUMA_G * g + LUMA_B * b,
        GrayMethod::Average => (r + g + b) / 3.0,
    };

    match element {
        ElementType::U8 => {
            let source = src.as_u8().unwrap_or(&[]);
            let data = out.as_u8_mut().unwrap_or(&mut []);
            for (slot, pixel) in data.iter_mut().zip(source.chunks_exact(channels)) {
                let value = reduce(
                    pixel[r_at].to_f32(),
                    pixel[g_at].to_f32(),
                    pixel[b_at].to_f32(),
                );
                *slot = u8::from_f32(value);
            }
        }
        ElementType::F32 => {
            let source = src.as_f32().unwrap_or(&[]);
            let data = out.as_f32_mut().unwrap_or(&mut []);
            for (slot, pixel) in data.iter_mut().zip(source.chunks_exact(channels)) {
                *slot = reduce(pixel[r_at], pixel[g_at], pixel[b_at]);
            }
        }
    }
    Ok(out)
}

/// Map gray input through a 256-entry RGB table.
///
/// The input must be single-channel; the output is RGB in the input's
/// element type.
pub fn colormap(src: &ImageBuffer, table: &[[u8; 3]; 256]) -> Result<ImageBuffer> {
    if src.format().layout != ColorLayout::Gray {
        return Err(Error::layout_mismatch(
            src.format(),
            &[PixelFormat::GRAY_U8, PixelFormat::GRAY_F32],
        ));
    }
    let element = src.format().element;
    let target = src
        .layout()
        .with_format(PixelFormat::new(element, ColorLayout::Rgb))
        .ok_or_else(|| Error::exhausted("pixel buffer layout"))?;
    let mut out = ImageBuffer::with_layout(target);

    match element {
        ElementType::U8 => {
            let source = src.as_u8().unwrap_or(&[]);
            let data = out.as_u8_mut().unwrap_or(&mut []);
            for (slot, &gray) in data.chunks_exact_mut(3).zip(source.iter()) {
                slot.copy_from_slice(&table[usize::from(gray)]);
            }
        }
        ElementType::F32 => {
            let source = src.as_f32().unwrap_or(&[]);
            let data = out.as_f32_mut().unwrap_or(&mut []);
            for (slot, &gray) in data.chunks_exact_mut(3).zip(source.iter()) {
                let index = usize::from(u8::from_f32(gray));
                let entry = &table[index];
                slot[0] = entry[0].to_f32();
                slot[1] = entry[1].to_f32();
                slot[2] = entry[2].to_f32();
            }
        }
    }
    Ok(out)
}

/// A built-in colormap table by name: `gray`, `jet`, `hot`, `cool`.
pub fn builtin_colormap(name: &str) -> Option<[[u8; 3]; 256]> {
    let curve: fn(f32) -> [f32; 3] = match name {
        "gray" => |v| [v, v, v],
        "jet" => |v| {
            let r = (1.5 - (4.0 * v - 3.0).abs()).max(0.0).min(1.0);
            let g = (1.5 - (4.0 * v - 2.0).abs()).max(0.0).min(1.0);
            let b = (1.5 - (4.0 * v - 1.0).abs()).max(0.0).min(1.0);
            [r, g, b]
        },
        "hot" => |v| {
            let r = (3.0 * v).min(1.0);
            let g = (3.0 * v - 1.0).max(0.0).min(1.0);
            let b = (3.0 * v - 2.0).max(0.0).min(1.0);
            [r, g, b]
        },
        "cool" => |v| [v, 1.0 - v, 1.0],
        _ => return None,
    };
    let mut table = [[0u8; 3]; 256];
    for (byte, slot) in table.iter_mut().enumerate() {
        let rgb = curve(byte as f32 / 255.0);
        *slot = [
            u8::from_f32(rgb[0]),
            u8::from_f32(rgb[1]),
            u8::from_f32(rgb[2]),
        ];
    }
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLayout;

    fn gray(values: &[u8]) -> ImageBuffer {
        let layout = BufferLayout::new(values.len() as u32, 1, PixelFormat::GRAY_U8).unwrap();
        ImageBuffer::from_u8(layout, values.to_vec()).unwrap()
    }

    #[test]
    fn threshold_is_inclusive_at_value() {
        let out = threshold(&gray(&[127, 128, 129]), 128.0 / 255.0).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[0, 255, 255]);
    }

    #[test]
    fn invert_round_trips() {
        let src = gray(&[0, 1, 128, 255]);
        let twice = invert(&invert(&src).unwrap()).unwrap();
        assert_eq!(twice.as_u8(), src.as_u8());
    }

    #[test]
    fn alpha_is_preserved() {
        let layout = BufferLayout::new(1, 1, PixelFormat::RGBA_U8).unwrap();
        let src = ImageBuffer::from_u8(layout, vec![10, 20, 30, 77]).unwrap();
        let out = invert(&src).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[245, 235, 225, 77]);
    }

    #[test]
    fn posterize_two_levels_is_threshold() {
        let out = posterize(&gray(&[0, 100, 200, 255]), 2).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[0, 0, 255, 255]);
        assert!(posterize(&gray(&[0]), 1).is_err());
    }

    #[test]
    fn grayscale_average_differs_from_luminosity() {
        let layout = BufferLayout::new(1, 1, PixelFormat::RGB_U8).unwrap();
        let red = ImageBuffer::from_u8(layout, vec![255, 0, 0]).unwrap();
        let luma = grayscale(&red, GrayMethod::Luminosity).unwrap();
        let mean = grayscale(&red, GrayMethod::Average).unwrap();
        assert_eq!(luma.as_u8().unwrap(), &[54]);
        assert_eq!(mean.as_u8().unwrap(), &[85]);
    }
}
