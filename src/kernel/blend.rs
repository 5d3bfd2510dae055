//! Per-pixel blend modes.
//!
//! Separable modes apply a scalar function per color channel; the
//! non-separable family (hue, saturation, color, luminosity, darker/lighter
//! color) works on whole pixels. When the operands carry alpha the blended
//! color is composed with Porter-Duff "over":
//! `co = αs·(1−αb)·cs + αs·αb·B(cb, cs) + (1−αs)·αb·cb`.
use crate::buffer::{ColorLayout, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::kernel::{samples_from_f32, samples_to_f32};

/// Every supported blend mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Add,
    Subtract,
    Divide,
    DarkerColor,
    LighterColor,
    LinearBurn,
    LinearDodge,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub const ALL: [BlendMode; 27] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Add,
        BlendMode::Subtract,
        BlendMode::Divide,
        BlendMode::DarkerColor,
        BlendMode::LighterColor,
        BlendMode::LinearBurn,
        BlendMode::LinearDodge,
        BlendMode::VividLight,
        BlendMode::LinearLight,
        BlendMode::PinLight,
        BlendMode::HardMix,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color_dodge",
            BlendMode::ColorBurn => "color_burn",
            BlendMode::HardLight => "hard_light",
            BlendMode::SoftLight => "soft_light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Add => "add",
            BlendMode::Subtract => "subtract",
            BlendMode::Divide => "divide",
            BlendMode::DarkerColor => "darker_color",
            BlendMode::LighterColor => "lighter_color",
            BlendMode::LinearBurn => "linear_burn",
            BlendMode::LinearDodge => "linear_dodge",
            BlendMode::VividLight => "vivid_light",
            BlendMode::LinearLight => "linear_light",
            BlendMode::PinLight => "pin_light",
            BlendMode::HardMix => "hard_mix",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BlendMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.name() == name)
    }

    fn is_separable(self) -> bool {
        !matches!(
            self,
            BlendMode::DarkerColor
                | BlendMode::LighterColor
                | BlendMode::Hue
                | BlendMode::Saturation
                | BlendMode::Color
                | BlendMode::Luminosity
        )
    }
}

#[inline]
fn clamp01(value: f32) -> f32 {
    value.max(0.0).min(1.0)
}

/// The separable blend function `B(cb, cs)`.
pub(crate) fn separable(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => separable(BlendMode::HardLight, cs, cb),
        BlendMode::Darken => cb.min(cs),
        BlendMode::Lighten => cb.max(cs),
        BlendMode::ColorDodge => {
            if cb <= 0.0 {
                0.0
            } else if cs >= 1.0 {
                1.0
            } else {
                (cb / (1.0 - cs)).min(1.0)
            }
        }
        BlendMode::ColorBurn => {
            if cb >= 1.0 {
                1.0
            } else if cs <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - cb) / cs).min(1.0)
            }
        }
        BlendMode::HardLight => {
            if cs <= 0.5 {
                cb * (2.0 * cs)
            } else {
                let cs2 = 2.0 * cs - 1.0;
                cb + cs2 - cb * cs2
            }
        }
        BlendMode::SoftLight => {
            if cs <= 0.5 {
                cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
            } else {
                let d = if cb <= 0.25 {
                    ((16.0 * cb - 12.0) * cb + 4.0) * cb
                } else {
                    cb.sqrt()
                };
                cb + (2.0 * cs - 1.0) * (d - cb)
            }
        }
        BlendMode::Difference => (cb - cs).abs(),
        BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
        BlendMode::Add | BlendMode::LinearDodge => (cb + cs).min(1.0),
        BlendMode::Subtract => (cb - cs).max(0.0),
        BlendMode::Divide => {
            if cs <= 0.0 {
                1.0
            } else {
                (cb / cs).min(1.0)
            }
        }
        BlendMode::LinearBurn => (cb + cs - 1.0).max(0.0),
        BlendMode::VividLight => {
            if cs <= 0.5 {
                separable(BlendMode::ColorBurn, cb, 2.0 * cs)
            } else {
                separable(BlendMode::ColorDodge, cb, 2.0 * cs - 1.0)
            }
        }
        BlendMode::LinearLight => clamp01(cb + 2.0 * cs - 1.0),
        BlendMode::PinLight => {
            if cs <= 0.5 {
                cb.min(2.0 * cs)
            } else {
                cb.max(2.0 * cs - 1.0)
            }
        }
        BlendMode::HardMix => {
            if cb + cs < 1.0 {
                0.0
            } else {
                1.0
            }
        }
        // Non-separable modes never reach this function.
        _ => cs,
    }
}

// W3C compositing luma weights for the non-separable family.
const LUM_R: f32 = 0.3;
const LUM_G: f32 = 0.59;
const LUM_B: f32 = 0.11;

fn lum(color: [f32; 3]) -> f32 {
    LUM_R * color[0] + LUM_G * color[1] + LUM_B * color[2]
}

fn clip_color(mut color: [f32; 3]) -> [f32; 3] {
    let luminosity = lum(color);
    let min = color[0].min(color[1]).min(color[2]);
    let max = color[0].max(color[1]).max(color[2]);
    if min < 0.0 {
        for channel in color.iter_mut() {
            *channel = luminosity + (*channel - luminosity) * luminosity / (luminosity - min);
        }
    }
    if max > 1.0 {
        for channel in color.iter_mut() {
            *channel =
                luminosity + (*channel - luminosity) * (1.0 - luminosity) / (max - luminosity);
        }
    }
    color
}

fn set_lum(color: [f32; 3], luminosity: f32) -> [f32; 3] {
    let delta = luminosity - lum(color);
    clip_color([color[0] + delta, color[1] + delta, color[2] + delta])
}

fn sat(color: [f32; 3]) -> f32 {
    color[0].max(color[1]).max(color[2]) - color[0].min(color[1]).min(color[2])
}

fn set_sat(color: [f32; 3], saturation: f32) -> [f32; 3] {
    // Order the channel indices by value; the middle scales
    // proportionally between the extremes.
    let mut indices = [0usize, 1, 2];
    indices.sort_by(|&a, &b| {
        color[a]
            .partial_cmp(&color[b])
            .unwrap_or(core::cmp::Ordering::Equal)
    });
    let (min, mid, max) = (indices[0], indices[1], indices[2]);
    let mut out = [0.0f32; 3];
    if color[max] > color[min] {
        out[mid] = (color[mid] - color[min]) * saturation / (color[max] - color[min]);
        out[max] = saturation;
    }
    out
}

/// The non-separable blend function over whole RGB pixels.
fn non_separable(mode: BlendMode, cb: [f32; 3], cs: [f32; 3]) -> [f32; 3] {
    match mode {
        BlendMode::DarkerColor => {
            if lum(cs) < lum(cb) {
                cs
            } else {
                cb
            }
        }
        BlendMode::LighterColor => {
            if lum(cs) > lum(cb) {
                cs
            } else {
                cb
            }
        }
        BlendMode::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        BlendMode::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        BlendMode::Color => set_lum(cs, lum(cb)),
        BlendMode::Luminosity => set_lum(cb, lum(cs)),
        _ => cs,
    }
}

/// Blend `above` onto `below`.
///
/// Operands must share dimensions and pixel format; the layout must be one
/// of the RGB-ordered families. With alpha present the blended color is
/// composed with source-over.
pub fn blend(mode: BlendMode, below: &ImageBuffer, above: &ImageBuffer) -> Result<ImageBuffer> {
    if below.layout().size() != above.layout().size() {
        return Err(Error::shape_mismatch(
            "blend",
            below.layout().size(),
            above.layout().size(),
        ));
    }
    if below.format() != above.format() {
        return Err(Error::layout_mismatch(above.format(), &[below.format()]));
    }
    let layout = below.format().layout;
    let (r_at, g_at, b_at) = match layout {
        ColorLayout::Rgb | ColorLayout::Rgba => (0usize, 1, 2),
        ColorLayout::Bgr | ColorLayout::Bgra => (2, 1, 0),
        _ => {
            return Err(Error::layout_mismatch(
                below.format(),
                &[PixelFormat::RGBA_U8, PixelFormat::RGB_U8],
            ))
        }
    };
    let has_alpha = layout.has_alpha();
    let channels = below.channels();

    let base = samples_to_f32(below);
    let over = samples_to_f32(above);
    let mut out = vec![0.0f32; base.len()];

    for ((base_px, over_px), out_px) in base
        .chunks_exact(channels)
        .zip(over.chunks_exact(channels))
        .zip(out.chunks_exact_mut(channels))
    {
        let cb = [base_px[r_at], base_px[g_at], base_px[b_at]];
        let cs = [over_px[r_at], over_px[g_at], over_px[b_at]];

        let blended = if mode.is_separable() {
            [
                separable(mode, cb[0], cs[0]),
                separable(mode, cb[1], cs[1]),
                separable(mode, cb[2], cs[2]),
            ]
        } else {
            non_separable(mode, cb, cs)
        };

        if has_alpha {
            let ab = base_px[3];
            let al = over_px[3];
            let ao = al + ab * (1.0 - al);
            let mut composed = [0.0f32; 3];
            for channel in 0..3 {
                let co = al * (1.0 - ab) * cs[channel]
                    + al * ab * blended[channel]
                    + (1.0 - al) * ab * cb[channel];
                composed[channel] = if ao > 0.0 { co / ao } else { 0.0 };
            }
            out_px[r_at] = composed[0];
            out_px[g_at] = composed[1];
            out_px[b_at] = composed[2];
            out_px[3] = ao;
        } else {
            out_px[r_at] = blended[0];
            out_px[g_at] = blended[1];
            out_px[b_at] = blended[2];
        }
    }
    samples_from_f32(*below.layout(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLayout;

    fn solid(value: [u8; 3]) -> ImageBuffer {
        let layout = BufferLayout::new(2, 2, PixelFormat::RGB_U8).unwrap();
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&value);
        }
        ImageBuffer::from_u8(layout, data).unwrap()
    }

    #[test]
    fn multiply_mid_gray() {
        let out = blend(BlendMode::Multiply, &solid([128; 3]), &solid([128; 3])).unwrap();
        assert_eq!(&out.as_u8().unwrap()[..3], &[64, 64, 64]);
    }

    #[test]
    fn screen_is_dual_of_multiply() {
        let below = solid([100, 150, 200]);
        let above = solid([50, 60, 70]);
        let screened = blend(BlendMode::Screen, &below, &above).unwrap();
        // screen(a, b) = 1 - (1-a)(1-b)
        let expect = |a: u8, b: u8| {
            let (a, b) = (a as f32 / 255.0, b as f32 / 255.0);
            ((1.0 - (1.0 - a) * (1.0 - b)) * 255.0 + 0.5) as u8
        };
        assert_eq!(
            &screened.as_u8().unwrap()[..3],
            &[expect(100, 50), expect(150, 60), expect(200, 70)]
        );
    }

    #[test]
    fn normal_returns_above() {
        let out = blend(BlendMode::Normal, &solid([1, 2, 3]), &solid([7, 8, 9])).unwrap();
        assert_eq!(&out.as_u8().unwrap()[..3], &[7, 8, 9]);
    }

    #[test]
    fn shape_mismatch_refused() {
        let layout = BufferLayout::new(1, 1, PixelFormat::RGB_U8).unwrap();
        let small = ImageBuffer::from_u8(layout, vec![0, 0, 0]).unwrap();
        let err = blend(BlendMode::Normal, &solid([0; 3]), &small).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);
    }

    #[test]
    fn luminosity_takes_above_luma() {
        let below = solid([255, 0, 0]);
        let above = solid([255, 255, 255]);
        let out = blend(BlendMode::Luminosity, &below, &above).unwrap();
        // set_lum(red, 1.0) clips to white.
        assert_eq!(&out.as_u8().unwrap()[..3], &[255, 255, 255]);
    }
}
