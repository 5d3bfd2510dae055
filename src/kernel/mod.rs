//! The kernel library: pure, deterministic per-pixel and per-neighborhood
//! operations.
//!
//! Every kernel is a pure function `(inputs, params) -> outputs`. Given the
//! same inputs and params it returns byte-identical results on every build
//! target: plain IEEE-754 `f32` arithmetic, no fused multiply-add, no RNG
//! without an explicit seed, no dependence on pixel iteration order.
//!
//! Kernels exist for both `U8` and `F32` buffers with a shared algorithmic
//! body; the `U8` variant must match the `u8 -> f32 -> kernel -> u8` round
//! trip within one LSB per channel.
pub mod alpha;
pub mod blend;
pub mod blur;
pub mod convert;
pub mod edge;
pub mod effects;
pub mod geometric;
pub mod histogram;
pub mod morphology;
pub mod point;

use crate::buffer::ImageBuffer;
use crate::error::Result;

/// How a neighborhood kernel treats coordinates outside the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EdgeMode {
    /// Repeat the edge sample. The default everywhere.
    Clamp,
    /// Mirror including the edge sample.
    Reflect,
    /// Wrap around to the opposite edge.
    Wrap,
    /// A constant sample, in normalized `[0, 1]` units.
    Constant(f32),
}

impl Default for EdgeMode {
    fn default() -> Self {
        EdgeMode::Clamp
    }
}

impl EdgeMode {
    pub fn name(self) -> &'static str {
        match self {
            EdgeMode::Clamp => "clamp",
            EdgeMode::Reflect => "reflect",
            EdgeMode::Wrap => "wrap",
            EdgeMode::Constant(_) => "constant",
        }
    }
}

/// One channel sample, the abstraction kernels are generic over.
pub(crate) trait Sample: Copy + Send + Sync + 'static {
    fn to_f32(self) -> f32;
    /// Quantize back. For `u8` this clamps and rounds half away from zero;
    /// for `f32` it is the identity and in particular does NOT clamp.
    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self) / 255.0
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        let scaled = value * 255.0 + 0.5;
        if scaled <= 0.0 {
            0
        } else if scaled >= 255.0 {
            255
        } else {
            scaled as u8
        }
    }
}

impl Sample for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

/// Resolve a possibly out-of-range coordinate against one axis.
///
/// Returns `None` exactly for `EdgeMode::Constant`, in which case the caller
/// substitutes the constant sample.
#[inline]
pub(crate) fn resolve_coord(coord: i64, len: u32, mode: EdgeMode) -> Option<usize> {
    let len = i64::from(len);
    debug_assert!(len > 0);
    if (0..len).contains(&coord) {
        return Some(coord as usize);
    }
    match mode {
        EdgeMode::Clamp => Some(coord.max(0).min(len - 1) as usize),
        EdgeMode::Reflect => {
            let mut p = coord;
            // Mirror until inside; terminates since each step shrinks |p|.
            loop {
                if p < 0 {
                    p = -p - 1;
                } else if p >= len {
                    p = 2 * len - p - 1;
                } else {
                    return Some(p as usize);
                }
            }
        }
        EdgeMode::Wrap => Some(p_mod(coord, len) as usize),
        EdgeMode::Constant(_) => None,
    }
}

#[inline]
fn p_mod(value: i64, modulus: i64) -> i64 {
    let rem = value % modulus;
    if rem < 0 {
        rem + modulus
    } else {
        rem
    }
}

/// The constant sample of an edge mode, if any.
#[inline]
pub(crate) fn edge_constant(mode: EdgeMode) -> f32 {
    match mode {
        EdgeMode::Constant(value) => value,
        _ => 0.0,
    }
}

/// All samples of a buffer as an `f32` plane, in storage order.
///
/// This is the entry into the shared `f32` kernel bodies: the `U8` variant
/// of a kernel is the `F32` variant bracketed by this load and one final
/// quantization, which keeps both variants within one LSB by construction.
pub(crate) fn samples_to_f32(src: &ImageBuffer) -> Vec<f32> {
    match src.as_f32() {
        Some(data) => data.to_vec(),
        None => src
            .as_u8()
            .unwrap_or(&[])
            .iter()
            .map(|&byte| byte.to_f32())
            .collect(),
    }
}

/// Store an `f32` plane back into a buffer of the given layout, quantizing
/// once when the layout's element is `U8`.
pub(crate) fn samples_from_f32(
    layout: crate::buffer::BufferLayout,
    data: Vec<f32>,
) -> Result<ImageBuffer> {
    debug_assert_eq!(data.len(), layout.sample_len());
    match layout.element() {
        crate::buffer::ElementType::F32 => ImageBuffer::from_f32(layout, data)
            .ok_or_else(|| crate::error::Error::exhausted("pixel buffer")),
        crate::buffer::ElementType::U8 => {
            let bytes = data.iter().map(|&value| u8::from_f32(value)).collect();
            ImageBuffer::from_u8(layout, bytes)
                .ok_or_else(|| crate::error::Error::exhausted("pixel buffer"))
        }
    }
}

/// A kernel registered for cross-target parity checking.
///
/// The catalog of registrations is fixed; each entry runs one kernel with
/// pinned parameters over a golden input buffer.
pub struct KernelEntry {
    pub name: &'static str,
    pub run: fn(&ImageBuffer) -> Result<ImageBuffer>,
}

/// Every kernel checked by the parity harness.
///
/// Golden inputs are RGBA; entries convert to their working format
/// themselves so the whole path under test is deterministic.
pub fn registered_kernels() -> &'static [KernelEntry] {
    &[
        KernelEntry {
            name: "invert",
            run: |img| point::invert(img),
        },
        KernelEntry {
            name: "threshold_128",
            run: |img| {
                let gray = convert::convert(img, crate::buffer::PixelFormat::GRAY_U8)?;
                point::threshold(&gray, 128.0 / 255.0)
            },
        },
        KernelEntry {
            name: "brightness_0_25",
            run: |img| point::brightness(img, 0.25),
        },
        KernelEntry {
            name: "contrast_1_5",
            run: |img| point::contrast(img, 1.5),
        },
        KernelEntry {
            name: "gamma_2_2",
            run: |img| point::gamma(img, 2.2),
        },
        KernelEntry {
            name: "posterize_4",
            run: |img| point::posterize(img, 4),
        },
        KernelEntry {
            name: "grayscale_luminosity",
            run: |img| point::grayscale(img, point::GrayMethod::Luminosity),
        },
        KernelEntry {
            name: "box_blur_3",
            run: |img| blur::box_blur(img, 3, EdgeMode::Clamp),
        },
        KernelEntry {
            name: "gaussian_blur_1_5",
            run: |img| blur::gaussian_blur(img, 1.5, EdgeMode::Clamp),
        },
        KernelEntry {
            name: "median_blur_3",
            run: |img| blur::median_blur(img, 3, EdgeMode::Clamp),
        },
        KernelEntry {
            name: "sobel",
            run: |img| {
                let gray = convert::convert(img, crate::buffer::PixelFormat::GRAY_U8)?;
                edge::sobel(&gray, EdgeMode::Clamp)
            },
        },
        KernelEntry {
            name: "laplacian",
            run: |img| {
                let gray = convert::convert(img, crate::buffer::PixelFormat::GRAY_U8)?;
                edge::laplacian(&gray, EdgeMode::Clamp)
            },
        },
        KernelEntry {
            name: "canny_0_2_0_5",
            run: |img| {
                let gray = convert::convert(img, crate::buffer::PixelFormat::GRAY_U8)?;
                edge::canny(&gray, 1.0, 0.2, 0.5)
            },
        },
        KernelEntry {
            name: "erode_rect_3",
            run: |img| {
                morphology::erode(img, morphology::StructuringElement::rect(3)?, EdgeMode::Clamp)
            },
        },
        KernelEntry {
            name: "dilate_ellipse_5",
            run: |img| {
                morphology::dilate(
                    img,
                    morphology::StructuringElement::ellipse(5)?,
                    EdgeMode::Clamp,
                )
            },
        },
        KernelEntry {
            name: "resize_bilinear_half",
            run: |img| {
                let (w, h) = img.layout().size();
                geometric::resize(
                    img,
                    (w / 2).max(1),
                    (h / 2).max(1),
                    geometric::Interpolation::Bilinear,
                )
            },
        },
        KernelEntry {
            name: "resize_lanczos_double",
            run: |img| {
                let (w, h) = img.layout().size();
                geometric::resize(img, w * 2, h * 2, geometric::Interpolation::Lanczos3)
            },
        },
        KernelEntry {
            name: "rotate_90",
            run: |img| geometric::rotate90(img, geometric::Quarter::Quarter90),
        },
        KernelEntry {
            name: "flip_horizontal",
            run: |img| geometric::flip(img, geometric::FlipAxis::Horizontal),
        },
        KernelEntry {
            name: "equalize",
            run: |img| {
                let gray = convert::convert(img, crate::buffer::PixelFormat::GRAY_U8)?;
                histogram::equalize(&gray)
            },
        },
        KernelEntry {
            name: "premultiply",
            run: |img| alpha::premultiply(img),
        },
        KernelEntry {
            name: "distance_field",
            run: |img| alpha::distance_field(img, 16.0),
        },
        KernelEntry {
            name: "blend_multiply_self",
            run: |img| blend::blend(blend::BlendMode::Multiply, img, img),
        },
        KernelEntry {
            name: "blend_soft_light_self",
            run: |img| blend::blend(blend::BlendMode::SoftLight, img, img),
        },
        KernelEntry {
            name: "drop_shadow",
            run: |img| {
                let params = effects::DropShadowParams {
                    offset_x: 4.0,
                    offset_y: 4.0,
                    sigma: 2.0,
                    spread: 0,
                    color: crate::color::Color::BLACK,
                    opacity: 0.75,
                };
                effects::drop_shadow(img, &params).map(|out| out.buffer)
            },
        },
        KernelEntry {
            name: "outer_glow",
            run: |img| {
                let params = effects::GlowParams {
                    sigma: 3.0,
                    spread: 1,
                    color: crate::color::Color::WHITE,
                    opacity: 0.5,
                };
                effects::outer_glow(img, &params).map(|out| out.buffer)
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_quantization_rounds() {
        assert_eq!(u8::from_f32(0.0), 0);
        assert_eq!(u8::from_f32(1.0), 255);
        assert_eq!(u8::from_f32(-0.5), 0);
        assert_eq!(u8::from_f32(2.0), 255);
        // 0.5/255 rounds up.
        assert_eq!(u8::from_f32(0.5 / 255.0), 1);
    }

    #[test]
    fn edge_resolution() {
        assert_eq!(resolve_coord(-1, 4, EdgeMode::Clamp), Some(0));
        assert_eq!(resolve_coord(4, 4, EdgeMode::Clamp), Some(3));
        assert_eq!(resolve_coord(-1, 4, EdgeMode::Reflect), Some(0));
        assert_eq!(resolve_coord(-2, 4, EdgeMode::Reflect), Some(1));
        assert_eq!(resolve_coord(5, 4, EdgeMode::Reflect), Some(2));
        assert_eq!(resolve_coord(-1, 4, EdgeMode::Wrap), Some(3));
        assert_eq!(resolve_coord(4, 4, EdgeMode::Wrap), Some(0));
        assert_eq!(resolve_coord(-1, 4, EdgeMode::Constant(0.0)), None);
        assert_eq!(resolve_coord(2, 4, EdgeMode::Constant(0.0)), Some(2));
    }
}
