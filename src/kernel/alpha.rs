//! Alpha-channel operations.
use crate::buffer::{ColorLayout, ElementType, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::kernel::morphology::{rank_on_plane, Extremum, StructuringElement};
use crate::kernel::{samples_from_f32, samples_to_f32, EdgeMode, Sample};

fn require_alpha(src: &ImageBuffer) -> Result<()> {
    if !src.format().layout.has_alpha() {
        return Err(Error::layout_mismatch(
            src.format(),
            &[PixelFormat::RGBA_U8, PixelFormat::RGBA_F32],
        ));
    }
    Ok(())
}

/// The alpha channel as a bare `f32` plane of `width * height` samples.
pub(crate) fn alpha_plane(src: &ImageBuffer) -> Result<Vec<f32>> {
    require_alpha(src)?;
    let channels = src.channels();
    let plane = samples_to_f32(src);
    Ok(plane
        .chunks_exact(channels)
        .map(|pixel| pixel[3])
        .collect())
}

/// A copy of `src` with its alpha channel replaced by `alpha`.
pub(crate) fn with_alpha_plane(src: &ImageBuffer, alpha: &[f32]) -> Result<ImageBuffer> {
    require_alpha(src)?;
    let channels = src.channels();
    let mut plane = samples_to_f32(src);
    for (pixel, &value) in plane.chunks_exact_mut(channels).zip(alpha.iter()) {
        pixel[3] = value;
    }
    samples_from_f32(*src.layout(), plane)
}

/// Multiply color channels by alpha.
pub fn premultiply(src: &ImageBuffer) -> Result<ImageBuffer> {
    require_alpha(src)?;
    let channels = src.channels();
    let mut plane = samples_to_f32(src);
    for pixel in plane.chunks_exact_mut(channels) {
        let alpha = pixel[3];
        for value in pixel[..3].iter_mut() {
            *value *= alpha;
        }
    }
    samples_from_f32(*src.layout(), plane)
}

/// Divide color channels by alpha. Fully transparent pixels are left as-is.
pub fn unpremultiply(src: &ImageBuffer) -> Result<ImageBuffer> {
    require_alpha(src)?;
    let channels = src.channels();
    let mut plane = samples_to_f32(src);
    for pixel in plane.chunks_exact_mut(channels) {
        let alpha = pixel[3];
        if alpha > 0.0 {
            for value in pixel[..3].iter_mut() {
                *value /= alpha;
            }
        }
    }
    samples_from_f32(*src.layout(), plane)
}

/// Grow the alpha coverage; colors are untouched.
pub fn alpha_dilate(
    src: &ImageBuffer,
    element: StructuringElement,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    let alpha = alpha_plane(src)?;
    let grown = rank_on_plane(
        &alpha,
        src.width(),
        src.height(),
        1,
        &element,
        edge,
        Extremum::Max,
    );
    with_alpha_plane(src, &grown)
}

/// Shrink the alpha coverage; colors are untouched.
pub fn alpha_erode(
    src: &ImageBuffer,
    element: StructuringElement,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    let alpha = alpha_plane(src)?;
    let shrunk = rank_on_plane(
        &alpha,
        src.width(),
        src.height(),
        1,
        &element,
        edge,
        Extremum::Min,
    );
    with_alpha_plane(src, &shrunk)
}

/// Signed distance field of the alpha coverage boundary.
///
/// Output is single-channel in the source element type: `0.5` on the
/// boundary, larger inside, smaller outside, saturating at a distance of
/// `spread` pixels. Distances use the 3-4 chamfer metric.
pub fn distance_field(src: &ImageBuffer, spread: f32) -> Result<ImageBuffer> {
    require_alpha(src)?;
    if !(spread > 0.0) {
        return Err(Error::invalid_argument("spread", "distance spread must be positive"));
    }
    let alpha = alpha_plane(src)?;
    let (width, height) = (src.width() as usize, src.height() as usize);

    let covered: Vec<bool> = alpha.iter().map(|&a| a >= 0.5).collect();
    let to_covered = chamfer(&covered, width, height, true);
    let to_uncovered = chamfer(&covered, width, height, false);

    let mut out = Vec::with_capacity(width * height);
    for at in 0..width * height {
        // Positive inside, negative outside, in pixel units.
        let signed = if covered[at] {
            to_uncovered[at]
        } else {
            -to_covered[at]
        };
        out.push(0.5 + signed / (2.0 * spread));
    }

    let layout = src
        .layout()
        .with_format(PixelFormat::new(src.format().element, ColorLayout::Gray))
        .ok_or_else(|| Error::exhausted("pixel buffer layout"))?;
    // F32 fields keep their unclamped values; U8 saturates in quantization.
    match src.format().element {
        ElementType::F32 => samples_from_f32(layout, out),
        ElementType::U8 => {
            let bytes = out.iter().map(|&value| u8::from_f32(value)).collect();
            ImageBuffer::from_u8(layout, bytes).ok_or_else(|| Error::exhausted("pixel buffer"))
        }
    }
}

/// Two-pass 3-4 chamfer distance to the `target` coverage state.
///
/// Returns, for every pixel, the distance in pixels to the nearest pixel
/// whose coverage equals `target`; pixels already matching get zero.
fn chamfer(covered: &[bool], width: usize, height: usize, target: bool) -> Vec<f32> {
    const STRAIGHT: f32 = 3.0;
    const DIAGONAL: f32 = 4.0;
    let far = (width + height) as f32 * DIAGONAL;
    let mut field: Vec<f32> = covered
        .iter()
        .map(|&state| if state == target { 0.0 } else { far })
        .collect();

    // Forward pass.
    for y in 0..height {
        for x in 0..width {
            let at = y * width + x;
            let mut best = field[at];
            if x > 0 {
                best = best.min(field[at - 1] + STRAIGHT);
            }
            if y > 0 {
                best = best.min(field[at - width] + STRAIGHT);
                if x > 0 {
                    best = best.min(field[at - width - 1] + DIAGONAL);
                }
                if x + 1 < width {
                    best = best.min(field[at - width + 1] + DIAGONAL);
                }
            }
            field[at] = best;
        }
    }
    // Backward pass.
    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let at = y * width + x;
            let mut best = field[at];
            if x + 1 < width {
                best = best.min(field[at + 1] + STRAIGHT);
            }
            if y + 1 < height {
                best = best.min(field[at + width] + STRAIGHT);
                if x + 1 < width {
                    best = best.min(field[at + width + 1] + DIAGONAL);
                }
                if x > 0 {
                    best = best.min(field[at + width - 1] + DIAGONAL);
                }
            }
            field[at] = best;
        }
    }

    // Normalize chamfer units back to approximate pixels.
    for value in field.iter_mut() {
        *value /= STRAIGHT;
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLayout;

    fn rgba(width: u32, height: u32, values: &[u8]) -> ImageBuffer {
        let layout = BufferLayout::new(width, height, PixelFormat::RGBA_U8).unwrap();
        ImageBuffer::from_u8(layout, values.to_vec()).unwrap()
    }

    #[test]
    fn premultiply_half_alpha() {
        let src = rgba(1, 1, &[200, 100, 0, 128]);
        let out = premultiply(&src).unwrap();
        // 200 * 128/255 rounds to 100.
        assert_eq!(out.as_u8().unwrap(), &[100, 50, 0, 128]);
    }

    #[test]
    fn unpremultiply_leaves_transparent() {
        let src = rgba(1, 1, &[10, 20, 30, 0]);
        let out = unpremultiply(&src).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[10, 20, 30, 0]);
    }

    #[test]
    fn alpha_ops_require_alpha() {
        let layout = BufferLayout::new(1, 1, PixelFormat::RGB_U8).unwrap();
        let rgb = ImageBuffer::from_u8(layout, vec![0, 0, 0]).unwrap();
        assert!(premultiply(&rgb).is_err());
    }

    #[test]
    fn distance_field_boundary_is_mid_gray() {
        // Opaque left column, transparent right.
        let src = rgba(
            2,
            1,
            &[255, 255, 255, 255, 0, 0, 0, 0],
        );
        let out = distance_field(&src, 4.0).unwrap();
        let data = out.as_u8().unwrap();
        assert!(data[0] > 128);
        assert!(data[1] < 128);
    }
}
