//! Neighborhood blurs.
//!
//! All variants run on a shared `f32` plane; intermediate passes are never
//! quantized, so the `U8` kernels equal their `F32` round trip exactly up to
//! the single final quantization.
use crate::buffer::ImageBuffer;
use crate::error::{Error, Result};
use crate::kernel::{edge_constant, resolve_coord, samples_from_f32, samples_to_f32, EdgeMode};

/// Uniform box blur with a `2·radius + 1` window per axis.
pub fn box_blur(src: &ImageBuffer, radius: u32, edge: EdgeMode) -> Result<ImageBuffer> {
    if radius == 0 {
        return Err(Error::invalid_argument("radius", "box blur radius must be at least 1"));
    }
    let taps = 2 * radius as usize + 1;
    let weights = vec![1.0 / taps as f32; taps];
    separable(src, &weights, edge)
}

/// Separable Gaussian blur.
///
/// The kernel is sampled symmetrically at integer offsets with
/// `radius = ceil(3·sigma)` and normalized to sum one.
pub fn gaussian_blur(src: &ImageBuffer, sigma: f32, edge: EdgeMode) -> Result<ImageBuffer> {
    let weights = gaussian_weights(sigma)?;
    separable(src, &weights, edge)
}

/// The symmetric tap weights for `sigma`, length `2·ceil(3·sigma) + 1`.
pub(crate) fn gaussian_weights(sigma: f32) -> Result<Vec<f32>> {
    if !(sigma > 0.0) || !sigma.is_finite() {
        return Err(Error::invalid_argument("sigma", "blur sigma must be positive"));
    }
    let radius = (3.0 * sigma).ceil() as i64;
    let denom = 2.0 * sigma * sigma;
    let mut weights = Vec::with_capacity(2 * radius as usize + 1);
    let mut sum = 0.0f32;
    for tap in -radius..=radius {
        let weight = (-(tap as f32 * tap as f32) / denom).exp();
        weights.push(weight);
        sum += weight;
    }
    for weight in &mut weights {
        *weight /= sum;
    }
    Ok(weights)
}

/// One horizontal and one vertical pass with the same odd-length weights.
fn separable(src: &ImageBuffer, weights: &[f32], edge: EdgeMode) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let blurred = separable_on_plane(
        &plane,
        src.width(),
        src.height(),
        src.channels(),
        weights,
        edge,
    );
    samples_from_f32(*src.layout(), blurred)
}

/// The shared separable convolution body, on a raw interleaved plane.
pub(crate) fn separable_on_plane(
    plane: &[f32],
    width: u32,
    height: u32,
    channels: usize,
    weights: &[f32],
    edge: EdgeMode,
) -> Vec<f32> {
    debug_assert!(weights.len() % 2 == 1);
    let radius = (weights.len() / 2) as i64;
    let constant = edge_constant(edge);
    let row_stride = width as usize * channels;

    let horizontal = |input: &[f32]| {
        let mut out = vec![0.0f32; input.len()];
        for y in 0..height as usize {
            let row = &input[y * row_stride..][..row_stride];
            let out_row = &mut out[y * row_stride..][..row_stride];
            for x in 0..width as usize {
                for channel in 0..channels {
                    let mut acc = 0.0f32;
                    for (tap, &weight) in weights.iter().enumerate() {
                        let sample_x = x as i64 + tap as i64 - radius;
                        let sample = match resolve_coord(sample_x, width, edge) {
                            Some(sx) => row[sx * channels + channel],
                            None => constant,
                        };
                        acc += weight * sample;
                    }
                    out_row[x * channels + channel] = acc;
                }
            }
        }
        out
    };

    let vertical = |input: &[f32]| {
        let mut out = vec![0.0f32; input.len()];
        for y in 0..height as usize {
            for x in 0..width as usize {
                for channel in 0..channels {
                    let mut acc = 0.0f32;
                    for (tap, &weight) in weights.iter().enumerate() {
                        let sample_y = y as i64 + tap as i64 - radius;
                        let sample = match resolve_coord(sample_y, height, edge) {
                            Some(sy) => input[sy * row_stride + x * channels + channel],
                            None => constant,
                        };
                        acc += weight * sample;
                    }
                    out[y * row_stride + x * channels + channel] = acc;
                }
            }
        }
        out
    };

    vertical(&horizontal(plane))
}

/// Median of an odd `size × size` window, per channel.
pub fn median_blur(src: &ImageBuffer, size: u32, edge: EdgeMode) -> Result<ImageBuffer> {
    if size < 3 || size % 2 == 0 {
        return Err(Error::invalid_argument("size", "median window must be odd and at least 3"));
    }
    let radius = (size / 2) as i64;
    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let row_stride = width as usize * channels;
    let constant = edge_constant(edge);

    let mut out = vec![0.0f32; plane.len()];
    let mut window = Vec::with_capacity((size as usize) * (size as usize));
    for y in 0..height as usize {
        for x in 0..width as usize {
            for channel in 0..channels {
                window.clear();
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let sample = match (
                            resolve_coord(y as i64 + dy, height, edge),
                            resolve_coord(x as i64 + dx, width, edge),
                        ) {
                            (Some(sy), Some(sx)) => plane[sy * row_stride + sx * channels + channel],
                            _ => constant,
                        };
                        window.push(sample);
                    }
                }
                // Total order over the raw float bits keeps the sort
                // deterministic even with equal keys.
                window.sort_unstable_by(|a, b| total_order(*a).cmp(&total_order(*b)));
                out[y * row_stride + x * channels + channel] = window[window.len() / 2];
            }
        }
    }
    samples_from_f32(*src.layout(), out)
}

#[inline]
fn total_order(value: f32) -> i32 {
    let bits = value.to_bits() as i32;
    bits ^ (((bits >> 31) as u32) >> 1) as i32
}

/// Edge-preserving bilateral filter.
///
/// `spatial_sigma` controls the window (`radius = ceil(2·spatial_sigma)`),
/// `range_sigma` the tolerance in sample space.
pub fn bilateral(
    src: &ImageBuffer,
    spatial_sigma: f32,
    range_sigma: f32,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    if !(spatial_sigma > 0.0) || !(range_sigma > 0.0) {
        return Err(Error::invalid_argument(
            "sigma",
            "bilateral sigmas must be positive",
        ));
    }
    let radius = (2.0 * spatial_sigma).ceil() as i64;
    let spatial_denom = 2.0 * spatial_sigma * spatial_sigma;
    let range_denom = 2.0 * range_sigma * range_sigma;

    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let row_stride = width as usize * channels;
    let constant = edge_constant(edge);

    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height as usize {
        for x in 0..width as usize {
            for channel in 0..channels {
                let center = plane[y * row_stride + x * channels + channel];
                let mut acc = 0.0f32;
                let mut norm = 0.0f32;
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let sample = match (
                            resolve_coord(y as i64 + dy, height, edge),
                            resolve_coord(x as i64 + dx, width, edge),
                        ) {
                            (Some(sy), Some(sx)) => plane[sy * row_stride + sx * channels + channel],
                            _ => constant,
                        };
                        let spatial = -((dx * dx + dy * dy) as f32) / spatial_denom;
                        let range = -((sample - center) * (sample - center)) / range_denom;
                        let weight = (spatial + range).exp();
                        acc += weight * sample;
                        norm += weight;
                    }
                }
                out[y * row_stride + x * channels + channel] = acc / norm;
            }
        }
    }
    samples_from_f32(*src.layout(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferLayout, PixelFormat};

    fn gray(width: u32, height: u32, values: &[u8]) -> ImageBuffer {
        let layout = BufferLayout::new(width, height, PixelFormat::GRAY_U8).unwrap();
        ImageBuffer::from_u8(layout, values.to_vec()).unwrap()
    }

    #[test]
    fn gaussian_weights_shape() {
        let weights = gaussian_weights(1.5).unwrap();
        // radius = ceil(4.5) = 5 -> 11 taps.
        assert_eq!(weights.len(), 11);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(weights[0], weights[10]);
        assert!(gaussian_weights(0.0).is_err());
    }

    #[test]
    fn box_blur_flat_is_identity() {
        let src = gray(4, 4, &[100; 16]);
        let out = box_blur(&src, 1, EdgeMode::Clamp).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[100; 16]);
    }

    #[test]
    fn median_rejects_even_window() {
        let src = gray(4, 4, &[0; 16]);
        assert!(median_blur(&src, 4, EdgeMode::Clamp).is_err());
        assert!(median_blur(&src, 1, EdgeMode::Clamp).is_err());
    }

    #[test]
    fn median_removes_single_outlier() {
        let mut values = [10u8; 9];
        values[4] = 250;
        let out = median_blur(&gray(3, 3, &values), 3, EdgeMode::Clamp).unwrap();
        assert_eq!(out.as_u8().unwrap()[4], 10);
    }
}
