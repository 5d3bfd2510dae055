//! Edge detection kernels.
use crate::buffer::{ColorLayout, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::kernel::{blur, edge_constant, resolve_coord, samples_from_f32, samples_to_f32, EdgeMode};

/// A 3×3 convolution of one channel plane, result unquantized.
fn convolve3(
    plane: &[f32],
    width: u32,
    height: u32,
    channels: usize,
    channel: usize,
    taps: &[f32; 9],
    edge: EdgeMode,
) -> Vec<f32> {
    let constant = edge_constant(edge);
    let row_stride = width as usize * channels;
    let mut out = vec![0.0f32; width as usize * height as usize];
    for y in 0..height as usize {
        for x in 0..width as usize {
            let mut acc = 0.0f32;
            for dy in 0..3usize {
                for dx in 0..3usize {
                    let sample = match (
                        resolve_coord(y as i64 + dy as i64 - 1, height, edge),
                        resolve_coord(x as i64 + dx as i64 - 1, width, edge),
                    ) {
                        (Some(sy), Some(sx)) => plane[sy * row_stride + sx * channels + channel],
                        _ => constant,
                    };
                    acc += taps[dy * 3 + dx] * sample;
                }
            }
            out[y * width as usize + x] = acc;
        }
    }
    out
}

const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
const SCHARR_X: [f32; 9] = [-3.0, 0.0, 3.0, -10.0, 0.0, 10.0, -3.0, 0.0, 3.0];
const SCHARR_Y: [f32; 9] = [-3.0, -10.0, -3.0, 0.0, 0.0, 0.0, 3.0, 10.0, 3.0];
const LAPLACIAN: [f32; 9] = [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0];

/// Gradient magnitude with the given x/y taps, scaled by `1 / norm`.
fn gradient_magnitude(
    src: &ImageBuffer,
    taps_x: &[f32; 9],
    taps_y: &[f32; 9],
    norm: f32,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let mut out = vec![0.0f32; plane.len()];
    for channel in 0..channels {
        let gx = convolve3(&plane, width, height, channels, channel, taps_x, edge);
        let gy = convolve3(&plane, width, height, channels, channel, taps_y, edge);
        for (index, (&x, &y)) in gx.iter().zip(gy.iter()).enumerate() {
            out[index * channels + channel] = (x * x + y * y).sqrt() / norm;
        }
    }
    samples_from_f32(*src.layout(), out)
}

/// Sobel gradient magnitude, per channel.
pub fn sobel(src: &ImageBuffer, edge: EdgeMode) -> Result<ImageBuffer> {
    gradient_magnitude(src, &SOBEL_X, &SOBEL_Y, 4.0, edge)
}

/// Scharr gradient magnitude, per channel.
pub fn scharr(src: &ImageBuffer, edge: EdgeMode) -> Result<ImageBuffer> {
    gradient_magnitude(src, &SCHARR_X, &SCHARR_Y, 16.0, edge)
}

/// Absolute 4-neighbor Laplacian, per channel.
pub fn laplacian(src: &ImageBuffer, edge: EdgeMode) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let mut out = vec![0.0f32; plane.len()];
    for channel in 0..channels {
        let lap = convolve3(&plane, width, height, channels, channel, &LAPLACIAN, edge);
        for (index, &value) in lap.iter().enumerate() {
            out[index * channels + channel] = value.abs() / 4.0;
        }
    }
    samples_from_f32(*src.layout(), out)
}

/// Canny edge detection with dual-threshold hysteresis.
///
/// Input must be single-channel. Output is binary in the input's element
/// type: edge pixels saturate, the rest are zero.
pub fn canny(src: &ImageBuffer, sigma: f32, low: f32, high: f32) -> Result<ImageBuffer> {
    if src.format().layout != ColorLayout::Gray {
        return Err(Error::layout_mismatch(
            src.format(),
            &[PixelFormat::GRAY_U8, PixelFormat::GRAY_F32],
        ));
    }
    if !(low >= 0.0) || !(high > low) {
        return Err(Error::invalid_argument(
            "threshold",
            "canny needs 0 <= low < high",
        ));
    }

    let (width, height) = (src.width(), src.height());
    let smoothed = blur::gaussian_blur(src, sigma, EdgeMode::Clamp)?;
    let plane = samples_to_f32(&smoothed);

    let gx = convolve3(&plane, width, height, 1, 0, &SOBEL_X, EdgeMode::Clamp);
    let gy = convolve3(&plane, width, height, 1, 0, &SOBEL_Y, EdgeMode::Clamp);

    let w = width as usize;
    let h = height as usize;
    let mut magnitude = vec![0.0f32; w * h];
    for (slot, (&x, &y)) in magnitude.iter_mut().zip(gx.iter().zip(gy.iter())) {
        *slot = (x * x + y * y).sqrt() / 4.0;
    }

    // Non-maximum suppression along the quantized gradient direction.
    let mut thinned = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let at = y * w + x;
            let mag = magnitude[at];
            if mag == 0.0 {
                continue;
            }
            let (dx, dy) = sector(gx[at], gy[at]);
            let ahead = neighbor(&magnitude, w, h, x as i64 + dx, y as i64 + dy);
            let behind = neighbor(&magnitude, w, h, x as i64 - dx, y as i64 - dy);
            if mag >= ahead && mag >= behind {
                thinned[at] = mag;
            }
        }
    }

    // Hysteresis: strong seeds spread into weak 8-neighbors. The result is
    // the connected set, independent of traversal order.
    let mut state = vec![0u8; w * h]; // 0 none, 1 weak, 2 edge
    let mut stack = Vec::new();
    for (at, &mag) in thinned.iter().enumerate() {
        if mag >= high {
            state[at] = 2;
            stack.push(at);
        } else if mag >= low {
            state[at] = 1;
        }
    }
    while let Some(at) = stack.pop() {
        let x = (at % w) as i64;
        let y = (at / w) as i64;
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let neighbor_at = ny as usize * w + nx as usize;
                if state[neighbor_at] == 1 {
                    state[neighbor_at] = 2;
                    stack.push(neighbor_at);
                }
            }
        }
    }

    let out = state
        .iter()
        .map(|&s| if s == 2 { 1.0 } else { 0.0 })
        .collect();
    samples_from_f32(*src.layout(), out)
}

/// Step offsets of one of the four gradient sectors.
fn sector(gx: f32, gy: f32) -> (i64, i64) {
    // Angle folded into [0, 180) degrees.
    let angle = gy.atan2(gx).to_degrees();
    let angle = if angle < 0.0 { angle + 180.0 } else { angle };
    if !(22.5f32..157.5f32).contains(&angle) {
        (1, 0)
    } else if angle < 67.5 {
        (1, 1)
    } else if angle < 112.5 {
        (0, 1)
    } else {
        (-1, 1)
    }
}

fn neighbor(plane: &[f32], w: usize, h: usize, x: i64, y: i64) -> f32 {
    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
        0.0
    } else {
        plane[y as usize * w + x as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLayout;

    fn gray(width: u32, height: u32, values: &[u8]) -> ImageBuffer {
        let layout = BufferLayout::new(width, height, PixelFormat::GRAY_U8).unwrap();
        ImageBuffer::from_u8(layout, values.to_vec()).unwrap()
    }

    #[test]
    fn sobel_flat_is_zero() {
        let out = sobel(&gray(4, 4, &[128; 16]), EdgeMode::Clamp).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[0; 16]);
    }

    #[test]
    fn sobel_vertical_step() {
        // Left half black, right half white: strong response at the seam.
        let mut values = [0u8; 16];
        for y in 0..4 {
            values[y * 4 + 2] = 255;
            values[y * 4 + 3] = 255;
        }
        let out = sobel(&gray(4, 4, &values), EdgeMode::Clamp).unwrap();
        let data = out.as_u8().unwrap();
        assert!(data[5] > 200);
        assert_eq!(data[0], 0);
    }

    #[test]
    fn canny_requires_gray() {
        let layout = BufferLayout::new(2, 2, PixelFormat::RGB_U8).unwrap();
        let rgb = ImageBuffer::from_u8(layout, vec![0; 12]).unwrap();
        let err = canny(&rgb, 1.0, 0.1, 0.3).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::LayoutMismatch);
        assert!(canny(&gray(2, 2, &[0; 4]), 1.0, 0.5, 0.2).is_err());
    }
}
