//! Geometric transforms: resampling, rotation, cropping, distortion.
use crate::buffer::{BufferLayout, ColorLayout, ImageBuffer};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::geometry::Rectangle;
use crate::kernel::convert::{LUMA_B, LUMA_G, LUMA_R};
use crate::kernel::{samples_from_f32, samples_to_f32};

/// Resampling strategy for [`resize`] and the general transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic => "bicubic",
            Interpolation::Lanczos3 => "lanczos3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "nearest" => Interpolation::Nearest,
            "bilinear" => Interpolation::Bilinear,
            "bicubic" => Interpolation::Bicubic,
            "lanczos3" | "lanczos" => Interpolation::Lanczos3,
            _ => return None,
        })
    }
}

/// Exact quarter-turn rotations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quarter {
    Quarter90,
    Quarter180,
    Quarter270,
}

/// Mirror axis for [`flip`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
    Both,
}

impl FlipAxis {
    pub fn name(self) -> &'static str {
        match self {
            FlipAxis::Horizontal => "horizontal",
            FlipAxis::Vertical => "vertical",
            FlipAxis::Both => "both",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "horizontal" => FlipAxis::Horizontal,
            "vertical" => FlipAxis::Vertical,
            "both" => FlipAxis::Both,
            _ => return None,
        })
    }
}

/// Brown-Conrady distortion coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LensCoefficients {
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
    pub p1: f32,
    pub p2: f32,
}

struct Plane {
    data: Vec<f32>,
    width: u32,
    height: u32,
    channels: usize,
}

impl Plane {
    fn of(src: &ImageBuffer) -> Self {
        Plane {
            data: samples_to_f32(src),
            width: src.width(),
            height: src.height(),
            channels: src.channels(),
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data[(y * self.width as usize + x) * self.channels + channel]
    }

    #[inline]
    fn at_clamped(&self, x: i64, y: i64, channel: usize) -> f32 {
        let x = x.max(0).min(i64::from(self.width) - 1) as usize;
        let y = y.max(0).min(i64::from(self.height) - 1) as usize;
        self.at(x, y, channel)
    }

    /// Sample with the given filter at a fractional position; positions
    /// outside the image clamp to the border.
    fn sample(&self, x: f32, y: f32, channel: usize, interpolation: Interpolation) -> f32 {
        match interpolation {
            Interpolation::Nearest => {
                self.at_clamped((x + 0.5).floor() as i64, (y + 0.5).floor() as i64, channel)
            }
            Interpolation::Bilinear => {
                let x0 = x.floor();
                let y0 = y.floor();
                let fx = x - x0;
                let fy = y - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let v00 = self.at_clamped(x0, y0, channel);
                let v10 = self.at_clamped(x0 + 1, y0, channel);
                let v01 = self.at_clamped(x0, y0 + 1, channel);
                let v11 = self.at_clamped(x0 + 1, y0 + 1, channel);
                let top = v00 + (v10 - v00) * fx;
                let bottom = v01 + (v11 - v01) * fx;
                top + (bottom - top) * fy
            }
            Interpolation::Bicubic => self.kernel_sample(x, y, channel, 2, catmull_rom),
            Interpolation::Lanczos3 => self.kernel_sample(x, y, channel, 3, lanczos3),
        }
    }

    fn kernel_sample(
        &self,
        x: f32,
        y: f32,
        channel: usize,
        radius: i64,
        weight: fn(f32) -> f32,
    ) -> f32 {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let mut acc = 0.0f32;
        let mut norm = 0.0f32;
        for dy in (1 - radius)..=radius {
            let wy = weight(y - (y0 + dy) as f32);
            if wy == 0.0 {
                continue;
            }
            for dx in (1 - radius)..=radius {
                let wx = weight(x - (x0 + dx) as f32);
                if wx == 0.0 {
                    continue;
                }
                acc += wx * wy * self.at_clamped(x0 + dx, y0 + dy, channel);
                norm += wx * wy;
            }
        }
        if norm == 0.0 {
            self.at_clamped(x0, y0, channel)
        } else {
            acc / norm
        }
    }
}

/// Catmull-Rom cubic (`a = -0.5`).
fn catmull_rom(t: f32) -> f32 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}

/// Lanczos windowed sinc with `a = 3`.
fn lanczos3(t: f32) -> f32 {
    let t = t.abs();
    if t < 1e-6 {
        1.0
    } else if t < 3.0 {
        let pi_t = core::f32::consts::PI * t;
        3.0 * (pi_t.sin() * (pi_t / 3.0).sin()) / (pi_t * pi_t)
    } else {
        0.0
    }
}

fn sized_layout(src: &ImageBuffer, width: u32, height: u32) -> Result<BufferLayout> {
    BufferLayout::new(width, height, src.format())
        .ok_or_else(|| Error::exhausted("pixel buffer layout"))
}

/// Resample to `width × height`.
///
/// Nearest uses the corner-aligned mapping `src_x = floor(x · sw / dw)`;
/// the smooth filters map pixel centers.
pub fn resize(
    src: &ImageBuffer,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> Result<ImageBuffer> {
    if width == 0 || height == 0 {
        return Err(Error::invalid_argument("size", "resize target must be non-empty"));
    }
    let plane = Plane::of(src);
    let layout = sized_layout(src, width, height)?;
    let mut out = vec![0.0f32; layout.sample_len()];
    let channels = plane.channels;

    let scale_x = plane.width as f32 / width as f32;
    let scale_y = plane.height as f32 / height as f32;

    for y in 0..height as usize {
        for x in 0..width as usize {
            for channel in 0..channels {
                let value = match interpolation {
                    Interpolation::Nearest => {
                        let sx = ((x as f32 * scale_x) as i64).min(i64::from(plane.width) - 1);
                        let sy = ((y as f32 * scale_y) as i64).min(i64::from(plane.height) - 1);
                        plane.at_clamped(sx, sy, channel)
                    }
                    _ => {
                        let sx = (x as f32 + 0.5) * scale_x - 0.5;
                        let sy = (y as f32 + 0.5) * scale_y - 0.5;
                        plane.sample(sx, sy, channel, interpolation)
                    }
                };
                out[(y * width as usize + x) * channels + channel] = value;
            }
        }
    }
    samples_from_f32(layout, out)
}

/// Exact rotation by a multiple of 90 degrees, clockwise.
pub fn rotate90(src: &ImageBuffer, quarter: Quarter) -> Result<ImageBuffer> {
    let plane = Plane::of(src);
    let (width, height) = (plane.width, plane.height);
    let (out_width, out_height) = match quarter {
        Quarter::Quarter180 => (width, height),
        Quarter::Quarter90 | Quarter::Quarter270 => (height, width),
    };
    let layout = sized_layout(src, out_width, out_height)?;
    let channels = plane.channels;
    let mut out = vec![0.0f32; layout.sample_len()];

    for y in 0..out_height as usize {
        for x in 0..out_width as usize {
            let (sx, sy) = match quarter {
                Quarter::Quarter90 => (y, out_width as usize - 1 - x),
                Quarter::Quarter180 => (width as usize - 1 - x, height as usize - 1 - y),
                Quarter::Quarter270 => (out_height as usize - 1 - y, x),
            };
            for channel in 0..channels {
                out[(y * out_width as usize + x) * channels + channel] = plane.at(sx, sy, channel);
            }
        }
    }
    samples_from_f32(layout, out)
}

/// The fill samples of a color in the buffer's own channel order.
pub(crate) fn fill_samples(layout: ColorLayout, color: Color) -> [f32; 4] {
    let [r, g, b, a] = color.to_f32();
    match layout {
        ColorLayout::Rgb => [r, g, b, 0.0],
        ColorLayout::Rgba => [r, g, b, a],
        ColorLayout::Bgr => [b, g, r, 0.0],
        ColorLayout::Bgra => [b, g, r, a],
        ColorLayout::Gray => [LUMA_R * r + LUMA_G * g + LUMA_B * b, 0.0, 0.0, 0.0],
        ColorLayout::Hsv => {
            let (h, s, v) = crate::kernel::convert::rgb_to_hsv(r, g, b);
            [h, s, v, 0.0]
        }
    }
}

/// Rotate by an arbitrary angle (degrees, clockwise) about the image
/// center; samples falling outside are filled with `fill`.
pub fn rotate(
    src: &ImageBuffer,
    degrees: f32,
    interpolation: Interpolation,
    fill: Color,
) -> Result<ImageBuffer> {
    // The quarter turns stay on the exact path.
    let quarters = degrees / 90.0;
    if quarters.fract() == 0.0 {
        return match (quarters as i64).rem_euclid(4) {
            0 => Ok(src.clone()),
            1 => rotate90(src, Quarter::Quarter90),
            2 => rotate90(src, Quarter::Quarter180),
            _ => rotate90(src, Quarter::Quarter270),
        };
    }

    let plane = Plane::of(src);
    let layout = *src.layout();
    let channels = plane.channels;
    let fill = fill_samples(layout.color(), fill);
    let mut out = vec![0.0f32; layout.sample_len()];

    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin(), radians.cos());
    let cx = (plane.width as f32 - 1.0) / 2.0;
    let cy = (plane.height as f32 - 1.0) / 2.0;

    for y in 0..plane.height as usize {
        for x in 0..plane.width as usize {
            // Inverse mapping: rotate the destination offset backwards.
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;
            let inside = sx >= -0.5
                && sy >= -0.5
                && sx < plane.width as f32 - 0.5
                && sy < plane.height as f32 - 0.5;
            for channel in 0..channels {
                let value = if inside {
                    plane.sample(sx, sy, channel, interpolation)
                } else {
                    fill[channel]
                };
                out[(y * plane.width as usize + x) * channels + channel] = value;
            }
        }
    }
    samples_from_f32(layout, out)
}

/// Mirror the image.
pub fn flip(src: &ImageBuffer, axis: FlipAxis) -> Result<ImageBuffer> {
    let plane = Plane::of(src);
    let (width, height, channels) = (plane.width as usize, plane.height as usize, plane.channels);
    let mut out = vec![0.0f32; plane.data.len()];
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = match axis {
                FlipAxis::Horizontal => (width - 1 - x, y),
                FlipAxis::Vertical => (x, height - 1 - y),
                FlipAxis::Both => (width - 1 - x, height - 1 - y),
            };
            for channel in 0..channels {
                out[(y * width + x) * channels + channel] = plane.at(sx, sy, channel);
            }
        }
    }
    samples_from_f32(*src.layout(), out)
}

/// Copy out a rectangle. The rectangle is clipped to the image and must not
/// end up empty.
pub fn crop(src: &ImageBuffer, rect: Rectangle) -> Result<ImageBuffer> {
    let clipped = rect.normalize().meet(Rectangle::with_layout(src.layout()));
    if clipped.is_empty() {
        return Err(Error::invalid_argument("rect", "crop rectangle is empty"));
    }
    let plane = Plane::of(src);
    let channels = plane.channels;
    let layout = sized_layout(src, clipped.width(), clipped.height())?;
    let mut out = Vec::with_capacity(layout.sample_len());
    for y in clipped.y..clipped.max_y {
        for x in clipped.x..clipped.max_x {
            for channel in 0..channels {
                out.push(plane.at(x as usize, y as usize, channel));
            }
        }
    }
    samples_from_f32(layout, out)
}

/// Crop a centered `width × height` window.
pub fn center_crop(src: &ImageBuffer, width: u32, height: u32) -> Result<ImageBuffer> {
    let full = Rectangle::with_layout(src.layout());
    let x = src.width().saturating_sub(width) / 2;
    let y = src.height().saturating_sub(height) / 2;
    let window = Rectangle {
        x,
        y,
        max_x: x.saturating_add(width),
        max_y: y.saturating_add(height),
    };
    if window.is_empty() || !full.contains(window) {
        return Err(Error::invalid_argument(
            "size",
            "center crop must be non-empty and within the image",
        ));
    }
    crop(src, window)
}

/// Brown-Conrady radial/tangential distortion.
///
/// With `invert = false` the output pixel at `p` samples the source at the
/// distorted position of `p`; with `invert = true` the model is inverted
/// numerically (fixed-point iteration), undoing a distortion.
pub fn lens_distortion(
    src: &ImageBuffer,
    coefficients: LensCoefficients,
    invert: bool,
    interpolation: Interpolation,
    fill: Color,
) -> Result<ImageBuffer> {
    let plane = Plane::of(src);
    let layout = *src.layout();
    let channels = plane.channels;
    let fill = fill_samples(layout.color(), fill);
    let mut out = vec![0.0f32; layout.sample_len()];

    let cx = (plane.width as f32 - 1.0) / 2.0;
    let cy = (plane.height as f32 - 1.0) / 2.0;
    let focal = cx.max(cy).max(1.0);

    let distort = |x: f32, y: f32| -> (f32, f32) {
        let r2 = x * x + y * y;
        let radial = 1.0
            + coefficients.k1 * r2
            + coefficients.k2 * r2 * r2
            + coefficients.k3 * r2 * r2 * r2;
        let dx = 2.0 * coefficients.p1 * x * y + coefficients.p2 * (r2 + 2.0 * x * x);
        let dy = coefficients.p1 * (r2 + 2.0 * y * y) + 2.0 * coefficients.p2 * x * y;
        (x * radial + dx, y * radial + dy)
    };

    for y in 0..plane.height as usize {
        for x in 0..plane.width as usize {
            let nx = (x as f32 - cx) / focal;
            let ny = (y as f32 - cy) / focal;
            let (mx, my) = if !invert {
                distort(nx, ny)
            } else {
                // Fixed-point inversion; eight rounds are plenty for the
                // coefficient magnitudes cameras produce.
                let mut ux = nx;
                let mut uy = ny;
                for _ in 0..8 {
                    let (dx, dy) = distort(ux, uy);
                    ux -= dx - nx;
                    uy -= dy - ny;
                }
                (ux, uy)
            };
            let sx = mx * focal + cx;
            let sy = my * focal + cy;
            let inside = sx >= -0.5
                && sy >= -0.5
                && sx < plane.width as f32 - 0.5
                && sy < plane.height as f32 - 0.5;
            for channel in 0..channels {
                let value = if inside {
                    plane.sample(sx, sy, channel, interpolation)
                } else {
                    fill[channel]
                };
                out[(y * plane.width as usize + x) * channels + channel] = value;
            }
        }
    }
    samples_from_f32(layout, out)
}

/// Perspective warp defined by four source/destination point pairs.
///
/// The output has the source dimensions; destination pixels outside the
/// warped quad are filled.
pub fn perspective(
    src: &ImageBuffer,
    from: &[(f32, f32); 4],
    to: &[(f32, f32); 4],
    interpolation: Interpolation,
    fill: Color,
) -> Result<ImageBuffer> {
    // Solve for the homography mapping destination to source, so each
    // output pixel pulls from one source position.
    let matrix = homography(to, from)
        .ok_or_else(|| Error::invalid_argument("points", "degenerate perspective points"))?;

    let plane = Plane::of(src);
    let layout = *src.layout();
    let channels = plane.channels;
    let fill = fill_samples(layout.color(), fill);
    let mut out = vec![0.0f32; layout.sample_len()];

    for y in 0..plane.height as usize {
        for x in 0..plane.width as usize {
            let denominator = matrix[6] * x as f32 + matrix[7] * y as f32 + matrix[8];
            let (sx, sy) = if denominator.abs() < 1e-12 {
                (-1.0, -1.0)
            } else {
                (
                    (matrix[0] * x as f32 + matrix[1] * y as f32 + matrix[2]) / denominator,
                    (matrix[3] * x as f32 + matrix[4] * y as f32 + matrix[5]) / denominator,
                )
            };
            let inside = sx >= -0.5
                && sy >= -0.5
                && sx < plane.width as f32 - 0.5
                && sy < plane.height as f32 - 0.5;
            for channel in 0..channels {
                let value = if inside {
                    plane.sample(sx, sy, channel, interpolation)
                } else {
                    fill[channel]
                };
                out[(y * plane.width as usize + x) * channels + channel] = value;
            }
        }
    }
    samples_from_f32(layout, out)
}

/// Direct linear transform for the 3×3 homography with `h22 = 1`.
fn homography(from: &[(f32, f32); 4], to: &[(f32, f32); 4]) -> Option<[f32; 9]> {
    // Eight equations in eight unknowns.
    let mut system = [[0.0f32; 9]; 8];
    for (row, (&(fx, fy), &(tx, ty))) in from.iter().zip(to.iter()).enumerate() {
        system[2 * row] = [fx, fy, 1.0, 0.0, 0.0, 0.0, -fx * tx, -fy * tx, tx];
        system[2 * row + 1] = [0.0, 0.0, 0.0, fx, fy, 1.0, -fx * ty, -fy * ty, ty];
    }

    // Gaussian elimination with partial pivoting.
    for column in 0..8 {
        let pivot = (column..8).max_by(|&a, &b| {
            system[a][column]
                .abs()
                .partial_cmp(&system[b][column].abs())
                .unwrap_or(core::cmp::Ordering::Equal)
        })?;
        if system[pivot][column].abs() < 1e-9 {
            return None;
        }
        system.swap(column, pivot);
        let lead = system[column][column];
        for entry in system[column].iter_mut() {
            *entry /= lead;
        }
        for row in 0..8 {
            if row == column {
                continue;
            }
            let factor = system[row][column];
            if factor == 0.0 {
                continue;
            }
            for entry in 0..9 {
                system[row][entry] -= factor * system[column][entry];
            }
        }
    }

    Some([
        system[0][8],
        system[1][8],
        system[2][8],
        system[3][8],
        system[4][8],
        system[5][8],
        system[6][8],
        system[7][8],
        1.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferLayout, PixelFormat};

    fn rgb(width: u32, height: u32, values: &[u8]) -> ImageBuffer {
        let layout = BufferLayout::new(width, height, PixelFormat::RGB_U8).unwrap();
        ImageBuffer::from_u8(layout, values.to_vec()).unwrap()
    }

    #[test]
    fn nearest_downscale_takes_top_left() {
        let src = rgb(
            2,
            2,
            &[255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
        );
        let out = resize(&src, 1, 1, Interpolation::Nearest).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[255, 0, 0]);
    }

    #[test]
    fn quarter_turns_compose() {
        let src = rgb(2, 3, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17]);
        let once = rotate90(&src, Quarter::Quarter90).unwrap();
        assert_eq!(once.width(), 3);
        assert_eq!(once.height(), 2);
        let twice = rotate90(&rotate90(&src, Quarter::Quarter180).unwrap(), Quarter::Quarter180)
            .unwrap();
        assert_eq!(twice.as_u8(), src.as_u8());
        let full = rotate90(
            &rotate90(&once, Quarter::Quarter90).unwrap(),
            Quarter::Quarter180,
        )
        .unwrap();
        assert_eq!(full.as_u8(), src.as_u8());
    }

    #[test]
    fn flip_round_trips() {
        let src = rgb(2, 2, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        for axis in [FlipAxis::Horizontal, FlipAxis::Vertical, FlipAxis::Both].iter() {
            let twice = flip(&flip(&src, *axis).unwrap(), *axis).unwrap();
            assert_eq!(twice.as_u8(), src.as_u8());
        }
    }

    #[test]
    fn crop_clips_to_image() {
        let src = rgb(4, 4, &[7; 48]);
        let out = crop(
            &src,
            Rectangle {
                x: 2,
                y: 2,
                max_x: 10,
                max_y: 10,
            },
        )
        .unwrap();
        assert_eq!(out.layout().size(), (2, 2));
        assert!(crop(
            &src,
            Rectangle {
                x: 8,
                y: 8,
                max_x: 9,
                max_y: 9
            }
        )
        .is_err());
    }

    #[test]
    fn identity_perspective() {
        let src = rgb(3, 3, &[
            10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30,
            31, 32, 33, 34, 35, 36,
        ]);
        let corners = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        let out = perspective(&src, &corners, &corners, Interpolation::Bilinear, Color::BLACK)
            .unwrap();
        assert_eq!(out.as_u8(), src.as_u8());
    }

    #[test]
    fn zero_lens_coefficients_are_identity() {
        let src = rgb(3, 3, &[50; 27]);
        let out = lens_distortion(
            &src,
            LensCoefficients::default(),
            false,
            Interpolation::Bilinear,
            Color::BLACK,
        )
        .unwrap();
        assert_eq!(out.as_u8(), src.as_u8());
    }
}
