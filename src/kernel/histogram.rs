//! Histogram equalization and locally adaptive thresholding.
//!
//! All operators work on single-channel input. Histograms are built over
//! 256 bins in both element types; the `F32` variant bins through the same
//! quantization as the `U8` variant, which keeps the pair consistent.
use crate::buffer::{ColorLayout, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::kernel::{blur, resolve_coord, samples_from_f32, samples_to_f32, EdgeMode, Sample};

fn require_gray(src: &ImageBuffer) -> Result<()> {
    if src.format().layout != ColorLayout::Gray {
        return Err(Error::layout_mismatch(
            src.format(),
            &[PixelFormat::GRAY_U8, PixelFormat::GRAY_F32],
        ));
    }
    Ok(())
}

#[inline]
fn bin_of(value: f32) -> usize {
    usize::from(u8::from_f32(value))
}

/// The equalization map of one histogram: bin -> normalized output.
fn equalization_map(histogram: &[u32; 256], total: u32) -> [f32; 256] {
    let mut map = [0.0f32; 256];
    if total == 0 {
        return map;
    }
    let mut cumulative = 0u32;
    let mut first_nonzero = None;
    for (bin, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if first_nonzero.is_none() && count > 0 {
            first_nonzero = Some(cumulative);
        }
        map[bin] = cumulative as f32;
    }
    let low = first_nonzero.unwrap_or(0) as f32;
    let span = total as f32 - low;
    for entry in map.iter_mut() {
        *entry = if span > 0.0 {
            ((*entry - low) / span).max(0.0)
        } else {
            // Flat image: everything maps to full scale.
            1.0
        };
    }
    map
}

/// Global histogram equalization of a gray image.
pub fn equalize(src: &ImageBuffer) -> Result<ImageBuffer> {
    require_gray(src)?;
    let plane = samples_to_f32(src);
    let mut histogram = [0u32; 256];
    for &value in &plane {
        histogram[bin_of(value)] += 1;
    }
    let map = equalization_map(&histogram, plane.len() as u32);
    let out = plane.iter().map(|&value| map[bin_of(value)]).collect();
    samples_from_f32(*src.layout(), out)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is divided into `grid_x × grid_y` tiles; each tile's histogram
/// is clipped at `clip_limit` times the uniform bin height before
/// equalization, and pixels interpolate bilinearly between the maps of the
/// four surrounding tile centers.
pub fn clahe(src: &ImageBuffer, grid_x: u32, grid_y: u32, clip_limit: f32) -> Result<ImageBuffer> {
    require_gray(src)?;
    if grid_x == 0 || grid_y == 0 {
        return Err(Error::invalid_argument("grid", "clahe grid must be at least 1x1"));
    }
    if !(clip_limit >= 1.0) {
        return Err(Error::invalid_argument(
            "clip_limit",
            "clahe clip limit must be at least 1",
        ));
    }
    let (width, height) = (src.width() as usize, src.height() as usize);
    if width < grid_x as usize || height < grid_y as usize {
        return Err(Error::shape_mismatch(
            "clahe grid",
            (src.width(), src.height()),
            (grid_x, grid_y),
        ));
    }
    let plane = samples_to_f32(src);
    let tiles_x = grid_x as usize;
    let tiles_y = grid_y as usize;

    // One clipped equalization map per tile.
    let mut maps = vec![[0.0f32; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * width / tiles_x;
            let x1 = (tx + 1) * width / tiles_x;
            let y0 = ty * height / tiles_y;
            let y1 = (ty + 1) * height / tiles_y;

            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[bin_of(plane[y * width + x])] += 1;
                }
            }
            let total = ((x1 - x0) * (y1 - y0)) as u32;

            // Clip and redistribute the excess uniformly.
            let ceiling = ((clip_limit * total as f32 / 256.0).floor() as u32).max(1);
            let mut excess = 0u32;
            for count in histogram.iter_mut() {
                if *count > ceiling {
                    excess += *count - ceiling;
                    *count = ceiling;
                }
            }
            let bonus = excess / 256;
            let mut remainder = excess % 256;
            for count in histogram.iter_mut() {
                *count += bonus;
                if remainder > 0 {
                    *count += 1;
                    remainder -= 1;
                }
            }

            maps[ty * tiles_x + tx] = equalization_map(&histogram, total);
        }
    }

    // Tile centers for the interpolation lattice.
    let center = |tile: usize, tiles: usize, extent: usize| -> f32 {
        let lo = tile * extent / tiles;
        let hi = (tile + 1) * extent / tiles;
        (lo + hi) as f32 / 2.0 - 0.5
    };

    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height {
        // Vertical neighbors and weight, clamped at the border rows.
        let fy = y as f32;
        let mut ty0 = 0usize;
        while ty0 + 1 < tiles_y && center(ty0 + 1, tiles_y, height) <= fy {
            ty0 += 1;
        }
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let cy0 = center(ty0, tiles_y, height);
        let cy1 = center(ty1, tiles_y, height);
        let wy = if cy1 > cy0 {
            ((fy - cy0) / (cy1 - cy0)).max(0.0).min(1.0)
        } else {
            0.0
        };

        for x in 0..width {
            let fx = x as f32;
            let mut tx0 = 0usize;
            while tx0 + 1 < tiles_x && center(tx0 + 1, tiles_x, width) <= fx {
                tx0 += 1;
            }
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let cx0 = center(tx0, tiles_x, width);
            let cx1 = center(tx1, tiles_x, width);
            let wx = if cx1 > cx0 {
                ((fx - cx0) / (cx1 - cx0)).max(0.0).min(1.0)
            } else {
                0.0
            };

            let bin = bin_of(plane[y * width + x]);
            let top = maps[ty0 * tiles_x + tx0][bin] * (1.0 - wx) + maps[ty0 * tiles_x + tx1][bin] * wx;
            let bottom =
                maps[ty1 * tiles_x + tx0][bin] * (1.0 - wx) + maps[ty1 * tiles_x + tx1][bin] * wx;
            out[y * width + x] = top * (1.0 - wy) + bottom * wy;
        }
    }
    samples_from_f32(*src.layout(), out)
}

/// The local statistic used by [`adaptive_threshold`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdaptiveMethod {
    /// Plain window mean.
    Mean,
    /// Gaussian-weighted window mean with `sigma = window / 6`.
    Gaussian,
}

impl AdaptiveMethod {
    pub fn name(self) -> &'static str {
        match self {
            AdaptiveMethod::Mean => "mean",
            AdaptiveMethod::Gaussian => "gaussian",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "mean" => AdaptiveMethod::Mean,
            "gaussian" => AdaptiveMethod::Gaussian,
            _ => return None,
        })
    }
}

/// Threshold each pixel against its local neighborhood statistic minus a
/// constant `offset` (normalized units).
pub fn adaptive_threshold(
    src: &ImageBuffer,
    window: u32,
    method: AdaptiveMethod,
    offset: f32,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    require_gray(src)?;
    if window < 3 || window % 2 == 0 {
        return Err(Error::invalid_argument(
            "window",
            "adaptive threshold window must be odd and at least 3",
        ));
    }
    let plane = samples_to_f32(src);
    let (width, height) = (src.width(), src.height());

    let local = match method {
        AdaptiveMethod::Mean => {
            let radius = window as i64 / 2;
            let mut means = vec![0.0f32; plane.len()];
            let taps = (window * window) as f32;
            for y in 0..height as usize {
                for x in 0..width as usize {
                    let mut acc = 0.0f32;
                    for dy in -radius..=radius {
                        for dx in -radius..=radius {
                            let sample = match (
                                resolve_coord(y as i64 + dy, height, edge),
                                resolve_coord(x as i64 + dx, width, edge),
                            ) {
                                (Some(sy), Some(sx)) => plane[sy * width as usize + sx],
                                _ => crate::kernel::edge_constant(edge),
                            };
                            acc += sample;
                        }
                    }
                    means[y * width as usize + x] = acc / taps;
                }
            }
            means
        }
        AdaptiveMethod::Gaussian => {
            let sigma = window as f32 / 6.0;
            let weights = blur::gaussian_weights(sigma)?;
            blur::separable_on_plane(&plane, width, height, 1, &weights, edge)
        }
    };

    let out = plane
        .iter()
        .zip(local.iter())
        .map(|(&value, &mean)| {
            if value > mean - offset {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    samples_from_f32(*src.layout(), out)
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
    fn equalize_spreads_two_levels() {
        let out = equalize(&gray(2, 2, &[100, 100, 102, 102])).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[0, 0, 255, 255]);
    }

    #[test]
    fn equalize_flat_image_saturates() {
        let out = equalize(&gray(2, 2, &[77; 4])).unwrap();
        assert_eq!(out.as_u8().unwrap(), &[255; 4]);
    }

    #[test]
    fn clahe_validates_parameters() {
        let src = gray(8, 8, &[0; 64]);
        assert!(clahe(&src, 0, 2, 2.0).is_err());
        assert!(clahe(&src, 2, 2, 0.5).is_err());
        assert!(clahe(&src, 2, 2, 2.0).is_ok());
    }

    #[test]
    fn adaptive_threshold_finds_local_step() {
        let mut values = [100u8; 25];
        values[12] = 200;
        let out = adaptive_threshold(
            &gray(5, 5, &values),
            3,
            AdaptiveMethod::Mean,
            0.01,
            EdgeMode::Clamp,
        )
        .unwrap();
        let data = out.as_u8().unwrap();
        assert_eq!(data[12], 255);
        assert_eq!(data[0], 255); // equal to its mean, offset keeps it on
        assert_eq!(data[7], 0); // below the raised local mean
    }

    #[test]
    fn adaptive_threshold_rejects_even_window() {
        let src = gray(4, 4, &[0; 16]);
        assert!(
            adaptive_threshold(&src, 4, AdaptiveMethod::Mean, 0.0, EdgeMode::Clamp).is_err()
        );
    }
}
