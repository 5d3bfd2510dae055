//! Morphological operators over a structuring element.
use crate::buffer::ImageBuffer;
use crate::error::{Error, Result};
use crate::kernel::{edge_constant, resolve_coord, samples_from_f32, samples_to_f32, EdgeMode};

/// The footprint shape of a structuring element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructShape {
    Rect,
    Ellipse,
    Cross,
}

impl StructShape {
    pub fn name(self) -> &'static str {
        match self {
            StructShape::Rect => "rect",
            StructShape::Ellipse => "ellipse",
            StructShape::Cross => "cross",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "rect" => StructShape::Rect,
            "ellipse" => StructShape::Ellipse,
            "cross" => StructShape::Cross,
            _ => return None,
        })
    }
}

/// An odd-sized footprint with precomputed sample offsets.
#[derive(Clone, Debug)]
pub struct StructuringElement {
    shape: StructShape,
    size: u32,
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    pub fn new(shape: StructShape, size: u32) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(Error::invalid_argument(
                "size",
                "structuring element size must be odd",
            ));
        }
        let radius = (size / 2) as i32;
        let mut offsets = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let include = match shape {
                    StructShape::Rect => true,
                    StructShape::Cross => dx == 0 || dy == 0,
                    StructShape::Ellipse => dx * dx + dy * dy <= radius * radius,
                };
                if include {
                    offsets.push((dx, dy));
                }
            }
        }
        Ok(StructuringElement {
            shape,
            size,
            offsets,
        })
    }

    pub fn rect(size: u32) -> Result<Self> {
        Self::new(StructShape::Rect, size)
    }

    pub fn ellipse(size: u32) -> Result<Self> {
        Self::new(StructShape::Ellipse, size)
    }

    pub fn cross(size: u32) -> Result<Self> {
        Self::new(StructShape::Cross, size)
    }

    pub fn shape(&self) -> StructShape {
        self.shape
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum Extremum {
    Min,
    Max,
}

fn rank_filter(
    src: &ImageBuffer,
    element: &StructuringElement,
    edge: EdgeMode,
    which: Extremum,
) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let out = rank_on_plane(
        &plane,
        src.width(),
        src.height(),
        src.channels(),
        element,
        edge,
        which,
    );
    samples_from_f32(*src.layout(), out)
}

pub(crate) fn rank_on_plane(
    plane: &[f32],
    width: u32,
    height: u32,
    channels: usize,
    element: &StructuringElement,
    edge: EdgeMode,
    which: Extremum,
) -> Vec<f32> {
    let constant = edge_constant(edge);
    let row_stride = width as usize * channels;
    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height as usize {
        for x in 0..width as usize {
            for channel in 0..channels {
                let mut best = match which {
                    Extremum::Min => f32::INFINITY,
                    Extremum::Max => f32::NEG_INFINITY,
                };
                for &(dx, dy) in &element.offsets {
                    let sample = match (
                        resolve_coord(y as i64 + i64::from(dy), height, edge),
                        resolve_coord(x as i64 + i64::from(dx), width, edge),
                    ) {
                        (Some(sy), Some(sx)) => plane[sy * row_stride + sx * channels + channel],
                        _ => constant,
                    };
                    best = match which {
                        Extremum::Min => best.min(sample),
                        Extremum::Max => best.max(sample),
                    };
                }
                out[y * row_stride + x * channels + channel] = best;
            }
        }
    }
    out
}

/// Minimum over the element footprint.
pub fn erode(src: &ImageBuffer, element: StructuringElement, edge: EdgeMode) -> Result<ImageBuffer> {
    rank_filter(src, &element, edge, Extremum::Min)
}

/// Maximum over the element footprint.
pub fn dilate(
    src: &ImageBuffer,
    element: StructuringElement,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    rank_filter(src, &element, edge, Extremum::Max)
}

/// Erosion followed by dilation.
pub fn open(src: &ImageBuffer, element: StructuringElement, edge: EdgeMode) -> Result<ImageBuffer> {
    let eroded = rank_filter(src, &element, edge, Extremum::Min)?;
    rank_filter(&eroded, &element, edge, Extremum::Max)
}

/// Dilation followed by erosion.
pub fn close(src: &ImageBuffer, element: StructuringElement, edge: EdgeMode) -> Result<ImageBuffer> {
    let dilated = rank_filter(src, &element, edge, Extremum::Max)?;
    rank_filter(&dilated, &element, edge, Extremum::Min)
}

/// Dilation minus erosion.
pub fn morph_gradient(
    src: &ImageBuffer,
    element: StructuringElement,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let dilated = rank_on_plane(&plane, width, height, channels, &element, edge, Extremum::Max);
    let eroded = rank_on_plane(&plane, width, height, channels, &element, edge, Extremum::Min);
    let out = dilated
        .iter()
        .zip(eroded.iter())
        .map(|(&hi, &lo)| hi - lo)
        .collect();
    samples_from_f32(*src.layout(), out)
}

/// Source minus its opening: small bright detail.
pub fn top_hat(
    src: &ImageBuffer,
    element: StructuringElement,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let eroded = rank_on_plane(&plane, width, height, channels, &element, edge, Extremum::Min);
    let opened = rank_on_plane(&eroded, width, height, channels, &element, edge, Extremum::Max);
    let out = plane
        .iter()
        .zip(opened.iter())
        .map(|(&source, &open)| source - open)
        .collect();
    samples_from_f32(*src.layout(), out)
}

/// Closing minus the source: small dark detail.
pub fn black_hat(
    src: &ImageBuffer,
    element: StructuringElement,
    edge: EdgeMode,
) -> Result<ImageBuffer> {
    let plane = samples_to_f32(src);
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let dilated = rank_on_plane(&plane, width, height, channels, &element, edge, Extremum::Max);
    let closed = rank_on_plane(&dilated, width, height, channels, &element, edge, Extremum::Min);
    let out = closed
        .iter()
        .zip(plane.iter())
        .map(|(&close, &source)| close - source)
        .collect();
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
    fn even_size_refused() {
        assert!(StructuringElement::rect(4).is_err());
        assert!(StructuringElement::rect(0).is_err());
        assert!(StructuringElement::rect(3).is_ok());
    }

    #[test]
    fn erode_shrinks_dot() {
        let mut values = [0u8; 25];
        for y in 1..4 {
            for x in 1..4 {
                values[y * 5 + x] = 255;
            }
        }
        let out = erode(&gray(5, 5, &values), StructuringElement::rect(3).unwrap(), EdgeMode::Clamp)
            .unwrap();
        let data = out.as_u8().unwrap();
        assert_eq!(data[2 * 5 + 2], 255);
        assert_eq!(data[1 * 5 + 1], 0);
    }

    #[test]
    fn open_removes_speck() {
        let mut values = [0u8; 25];
        values[12] = 255;
        let out = open(&gray(5, 5, &values), StructuringElement::rect(3).unwrap(), EdgeMode::Clamp)
            .unwrap();
        assert_eq!(out.as_u8().unwrap(), &[0; 25]);
    }

    #[test]
    fn cross_excludes_diagonal() {
        let element = StructuringElement::cross(3).unwrap();
        assert_eq!(element.offsets.len(), 5);
        let rect = StructuringElement::rect(3).unwrap();
        assert_eq!(rect.offsets.len(), 9);
    }
}
