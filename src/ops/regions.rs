//! Region extraction and merging, and geometry rasterization.
//!
//! These are the producers and consumers of the derived value types:
//! `extract_regions` turns a geometry list into an image list,
//! `merge_regions` folds an image list back onto a canvas, and
//! `draw_geometry` rasterizes shapes for inspection output.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::{ImageBuffer, PixelFormat};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::filter::{all_formats, Filter, Port, PortSchema, PortValues};
use crate::geometry::{ImageList, Rectangle, Shape, ShapeStyle, Value, ValueKind};
use crate::image::Image;
use crate::kernel::geometric::{self, fill_samples};
use crate::kernel::{samples_from_f32, samples_to_f32};
use crate::ops::Params;
use crate::registry::Registration;
use crate::run::Context;

/// The bounding rectangle of a shape, in source pixel space.
///
/// Built by joining the one-pixel cells of the shape's extreme points,
/// clamped into the non-negative pixel grid.
fn bounding_rect(shape: &Shape) -> Option<Rectangle> {
    let cell = |x: i32, y: i32| Rectangle {
        x: x.max(0) as u32,
        y: y.max(0) as u32,
        max_x: x.saturating_add(1).max(0) as u32,
        max_y: y.saturating_add(1).max(0) as u32,
    };
    let rect = match shape {
        Shape::Rect { x, y, w, h, .. } => Rectangle {
            x: (*x).max(0) as u32,
            y: (*y).max(0) as u32,
            max_x: x.saturating_add(*w as i32).max(0) as u32,
            max_y: y.saturating_add(*h as i32).max(0) as u32,
        },
        Shape::Circle { cx, cy, r, .. } => {
            let r = *r as i32;
            cell(cx - r, cy - r).join(cell(cx + r, cy + r))
        }
        Shape::Line { p0, p1, .. } => cell(p0.x, p0.y).join(cell(p1.x, p1.y)),
        Shape::Polygon { points, .. } => {
            let mut corners = points.iter().map(|point| cell(point.x, point.y));
            let first = corners.next()?;
            corners.fold(first, Rectangle::join)
        }
    };
    if rect.is_empty() {
        None
    } else {
        Some(rect)
    }
}

/// Cut the bounding rectangle of every shape out of the input image.
pub struct ExtractRegions;

impl ExtractRegions {
    pub fn new() -> Self {
        ExtractRegions
    }
}

impl Default for ExtractRegions {
    fn default() -> Self {
        ExtractRegions::new()
    }
}

impl Filter for ExtractRegions {
    fn kind(&self) -> &'static str {
        "extract_regions"
    }

    fn ports(&self) -> PortSchema {
        PortSchema {
            inputs: vec![
                Port::required("input", ValueKind::Image),
                Port::required("regions", ValueKind::Geometry),
            ],
            outputs: vec![Port::required("output", ValueKind::Images)],
        }
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, _: &Image, _: &Context) -> Result<Image> {
        Err(Error::invalid_argument(
            "inputs",
            "extract_regions is a combiner; bind `input` and `regions` ports",
        ))
    }

    fn apply_multi(&self, inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        ctx.check_cancelled()?;
        let image = inputs.image("input")?;
        let regions = match inputs.get("regions") {
            Some(Value::Geometry(list)) => list,
            Some(other) => {
                return Err(Error::invalid_argument(
                    "port",
                    format!("port `regions` carries {}, expected geometry", other.kind().name()),
                ))
            }
            None => {
                return Err(Error::invalid_argument("port", "missing required port `regions`"))
            }
        };

        let pixels = image.pixels()?;
        let full = Rectangle::with_layout(pixels.layout());
        let mut list = ImageList::new();
        for shape in &regions.shapes {
            let rect = match bounding_rect(shape) {
                Some(rect) => rect.meet(full),
                None => continue,
            };
            if rect.is_empty() {
                continue;
            }
            let patch = geometric::crop(pixels, rect)?;
            list.push(rect.x as i32, rect.y as i32, Image::from_buffer(patch));
        }
        Ok(PortValues::single("output", Value::Images(list)))
    }
}

/// Paste an image list back onto a canvas, with optional edge feathering.
pub struct MergeRegions {
    feather: u32,
}

impl MergeRegions {
    pub fn new(feather: u32) -> Self {
        MergeRegions { feather }
    }
}

impl Filter for MergeRegions {
    fn kind(&self) -> &'static str {
        "merge_regions"
    }

    fn ports(&self) -> PortSchema {
        PortSchema {
            inputs: vec![
                Port::required("canvas", ValueKind::Image),
                Port::required("regions", ValueKind::Images),
            ],
            outputs: vec![Port::required("output", ValueKind::Image)],
        }
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "feather": self.feather })
    }

    fn apply(&self, _: &Image, _: &Context) -> Result<Image> {
        Err(Error::invalid_argument(
            "inputs",
            "merge_regions is a combiner; bind `canvas` and `regions` ports",
        ))
    }

    fn apply_multi(&self, inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        ctx.check_cancelled()?;
        let canvas = inputs.image("canvas")?;
        let regions = match inputs.get("regions") {
            Some(Value::Images(list)) => list,
            Some(other) => {
                return Err(Error::invalid_argument(
                    "port",
                    format!("port `regions` carries {}, expected images", other.kind().name()),
                ))
            }
            None => {
                return Err(Error::invalid_argument("port", "missing required port `regions`"))
            }
        };

        let base = canvas.pixels()?;
        let format = base.format();
        let channels = base.channels();
        let (width, height) = (base.width() as usize, base.height() as usize);
        let mut plane = samples_to_f32(base);

        for entry in &regions.entries {
            let patch = entry.image.to_format(format)?;
            let patch_plane = samples_to_f32(&patch);
            let (pw, ph) = (patch.width() as usize, patch.height() as usize);
            for py in 0..ph {
                let ty = entry.origin_y as i64 + py as i64;
                if ty < 0 || ty >= height as i64 {
                    continue;
                }
                for px in 0..pw {
                    let tx = entry.origin_x as i64 + px as i64;
                    if tx < 0 || tx >= width as i64 {
                        continue;
                    }
                    // Linear ramp towards the patch border.
                    let weight = if self.feather == 0 {
                        1.0
                    } else {
                        let border = px
                            .min(py)
                            .min(pw - 1 - px)
                            .min(ph - 1 - py) as f32;
                        ((border + 1.0) / (self.feather as f32 + 1.0)).min(1.0)
                    };
                    let src_at = (py * pw + px) * channels;
                    let dst_at = (ty as usize * width + tx as usize) * channels;
                    for channel in 0..channels {
                        let src = patch_plane[src_at + channel];
                        let dst = plane[dst_at + channel];
                        plane[dst_at + channel] = src * weight + dst * (1.0 - weight);
                    }
                }
            }
        }

        let merged = samples_from_f32(*base.layout(), plane)?;
        Ok(PortValues::single(
            "output",
            Value::Image(canvas.with_buffer_keeping_meta(merged)),
        ))
    }
}

/// Rasterize a geometry list onto the image.
pub struct DrawGeometry;

impl DrawGeometry {
    pub fn new() -> Self {
        DrawGeometry
    }
}

impl Default for DrawGeometry {
    fn default() -> Self {
        DrawGeometry::new()
    }
}

struct DrawTarget {
    plane: Vec<f32>,
    width: i64,
    height: i64,
    channels: usize,
}

impl DrawTarget {
    /// Source-over a styled sample onto one pixel.
    fn plot(&mut self, x: i64, y: i64, color: &[f32; 4], alpha: f32) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height || alpha <= 0.0 {
            return;
        }
        let at = (y as usize * self.width as usize + x as usize) * self.channels;
        for channel in 0..self.channels.min(3) {
            let dst = self.plane[at + channel];
            self.plane[at + channel] = color[channel] * alpha + dst * (1.0 - alpha);
        }
        if self.channels == 4 {
            let dst = self.plane[at + 3];
            self.plane[at + 3] = alpha + dst * (1.0 - alpha);
        }
    }

    fn brush(&mut self, x: i64, y: i64, color: &[f32; 4], alpha: f32, thickness: u32) {
        let reach = (thickness.max(1) / 2) as i64;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                self.plot(x + dx, y + dy, color, alpha);
            }
        }
    }

    fn line(&mut self, mut x0: i64, mut y0: i64, x1: i64, y1: i64, color: &[f32; 4], alpha: f32, thickness: u32) {
        // Bresenham.
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.brush(x0, y0, color, alpha, thickness);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                x0 += sx;
            }
            if doubled <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }
}

fn style_colors(
    style: &ShapeStyle,
    layout: crate::buffer::ColorLayout,
) -> (Option<([f32; 4], f32)>, Option<([f32; 4], f32)>) {
    let prepare = |color: Color| {
        let samples = fill_samples(layout, Color::opaque(color.r, color.g, color.b));
        (samples, f32::from(color.a) / 255.0)
    };
    (style.stroke.map(prepare), style.fill.map(prepare))
}

impl Filter for DrawGeometry {
    fn kind(&self) -> &'static str {
        "draw_geometry"
    }

    fn ports(&self) -> PortSchema {
        PortSchema {
            inputs: vec![
                Port::required("input", ValueKind::Image),
                Port::required("geometry", ValueKind::Geometry),
            ],
            outputs: vec![Port::required("output", ValueKind::Image)],
        }
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, _: &Image, _: &Context) -> Result<Image> {
        Err(Error::invalid_argument(
            "inputs",
            "draw_geometry is a combiner; bind `input` and `geometry` ports",
        ))
    }

    fn apply_multi(&self, inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        ctx.check_cancelled()?;
        let image = inputs.image("input")?;
        let geometry = match inputs.get("geometry") {
            Some(Value::Geometry(list)) => list,
            Some(other) => {
                return Err(Error::invalid_argument(
                    "port",
                    format!("port `geometry` carries {}, expected geometry", other.kind().name()),
                ))
            }
            None => {
                return Err(Error::invalid_argument("port", "missing required port `geometry`"))
            }
        };

        let pixels = image.pixels()?;
        let layout = pixels.format().layout;
        let mut target = DrawTarget {
            plane: samples_to_f32(pixels),
            width: i64::from(pixels.width()),
            height: i64::from(pixels.height()),
            channels: pixels.channels(),
        };

        for shape in &geometry.shapes {
            match shape {
                Shape::Rect { x, y, w, h, style } => {
                    let (stroke, fill) = style_colors(style, layout);
                    let (x0, y0) = (i64::from(*x), i64::from(*y));
                    let (x1, y1) = (x0 + *w as i64 - 1, y0 + *h as i64 - 1);
                    if let Some((color, alpha)) = fill {
                        for fy in y0..=y1 {
                            for fx in x0..=x1 {
                                target.plot(fx, fy, &color, alpha);
                            }
                        }
                    }
                    if let Some((color, alpha)) = stroke {
                        target.line(x0, y0, x1, y0, &color, alpha, style.thickness);
                        target.line(x1, y0, x1, y1, &color, alpha, style.thickness);
                        target.line(x1, y1, x0, y1, &color, alpha, style.thickness);
                        target.line(x0, y1, x0, y0, &color, alpha, style.thickness);
                    }
                }
                Shape::Circle { cx, cy, r, style } => {
                    let (stroke, fill) = style_colors(style, layout);
                    let (cx, cy, r) = (i64::from(*cx), i64::from(*cy), *r as i64);
                    if let Some((color, alpha)) = fill {
                        for dy in -r..=r {
                            for dx in -r..=r {
                                if dx * dx + dy * dy <= r * r {
                                    target.plot(cx + dx, cy + dy, &color, alpha);
                                }
                            }
                        }
                    }
                    if let Some((color, alpha)) = stroke {
                        // A thin ring selected by squared-distance band.
                        let band = i64::from(style.thickness.max(1));
                        for dy in -(r + band)..=(r + band) {
                            for dx in -(r + band)..=(r + band) {
                                let d2 = dx * dx + dy * dy;
                                let inner = (r - band + 1).max(0);
                                if d2 <= (r + band - 1) * (r + band - 1) && d2 >= inner * inner {
                                    let distance = (d2 as f64).sqrt();
                                    if (distance - r as f64).abs() <= band as f64 / 2.0 + 0.5 {
                                        target.plot(cx + dx, cy + dy, &color, alpha);
                                    }
                                }
                            }
                        }
                    }
                }
                Shape::Line { p0, p1, style } => {
                    let (stroke, _) = style_colors(style, layout);
                    if let Some((color, alpha)) = stroke {
                        target.line(
                            i64::from(p0.x),
                            i64::from(p0.y),
                            i64::from(p1.x),
                            i64::from(p1.y),
                            &color,
                            alpha,
                            style.thickness,
                        );
                    }
                }
                Shape::Polygon { points, style } => {
                    if points.len() < 2 {
                        continue;
                    }
                    let (stroke, fill) = style_colors(style, layout);
                    if let Some((color, alpha)) = fill {
                        fill_polygon(&mut target, points, &color, alpha);
                    }
                    if let Some((color, alpha)) = stroke {
                        for window in points.windows(2) {
                            target.line(
                                i64::from(window[0].x),
                                i64::from(window[0].y),
                                i64::from(window[1].x),
                                i64::from(window[1].y),
                                &color,
                                alpha,
                                style.thickness,
                            );
                        }
                        let first = points[0];
                        let last = points[points.len() - 1];
                        target.line(
                            i64::from(last.x),
                            i64::from(last.y),
                            i64::from(first.x),
                            i64::from(first.y),
                            &color,
                            alpha,
                            style.thickness,
                        );
                    }
                }
            }
        }

        let drawn = samples_from_f32(*pixels.layout(), target.plane)?;
        Ok(PortValues::single(
            "output",
            Value::Image(image.with_buffer_keeping_meta(drawn)),
        ))
    }
}

/// Even-odd scanline polygon fill.
fn fill_polygon(
    target: &mut DrawTarget,
    points: &[crate::geometry::Point],
    color: &[f32; 4],
    alpha: f32,
) {
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0);
    for y in min_y..=max_y {
        let mut crossings = Vec::new();
        for index in 0..points.len() {
            let a = points[index];
            let b = points[(index + 1) % points.len()];
            if (a.y <= y && b.y > y) || (b.y <= y && a.y > y) {
                let t = (y - a.y) as f64 / (b.y - a.y) as f64;
                crossings.push(a.x as f64 + t * (b.x - a.x) as f64);
            }
        }
        crossings.sort_by(|lhs, rhs| lhs.partial_cmp(rhs).unwrap_or(core::cmp::Ordering::Equal));
        for span in crossings.chunks_exact(2) {
            let x0 = span[0].ceil() as i64;
            let x1 = span[1].floor() as i64;
            for x in x0..=x1 {
                target.plot(x, i64::from(y), color, alpha);
            }
        }
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "extract_regions",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(ExtractRegions::new()))
            },
        },
        Registration {
            kind: "merge_regions",
            positional: &["feather"],
            build: |doc| {
                let params = Params::new(doc)?;
                let feather = params.u32_or("feather", 0)?;
                params.finish()?;
                Ok(Arc::new(MergeRegions::new(feather)))
            },
        },
        Registration {
            kind: "draw_geometry",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(DrawGeometry::new()))
            },
        },
    ]
}
