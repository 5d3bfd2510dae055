//! Geometric transform filters.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::color::Color;
use crate::error::{Error, Result};
use crate::filter::{all_formats, run_unary, Filter};
use crate::geometry::Rectangle;
use crate::image::Image;
use crate::kernel::geometric::{self, FlipAxis, Interpolation, LensCoefficients, Quarter};
use crate::ops::Params;
use crate::registry::Registration;
use crate::run::Context;

pub struct Resize {
    width: u32,
    height: u32,
    interpolation: Interpolation,
}

impl Resize {
    pub fn new(width: u32, height: u32, interpolation: Interpolation) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument("size", "resize target must be non-empty"));
        }
        Ok(Resize {
            width,
            height,
            interpolation,
        })
    }
}

impl Filter for Resize {
    fn kind(&self) -> &'static str {
        "resize"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "size": [self.width, self.height],
            "interpolation": self.interpolation.name(),
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            geometric::resize(buffer, self.width, self.height, self.interpolation)
        })
    }
}

pub struct Rotate {
    degrees: f32,
    interpolation: Interpolation,
    fill: Color,
}

impl Rotate {
    pub fn new(degrees: f32, interpolation: Interpolation, fill: Color) -> Self {
        Rotate {
            degrees,
            interpolation,
            fill,
        }
    }
}

impl Filter for Rotate {
    fn kind(&self) -> &'static str {
        "rotate"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "degrees": self.degrees,
            "interpolation": self.interpolation.name(),
            "fill": self.fill.to_hex(),
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            geometric::rotate(buffer, self.degrees, self.interpolation, self.fill)
        })
    }
}

pub struct Flip {
    axis: FlipAxis,
}

impl Flip {
    pub fn new(axis: FlipAxis) -> Self {
        Flip { axis }
    }
}

impl Filter for Flip {
    fn kind(&self) -> &'static str {
        "flip"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "axis": self.axis.name() })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| geometric::flip(buffer, self.axis))
    }
}

pub struct Crop {
    rect: Rectangle,
}

impl Crop {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument("size", "crop must be non-empty"));
        }
        Ok(Crop {
            rect: Rectangle {
                x,
                y,
                max_x: x.saturating_add(width),
                max_y: y.saturating_add(height),
            },
        })
    }
}

impl Filter for Crop {
    fn kind(&self) -> &'static str {
        "crop"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "x": self.rect.x,
            "y": self.rect.y,
            "width": self.rect.width(),
            "height": self.rect.height(),
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| geometric::crop(buffer, self.rect))
    }
}

pub struct CenterCrop {
    width: u32,
    height: u32,
}

impl CenterCrop {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument("size", "center crop must be non-empty"));
        }
        Ok(CenterCrop { width, height })
    }
}

impl Filter for CenterCrop {
    fn kind(&self) -> &'static str {
        "center_crop"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "size": [self.width, self.height] })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            geometric::center_crop(buffer, self.width, self.height)
        })
    }
}

pub struct LensDistort {
    coefficients: LensCoefficients,
    invert: bool,
    interpolation: Interpolation,
    fill: Color,
}

impl LensDistort {
    pub fn new(
        coefficients: LensCoefficients,
        invert: bool,
        interpolation: Interpolation,
        fill: Color,
    ) -> Self {
        LensDistort {
            coefficients,
            invert,
            interpolation,
            fill,
        }
    }
}

impl Filter for LensDistort {
    fn kind(&self) -> &'static str {
        "lens_distort"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "k1": self.coefficients.k1,
            "k2": self.coefficients.k2,
            "k3": self.coefficients.k3,
            "p1": self.coefficients.p1,
            "p2": self.coefficients.p2,
            "invert": self.invert,
            "interpolation": self.interpolation.name(),
            "fill": self.fill.to_hex(),
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            geometric::lens_distortion(
                buffer,
                self.coefficients,
                self.invert,
                self.interpolation,
                self.fill,
            )
        })
    }
}

pub struct Perspective {
    from: [(f32, f32); 4],
    to: [(f32, f32); 4],
    interpolation: Interpolation,
    fill: Color,
}

impl Perspective {
    pub fn new(
        from: [(f32, f32); 4],
        to: [(f32, f32); 4],
        interpolation: Interpolation,
        fill: Color,
    ) -> Self {
        Perspective {
            from,
            to,
            interpolation,
            fill,
        }
    }
}

impl Filter for Perspective {
    fn kind(&self) -> &'static str {
        "perspective"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let flatten = |points: &[(f32, f32); 4]| -> Vec<f32> {
            points.iter().flat_map(|&(x, y)| vec![x, y]).collect()
        };
        json!({
            "from": flatten(&self.from),
            "to": flatten(&self.to),
            "interpolation": self.interpolation.name(),
            "fill": self.fill.to_hex(),
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            geometric::perspective(buffer, &self.from, &self.to, self.interpolation, self.fill)
        })
    }
}

/// Exact quarter-turn as its own kind, for the fast path.
pub struct Rotate90 {
    quarter: Quarter,
}

impl Rotate90 {
    pub fn new(quarter: Quarter) -> Self {
        Rotate90 { quarter }
    }
}

impl Filter for Rotate90 {
    fn kind(&self) -> &'static str {
        "rotate90"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let quarters = match self.quarter {
            Quarter::Quarter90 => 1,
            Quarter::Quarter180 => 2,
            Quarter::Quarter270 => 3,
        };
        json!({ "quarters": quarters })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| geometric::rotate90(buffer, self.quarter))
    }
}

fn parse_interpolation(params: &Params<'_>, default: &str) -> Result<Interpolation> {
    let name = params.string_or("interpolation", default)?;
    Interpolation::from_name(&name).ok_or_else(|| {
        Error::invalid_argument(
            "interpolation",
            format!("unknown interpolation `{}`", name),
        )
    })
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "resize",
            positional: &["size", "interpolation"],
            build: |doc| {
                let params = Params::new(doc)?;
                let (width, height) = params.size("size")?;
                let interpolation = parse_interpolation(&params, "bilinear")?;
                params.finish()?;
                Ok(Arc::new(Resize::new(width, height, interpolation)?))
            },
        },
        Registration {
            kind: "rotate",
            positional: &["degrees"],
            build: |doc| {
                let params = Params::new(doc)?;
                let degrees = params.f32("degrees")?;
                let interpolation = parse_interpolation(&params, "bilinear")?;
                let fill = params.color_or("fill", Color::BLACK)?;
                params.finish()?;
                Ok(Arc::new(Rotate::new(degrees, interpolation, fill)))
            },
        },
        Registration {
            kind: "rotate90",
            positional: &["quarters"],
            build: |doc| {
                let params = Params::new(doc)?;
                let quarters = params.u32_or("quarters", 1)?;
                params.finish()?;
                let quarter = match quarters % 4 {
                    1 => Quarter::Quarter90,
                    2 => Quarter::Quarter180,
                    3 => Quarter::Quarter270,
                    _ => {
                        return Err(Error::invalid_argument(
                            "quarters",
                            "rotate90 needs 1, 2 or 3 quarter turns",
                        ))
                    }
                };
                Ok(Arc::new(Rotate90::new(quarter)))
            },
        },
        Registration {
            kind: "flip",
            positional: &["axis"],
            build: |doc| {
                let params = Params::new(doc)?;
                let axis = params.string_or("axis", "horizontal")?;
                params.finish()?;
                let axis = FlipAxis::from_name(&axis).ok_or_else(|| {
                    Error::invalid_argument("axis", format!("unknown flip axis `{}`", axis))
                })?;
                Ok(Arc::new(Flip::new(axis)))
            },
        },
        Registration {
            kind: "crop",
            positional: &["x", "y", "width", "height"],
            build: |doc| {
                let params = Params::new(doc)?;
                let x = params.u32_or("x", 0)?;
                let y = params.u32_or("y", 0)?;
                let width = params.u32("width")?;
                let height = params.u32("height")?;
                params.finish()?;
                Ok(Arc::new(Crop::new(x, y, width, height)?))
            },
        },
        Registration {
            kind: "center_crop",
            positional: &["size"],
            build: |doc| {
                let params = Params::new(doc)?;
                let (width, height) = params.size("size")?;
                params.finish()?;
                Ok(Arc::new(CenterCrop::new(width, height)?))
            },
        },
        Registration {
            kind: "lens_distort",
            positional: &["k1", "k2", "k3", "p1", "p2"],
            build: |doc| {
                let params = Params::new(doc)?;
                let coefficients = LensCoefficients {
                    k1: params.f32_or("k1", 0.0)?,
                    k2: params.f32_or("k2", 0.0)?,
                    k3: params.f32_or("k3", 0.0)?,
                    p1: params.f32_or("p1", 0.0)?,
                    p2: params.f32_or("p2", 0.0)?,
                };
                let invert = params.bool_or("invert", false)?;
                let interpolation = parse_interpolation(&params, "bilinear")?;
                let fill = params.color_or("fill", Color::BLACK)?;
                params.finish()?;
                Ok(Arc::new(LensDistort::new(coefficients, invert, interpolation, fill)))
            },
        },
        Registration {
            kind: "perspective",
            positional: &["from", "to"],
            build: |doc| {
                let params = Params::new(doc)?;
                let from = params.points("from", 4)?;
                let to = params.points("to", 4)?;
                let interpolation = parse_interpolation(&params, "bilinear")?;
                let fill = params.color_or("fill", Color::BLACK)?;
                params.finish()?;
                let mut from_array = [(0.0f32, 0.0f32); 4];
                let mut to_array = [(0.0f32, 0.0f32); 4];
                from_array.copy_from_slice(&from);
                to_array.copy_from_slice(&to);
                Ok(Arc::new(Perspective::new(from_array, to_array, interpolation, fill)))
            },
        },
    ]
}
