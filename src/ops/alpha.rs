//! Alpha-channel filters.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::error::Result;
use crate::filter::{alpha_formats, run_unary, Filter};
use crate::image::Image;
use crate::kernel::alpha;
use crate::kernel::morphology::StructuringElement;
use crate::kernel::EdgeMode;
use crate::ops::Params;
use crate::registry::Registration;
use crate::run::Context;

pub struct Premultiply;

impl Premultiply {
    pub fn new() -> Self {
        Premultiply
    }
}

impl Default for Premultiply {
    fn default() -> Self {
        Premultiply::new()
    }
}

impl Filter for Premultiply {
    fn kind(&self) -> &'static str {
        "premultiply"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, alpha::premultiply)
    }
}

pub struct Unpremultiply;

impl Unpremultiply {
    pub fn new() -> Self {
        Unpremultiply
    }
}

impl Default for Unpremultiply {
    fn default() -> Self {
        Unpremultiply::new()
    }
}

impl Filter for Unpremultiply {
    fn kind(&self) -> &'static str {
        "unpremultiply"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, alpha::unpremultiply)
    }
}

/// Grow the alpha coverage, colors untouched.
pub struct AlphaDilate {
    size: u32,
    edge: EdgeMode,
}

impl AlphaDilate {
    pub fn new(size: u32, edge: EdgeMode) -> Result<Self> {
        StructuringElement::rect(size)?;
        Ok(AlphaDilate { size, edge })
    }
}

impl Filter for AlphaDilate {
    fn kind(&self) -> &'static str {
        "alpha_dilate"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("size".to_owned(), json!(self.size));
        crate::ops::edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            alpha::alpha_dilate(buffer, StructuringElement::rect(self.size)?, self.edge)
        })
    }
}

/// Shrink the alpha coverage, colors untouched.
pub struct AlphaErode {
    size: u32,
    edge: EdgeMode,
}

impl AlphaErode {
    pub fn new(size: u32, edge: EdgeMode) -> Result<Self> {
        StructuringElement::rect(size)?;
        Ok(AlphaErode { size, edge })
    }
}

impl Filter for AlphaErode {
    fn kind(&self) -> &'static str {
        "alpha_erode"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("size".to_owned(), json!(self.size));
        crate::ops::edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            alpha::alpha_erode(buffer, StructuringElement::rect(self.size)?, self.edge)
        })
    }
}

/// Signed distance field of the alpha coverage boundary.
pub struct DistanceField {
    spread: f32,
}

impl DistanceField {
    pub fn new(spread: f32) -> Result<Self> {
        if !(spread > 0.0) {
            return Err(crate::error::Error::invalid_argument(
                "spread",
                "distance spread must be positive",
            ));
        }
        Ok(DistanceField { spread })
    }
}

impl Filter for DistanceField {
    fn kind(&self) -> &'static str {
        "distance_field"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "spread": self.spread })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| alpha::distance_field(buffer, self.spread))
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "premultiply",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(Premultiply::new()))
            },
        },
        Registration {
            kind: "unpremultiply",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(Unpremultiply::new()))
            },
        },
        Registration {
            kind: "alpha_dilate",
            positional: &["size"],
            build: |doc| {
                let params = Params::new(doc)?;
                let size = params.u32_or("size", 3)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(AlphaDilate::new(size, edge)?))
            },
        },
        Registration {
            kind: "alpha_erode",
            positional: &["size"],
            build: |doc| {
                let params = Params::new(doc)?;
                let size = params.u32_or("size", 3)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(AlphaErode::new(size, edge)?))
            },
        },
        Registration {
            kind: "distance_field",
            positional: &["spread"],
            build: |doc| {
                let params = Params::new(doc)?;
                let spread = params.f32_or("spread", 8.0)?;
                params.finish()?;
                Ok(Arc::new(DistanceField::new(spread)?))
            },
        },
    ]
}
