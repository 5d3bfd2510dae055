//! Histogram filters.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::error::{Error, Result};
use crate::filter::{gray_formats, run_unary, Filter};
use crate::image::Image;
use crate::kernel::histogram::{self, AdaptiveMethod};
use crate::kernel::EdgeMode;
use crate::ops::{edge_mode_doc, normalize_level, Params};
use crate::registry::Registration;
use crate::run::Context;

/// Global histogram equalization; adapts input to gray.
pub struct Equalize;

impl Equalize {
    pub fn new() -> Self {
        Equalize
    }
}

impl Default for Equalize {
    fn default() -> Self {
        Equalize::new()
    }
}

impl Filter for Equalize {
    fn kind(&self) -> &'static str {
        "equalize"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        gray_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, histogram::equalize)
    }
}

/// Contrast-limited adaptive equalization.
pub struct Clahe {
    grid_x: u32,
    grid_y: u32,
    clip_limit: f32,
}

impl Clahe {
    pub fn new(grid_x: u32, grid_y: u32, clip_limit: f32) -> Result<Self> {
        if grid_x == 0 || grid_y == 0 {
            return Err(Error::invalid_argument("grid", "clahe grid must be at least 1x1"));
        }
        if !(clip_limit >= 1.0) {
            return Err(Error::invalid_argument(
                "clip_limit",
                "clahe clip limit must be at least 1",
            ));
        }
        Ok(Clahe {
            grid_x,
            grid_y,
            clip_limit,
        })
    }
}

impl Filter for Clahe {
    fn kind(&self) -> &'static str {
        "clahe"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        gray_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "grid": [self.grid_x, self.grid_y],
            "clip_limit": self.clip_limit,
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            histogram::clahe(buffer, self.grid_x, self.grid_y, self.clip_limit)
        })
    }
}

/// Locally adaptive binary threshold.
pub struct AdaptiveThreshold {
    window: u32,
    method: AdaptiveMethod,
    offset: f32,
    edge: EdgeMode,
}

impl AdaptiveThreshold {
    pub fn new(window: u32, method: AdaptiveMethod, offset: f32, edge: EdgeMode) -> Result<Self> {
        if window < 3 || window % 2 == 0 {
            return Err(Error::invalid_argument(
                "window",
                "adaptive threshold window must be odd and at least 3",
            ));
        }
        Ok(AdaptiveThreshold {
            window,
            method,
            offset: normalize_level(offset),
            edge,
        })
    }
}

impl Filter for AdaptiveThreshold {
    fn kind(&self) -> &'static str {
        "adaptive_threshold"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        gray_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("window".to_owned(), json!(self.window));
        map.insert("method".to_owned(), json!(self.method.name()));
        map.insert("offset".to_owned(), json!(self.offset));
        edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            histogram::adaptive_threshold(buffer, self.window, self.method, self.offset, self.edge)
        })
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "equalize",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(Equalize::new()))
            },
        },
        Registration {
            kind: "clahe",
            positional: &["grid", "clip_limit"],
            build: |doc| {
                let params = Params::new(doc)?;
                let (grid_x, grid_y) = params.size_or("grid", (8, 8))?;
                let clip_limit = params.f32_or("clip_limit", 2.0)?;
                params.finish()?;
                Ok(Arc::new(Clahe::new(grid_x, grid_y, clip_limit)?))
            },
        },
        Registration {
            kind: "adaptive_threshold",
            positional: &["window", "method", "offset"],
            build: |doc| {
                let params = Params::new(doc)?;
                let window = params.u32_or("window", 11)?;
                let method = params.string_or("method", "mean")?;
                let offset = params.f32_or("offset", 0.0)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                let method = AdaptiveMethod::from_name(&method).ok_or_else(|| {
                    Error::invalid_argument("method", format!("unknown adaptive method `{}`", method))
                })?;
                Ok(Arc::new(AdaptiveThreshold::new(window, method, offset, edge)?))
            },
        },
    ]
}
