//! Point-operation filters.
use core::convert::TryFrom;
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::error::{Error, Result};
use crate::filter::{all_formats, gray_formats, rgb_family_formats, run_unary, Filter};
use crate::image::Image;
use crate::kernel::point::{self, GrayMethod};
use crate::ops::{normalize_level, Params};
use crate::registry::Registration;
use crate::run::Context;

/// Binary threshold against a fixed level.
pub struct Threshold {
    value: f32,
}

impl Threshold {
    pub fn new(value: f32) -> Result<Self> {
        let value = normalize_level(value);
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::invalid_argument("value", "threshold must be within [0, 1] or byte scale"));
        }
        Ok(Threshold { value })
    }
}

impl Filter for Threshold {
    fn kind(&self) -> &'static str {
        "threshold"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "value": self.value })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::threshold(buffer, self.value))
    }
}

pub struct Invert;

impl Invert {
    pub fn new() -> Self {
        Invert
    }
}

impl Default for Invert {
    fn default() -> Self {
        Invert::new()
    }
}

impl Filter for Invert {
    fn kind(&self) -> &'static str {
        "invert"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, point::invert)
    }
}

pub struct Brightness {
    amount: f32,
}

impl Brightness {
    pub fn new(amount: f32) -> Result<Self> {
        let amount = normalize_level(amount);
        Ok(Brightness { amount })
    }
}

impl Filter for Brightness {
    fn kind(&self) -> &'static str {
        "brightness"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "amount": self.amount })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::brightness(buffer, self.amount))
    }
}

pub struct Contrast {
    factor: f32,
}

impl Contrast {
    pub fn new(factor: f32) -> Result<Self> {
        if factor < 0.0 {
            return Err(Error::invalid_argument("factor", "contrast factor must be non-negative"));
        }
        Ok(Contrast { factor })
    }
}

impl Filter for Contrast {
    fn kind(&self) -> &'static str {
        "contrast"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "factor": self.factor })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::contrast(buffer, self.factor))
    }
}

pub struct Saturation {
    factor: f32,
}

impl Saturation {
    pub fn new(factor: f32) -> Result<Self> {
        if factor < 0.0 {
            return Err(Error::invalid_argument("factor", "saturation factor must be non-negative"));
        }
        Ok(Saturation { factor })
    }
}

impl Filter for Saturation {
    fn kind(&self) -> &'static str {
        "saturation"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        rgb_family_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "factor": self.factor })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::saturation(buffer, self.factor))
    }
}

pub struct Gamma {
    gamma: f32,
}

impl Gamma {
    pub fn new(gamma: f32) -> Result<Self> {
        if !(gamma > 0.0) {
            return Err(Error::invalid_argument("gamma", "gamma must be positive"));
        }
        Ok(Gamma { gamma })
    }
}

impl Filter for Gamma {
    fn kind(&self) -> &'static str {
        "gamma"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "gamma": self.gamma })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::gamma(buffer, self.gamma))
    }
}

pub struct LogCurve;

impl LogCurve {
    pub fn new() -> Self {
        LogCurve
    }
}

impl Default for LogCurve {
    fn default() -> Self {
        LogCurve::new()
    }
}

impl Filter for LogCurve {
    fn kind(&self) -> &'static str {
        "log"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({})
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, point::log_curve)
    }
}

pub struct Sigmoid {
    gain: f32,
    midpoint: f32,
}

impl Sigmoid {
    pub fn new(gain: f32, midpoint: f32) -> Result<Self> {
        if !(gain > 0.0) {
            return Err(Error::invalid_argument("gain", "sigmoid gain must be positive"));
        }
        Ok(Sigmoid {
            gain,
            midpoint: normalize_level(midpoint),
        })
    }
}

impl Filter for Sigmoid {
    fn kind(&self) -> &'static str {
        "sigmoid"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "gain": self.gain, "midpoint": self.midpoint })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            point::sigmoid(buffer, self.gain, self.midpoint)
        })
    }
}

pub struct Posterize {
    levels: u8,
}

impl Posterize {
    pub fn new(levels: u8) -> Result<Self> {
        if levels < 2 {
            return Err(Error::invalid_argument("levels", "posterize needs at least 2 levels"));
        }
        Ok(Posterize { levels })
    }
}

impl Filter for Posterize {
    fn kind(&self) -> &'static str {
        "posterize"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "levels": self.levels })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::posterize(buffer, self.levels))
    }
}

pub struct Solarize {
    threshold: f32,
}

impl Solarize {
    pub fn new(threshold: f32) -> Result<Self> {
        Ok(Solarize {
            threshold: normalize_level(threshold),
        })
    }
}

impl Filter for Solarize {
    fn kind(&self) -> &'static str {
        "solarize"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "threshold": self.threshold })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::solarize(buffer, self.threshold))
    }
}

/// Reduce to a single gray channel.
pub struct Grayscale {
    method: GrayMethod,
}

impl Grayscale {
    pub fn new(method: GrayMethod) -> Self {
        Grayscale { method }
    }
}

impl Filter for Grayscale {
    fn kind(&self) -> &'static str {
        "grayscale"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        let mut formats = rgb_family_formats();
        formats.extend(gray_formats());
        formats
    }

    fn preserves_format(&self) -> bool {
        // The layout change to gray is the point.
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "method": self.method.name() })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::grayscale(buffer, self.method))
    }
}

/// Map gray values through a named 256-entry color table.
pub struct Colormap {
    name: String,
    table: Box<[[u8; 3]; 256]>,
}

impl Colormap {
    pub fn new(name: &str) -> Result<Self> {
        let table = point::builtin_colormap(name).ok_or_else(|| {
            Error::invalid_argument("map", format!("unknown colormap `{}`", name))
        })?;
        Ok(Colormap {
            name: name.to_owned(),
            table: Box::new(table),
        })
    }
}

impl Filter for Colormap {
    fn kind(&self) -> &'static str {
        "colormap"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        gray_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "map": self.name })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| point::colormap(buffer, &self.table))
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "threshold",
            positional: &["value"],
            build: |doc| {
                let params = Params::new(doc)?;
                let value = params.f32("value")?;
                params.finish()?;
                Ok(Arc::new(Threshold::new(value)?))
            },
        },
        Registration {
            kind: "invert",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(Invert::new()))
            },
        },
        Registration {
            kind: "brightness",
            positional: &["amount"],
            build: |doc| {
                let params = Params::new(doc)?;
                let amount = params.f32("amount")?;
                params.finish()?;
                Ok(Arc::new(Brightness::new(amount)?))
            },
        },
        Registration {
            kind: "contrast",
            positional: &["factor"],
            build: |doc| {
                let params = Params::new(doc)?;
                let factor = params.f32("factor")?;
                params.finish()?;
                Ok(Arc::new(Contrast::new(factor)?))
            },
        },
        Registration {
            kind: "saturation",
            positional: &["factor"],
            build: |doc| {
                let params = Params::new(doc)?;
                let factor = params.f32("factor")?;
                params.finish()?;
                Ok(Arc::new(Saturation::new(factor)?))
            },
        },
        Registration {
            kind: "gamma",
            positional: &["gamma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let gamma = params.f32("gamma")?;
                params.finish()?;
                Ok(Arc::new(Gamma::new(gamma)?))
            },
        },
        Registration {
            kind: "log",
            positional: &[],
            build: |doc| {
                Params::new(doc)?.finish()?;
                Ok(Arc::new(LogCurve::new()))
            },
        },
        Registration {
            kind: "sigmoid",
            positional: &["gain", "midpoint"],
            build: |doc| {
                let params = Params::new(doc)?;
                let gain = params.f32_or("gain", 10.0)?;
                let midpoint = params.f32_or("midpoint", 0.5)?;
                params.finish()?;
                Ok(Arc::new(Sigmoid::new(gain, midpoint)?))
            },
        },
        Registration {
            kind: "posterize",
            positional: &["levels"],
            build: |doc| {
                let params = Params::new(doc)?;
                let levels = params.u32("levels")?;
                params.finish()?;
                let levels = u8::try_from(levels).map_err(|_| {
                    Error::invalid_argument("levels", "posterize levels must fit a byte")
                })?;
                Ok(Arc::new(Posterize::new(levels)?))
            },
        },
        Registration {
            kind: "solarize",
            positional: &["threshold"],
            build: |doc| {
                let params = Params::new(doc)?;
                let threshold = params.f32_or("threshold", 0.5)?;
                params.finish()?;
                Ok(Arc::new(Solarize::new(threshold)?))
            },
        },
        Registration {
            kind: "grayscale",
            positional: &["method"],
            build: |doc| {
                let params = Params::new(doc)?;
                let method = params.string_or("method", "luminosity")?;
                params.finish()?;
                let method = GrayMethod::from_name(&method).ok_or_else(|| {
                    Error::invalid_argument("method", format!("unknown gray method `{}`", method))
                })?;
                Ok(Arc::new(Grayscale::new(method)))
            },
        },
        Registration {
            kind: "colormap",
            positional: &["map"],
            build: |doc| {
                let params = Params::new(doc)?;
                let map = params.string_or("map", "gray")?;
                params.finish()?;
                Ok(Arc::new(Colormap::new(&map)?))
            },
        },
    ]
}
