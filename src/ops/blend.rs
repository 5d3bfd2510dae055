//! Combiners: filters with more than one required input port.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::error::{Error, Result};
use crate::filter::{
    adapt_input, all_formats, restore_format, rgb_family_formats, Filter, Port, PortSchema,
    PortValues,
};
use crate::geometry::{Value, ValueKind};
use crate::image::Image;
use crate::kernel::blend::{self, BlendMode};
use crate::kernel::geometric::{self, Interpolation};
use crate::ops::Params;
use crate::registry::Registration;
use crate::run::Context;

/// Per-pixel blend of two equally sized images.
pub struct Blend {
    mode: BlendMode,
}

impl Blend {
    pub fn new(mode: BlendMode) -> Self {
        Blend { mode }
    }
}

impl Filter for Blend {
    fn kind(&self) -> &'static str {
        "blend"
    }

    fn ports(&self) -> PortSchema {
        PortSchema {
            inputs: vec![
                Port::required("a", ValueKind::Image),
                Port::required("b", ValueKind::Image),
            ],
            outputs: vec![Port::required("output", ValueKind::Image)],
        }
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        rgb_family_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "mode": self.mode.name() })
    }

    fn apply(&self, _: &Image, _: &Context) -> Result<Image> {
        Err(Error::invalid_argument(
            "inputs",
            "blend is a combiner; bind both `a` and `b` ports",
        ))
    }

    fn apply_multi(&self, inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        ctx.check_cancelled()?;
        let below = inputs.image("a")?;
        let above = inputs.image("b")?;

        let (below_buffer, original) = adapt_input(below, &self.native_formats())?;
        // The second operand follows the first one's working format.
        let above_buffer = above.to_format(below_buffer.format())?;

        let blended = blend::blend(self.mode, &below_buffer, &above_buffer)?;
        let restored = restore_format(blended, original, true)?;
        let output = below.with_buffer_keeping_meta(restored);
        Ok(PortValues::single("output", Value::Image(output)))
    }
}

/// Size matcher: resample `input` onto the dimensions of `reference`.
pub struct FitTo {
    interpolation: Interpolation,
}

impl FitTo {
    pub fn new(interpolation: Interpolation) -> Self {
        FitTo { interpolation }
    }
}

impl Filter for FitTo {
    fn kind(&self) -> &'static str {
        "fit_to"
    }

    fn ports(&self) -> PortSchema {
        PortSchema {
            inputs: vec![
                Port::required("input", ValueKind::Image),
                Port::required("reference", ValueKind::Image),
            ],
            outputs: vec![Port::required("output", ValueKind::Image)],
        }
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "interpolation": self.interpolation.name() })
    }

    fn apply(&self, _: &Image, _: &Context) -> Result<Image> {
        Err(Error::invalid_argument(
            "inputs",
            "fit_to is a combiner; bind both `input` and `reference` ports",
        ))
    }

    fn apply_multi(&self, inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        ctx.check_cancelled()?;
        let image = inputs.image("input")?;
        let reference = inputs.image("reference")?;
        let (width, height) = reference.size()?;

        let pixels = image.pixels()?;
        let output = if pixels.layout().size() == (width, height) {
            image.clone()
        } else {
            let resized = geometric::resize(pixels, width, height, self.interpolation)?;
            image.with_buffer_keeping_meta(resized)
        };
        Ok(PortValues::single("output", Value::Image(output)))
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "blend",
            positional: &["mode"],
            build: |doc| {
                let params = Params::new(doc)?;
                let mode = params.string_or("mode", "normal")?;
                params.finish()?;
                let mode = BlendMode::from_name(&mode).ok_or_else(|| {
                    Error::invalid_argument("mode", format!("unrecognized blend mode `{}`", mode))
                })?;
                Ok(Arc::new(Blend::new(mode)))
            },
        },
        Registration {
            kind: "fit_to",
            positional: &["interpolation"],
            build: |doc| {
                let params = Params::new(doc)?;
                let name = params.string_or("interpolation", "bilinear")?;
                params.finish()?;
                let interpolation = Interpolation::from_name(&name).ok_or_else(|| {
                    Error::invalid_argument(
                        "interpolation",
                        format!("unknown interpolation `{}`", name),
                    )
                })?;
                Ok(Arc::new(FitTo::new(interpolation)))
            },
        },
    ]
}
