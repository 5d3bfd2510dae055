//! Explicit format conversion as a filter.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::{ColorLayout, ElementType, PixelFormat};
use crate::error::{Error, Result};
use crate::filter::{all_formats, Filter};
use crate::image::Image;
use crate::ops::Params;
use crate::registry::Registration;
use crate::run::Context;

/// Convert into a named wire format.
pub struct Convert {
    target: PixelFormat,
}

impl Convert {
    pub fn new(target: PixelFormat) -> Self {
        Convert { target }
    }
}

impl Filter for Convert {
    fn kind(&self) -> &'static str {
        "convert"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "layout": self.target.layout.name(),
            "element": match self.target.element {
                ElementType::U8 => "u8",
                ElementType::F32 => "f32",
            },
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        let buffer = image.to_format(self.target)?;
        Ok(image.with_buffer_keeping_meta(buffer))
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![Registration {
        kind: "convert",
        positional: &["layout", "element"],
        build: |doc| {
            let params = Params::new(doc)?;
            let layout = params.string_or("layout", "rgba")?;
            let element = params.string_or("element", "u8")?;
            params.finish()?;
            let layout = ColorLayout::from_name(&layout)
                .ok_or_else(|| Error::invalid_argument("layout", format!("unknown layout `{}`", layout)))?;
            let element = match element.as_str() {
                "u8" => ElementType::U8,
                "f32" => ElementType::F32,
                other => {
                    return Err(Error::invalid_argument(
                        "element",
                        format!("unknown element type `{}`", other),
                    ))
                }
            };
            Ok(Arc::new(Convert::new(PixelFormat::new(element, layout))))
        },
    }]
}
