//! Edge-detection filters.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::error::Result;
use crate::filter::{all_formats, gray_formats, run_unary, Filter};
use crate::image::Image;
use crate::kernel::edge;
use crate::kernel::EdgeMode;
use crate::ops::{edge_mode_doc, normalize_level, Params};
use crate::registry::Registration;
use crate::run::Context;

macro_rules! gradient_filter {
    ($name:ident, $kind:literal, $kernel:path) => {
        pub struct $name {
            edge: EdgeMode,
        }

        impl $name {
            pub fn new(edge: EdgeMode) -> Self {
                $name { edge }
            }
        }

        impl Filter for $name {
            fn kind(&self) -> &'static str {
                $kind
            }

            fn native_formats(&self) -> Vec<PixelFormat> {
                all_formats()
            }

            fn params_doc(&self) -> serde_json::Value {
                let mut map = serde_json::Map::new();
                edge_mode_doc(&mut map, self.edge);
                serde_json::Value::Object(map)
            }

            fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
                run_unary(self, image, |buffer| $kernel(buffer, self.edge))
            }
        }
    };
}

gradient_filter!(Sobel, "sobel", edge::sobel);
gradient_filter!(Scharr, "scharr", edge::scharr);
gradient_filter!(Laplacian, "laplacian", edge::laplacian);

/// Canny dual-threshold edge detector. Adapts input to gray.
pub struct Canny {
    sigma: f32,
    low: f32,
    high: f32,
}

impl Canny {
    pub fn new(sigma: f32, low: f32, high: f32) -> Result<Self> {
        let low = normalize_level(low);
        let high = normalize_level(high);
        if !(low >= 0.0) || !(high > low) {
            return Err(crate::error::Error::invalid_argument(
                "threshold",
                "canny needs 0 <= low < high",
            ));
        }
        crate::kernel::blur::gaussian_weights(sigma)?;
        Ok(Canny { sigma, low, high })
    }
}

impl Filter for Canny {
    fn kind(&self) -> &'static str {
        "canny"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        gray_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "sigma": self.sigma, "low": self.low, "high": self.high })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            edge::canny(buffer, self.sigma, self.low, self.high)
        })
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "sobel",
            positional: &[],
            build: |doc| {
                let params = Params::new(doc)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(Sobel::new(edge)))
            },
        },
        Registration {
            kind: "scharr",
            positional: &[],
            build: |doc| {
                let params = Params::new(doc)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(Scharr::new(edge)))
            },
        },
        Registration {
            kind: "laplacian",
            positional: &[],
            build: |doc| {
                let params = Params::new(doc)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(Laplacian::new(edge)))
            },
        },
        Registration {
            kind: "canny",
            positional: &["low", "high"],
            build: |doc| {
                let params = Params::new(doc)?;
                let sigma = params.f32_or("sigma", 1.4)?;
                let low = params.f32_or("low", 0.1)?;
                let high = params.f32_or("high", 0.3)?;
                params.finish()?;
                Ok(Arc::new(Canny::new(sigma, low, high)?))
            },
        },
    ]
}
