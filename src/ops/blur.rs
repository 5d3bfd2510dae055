//! Blur filters.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::PixelFormat;
use crate::error::Result;
use crate::filter::{all_formats, run_unary, Filter};
use crate::image::Image;
use crate::kernel::blur;
use crate::kernel::EdgeMode;
use crate::ops::{edge_mode_doc, Params};
use crate::registry::Registration;
use crate::run::Context;

pub struct BoxBlur {
    radius: u32,
    edge: EdgeMode,
}

impl BoxBlur {
    pub fn new(radius: u32, edge: EdgeMode) -> Result<Self> {
        if radius == 0 {
            return Err(crate::error::Error::invalid_argument(
                "radius",
                "box blur radius must be at least 1",
            ));
        }
        Ok(BoxBlur { radius, edge })
    }
}

impl Filter for BoxBlur {
    fn kind(&self) -> &'static str {
        "box_blur"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("radius".to_owned(), json!(self.radius));
        edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| blur::box_blur(buffer, self.radius, self.edge))
    }
}

pub struct GaussianBlur {
    sigma: f32,
    edge: EdgeMode,
}

impl GaussianBlur {
    pub fn new(sigma: f32, edge: EdgeMode) -> Result<Self> {
        // Validates sigma.
        blur::gaussian_weights(sigma)?;
        Ok(GaussianBlur { sigma, edge })
    }
}

impl Filter for GaussianBlur {
    fn kind(&self) -> &'static str {
        "gaussian_blur"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("sigma".to_owned(), json!(self.sigma));
        edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            blur::gaussian_blur(buffer, self.sigma, self.edge)
        })
    }
}

pub struct MedianBlur {
    size: u32,
    edge: EdgeMode,
}

impl MedianBlur {
    pub fn new(size: u32, edge: EdgeMode) -> Result<Self> {
        if size < 3 || size % 2 == 0 {
            return Err(crate::error::Error::invalid_argument(
                "size",
                "median window must be odd and at least 3",
            ));
        }
        Ok(MedianBlur { size, edge })
    }
}

impl Filter for MedianBlur {
    fn kind(&self) -> &'static str {
        "median_blur"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("size".to_owned(), json!(self.size));
        edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            blur::median_blur(buffer, self.size, self.edge)
        })
    }
}

pub struct Bilateral {
    spatial_sigma: f32,
    range_sigma: f32,
    edge: EdgeMode,
}

impl Bilateral {
    pub fn new(spatial_sigma: f32, range_sigma: f32, edge: EdgeMode) -> Result<Self> {
        if !(spatial_sigma > 0.0) || !(range_sigma > 0.0) {
            return Err(crate::error::Error::invalid_argument(
                "sigma",
                "bilateral sigmas must be positive",
            ));
        }
        Ok(Bilateral {
            spatial_sigma,
            range_sigma,
            edge,
        })
    }
}

impl Filter for Bilateral {
    fn kind(&self) -> &'static str {
        "bilateral"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("spatial_sigma".to_owned(), json!(self.spatial_sigma));
        map.insert("range_sigma".to_owned(), json!(self.range_sigma));
        edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            blur::bilateral(buffer, self.spatial_sigma, self.range_sigma, self.edge)
        })
    }
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "box_blur",
            positional: &["radius"],
            build: |doc| {
                let params = Params::new(doc)?;
                let radius = params.u32_or("radius", 1)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(BoxBlur::new(radius, edge)?))
            },
        },
        Registration {
            kind: "gaussian_blur",
            positional: &["sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let sigma = params.f32("sigma")?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(GaussianBlur::new(sigma, edge)?))
            },
        },
        Registration {
            kind: "median_blur",
            positional: &["size"],
            build: |doc| {
                let params = Params::new(doc)?;
                let size = params.u32_or("size", 3)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(MedianBlur::new(size, edge)?))
            },
        },
        Registration {
            kind: "bilateral",
            positional: &["spatial_sigma", "range_sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let spatial = params.f32_or("spatial_sigma", 2.0)?;
                let range = params.f32_or("range_sigma", 0.1)?;
                let edge = params.edge_mode()?;
                params.finish()?;
                Ok(Arc::new(Bilateral::new(spatial, range, edge)?))
            },
        },
    ]
}
