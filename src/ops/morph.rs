//! Morphological filters.
use std::sync::Arc;

use crate::buffer::PixelFormat;
use crate::error::{Error, Result};
use crate::filter::{all_formats, run_unary, Filter};
use crate::image::Image;
use crate::kernel::morphology::{self, StructShape, StructuringElement};
use crate::kernel::EdgeMode;
use crate::ops::{edge_mode_doc, Params};
use crate::registry::Registration;
use crate::run::Context;

type MorphKernel =
    fn(&crate::buffer::ImageBuffer, StructuringElement, EdgeMode) -> Result<crate::buffer::ImageBuffer>;

/// One descriptor type covers the whole erode/dilate family; the kind tag
/// picks the kernel.
pub struct Morphology {
    kind: &'static str,
    kernel: MorphKernel,
    shape: StructShape,
    size: u32,
    edge: EdgeMode,
}

impl Morphology {
    fn with_kernel(
        kind: &'static str,
        kernel: MorphKernel,
        shape: StructShape,
        size: u32,
        edge: EdgeMode,
    ) -> Result<Self> {
        // Validates the odd-size requirement up front.
        StructuringElement::new(shape, size)?;
        Ok(Morphology {
            kind,
            kernel,
            shape,
            size,
            edge,
        })
    }

    pub fn erode(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("erode", morphology::erode, shape, size, edge)
    }

    pub fn dilate(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("dilate", morphology::dilate, shape, size, edge)
    }

    pub fn open(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("open", morphology::open, shape, size, edge)
    }

    pub fn close(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("close", morphology::close, shape, size, edge)
    }

    pub fn gradient(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("morph_gradient", morphology::morph_gradient, shape, size, edge)
    }

    pub fn top_hat(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("top_hat", morphology::top_hat, shape, size, edge)
    }

    pub fn black_hat(shape: StructShape, size: u32, edge: EdgeMode) -> Result<Self> {
        Self::with_kernel("black_hat", morphology::black_hat, shape, size, edge)
    }
}

impl Filter for Morphology {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        all_formats()
    }

    fn params_doc(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("size".to_owned(), serde_json::json!(self.size));
        map.insert("shape".to_owned(), serde_json::json!(self.shape.name()));
        edge_mode_doc(&mut map, self.edge);
        serde_json::Value::Object(map)
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_unary(self, image, |buffer| {
            let element = StructuringElement::new(self.shape, self.size)?;
            (self.kernel)(buffer, element, self.edge)
        })
    }
}

fn parse(doc: &serde_json::Value) -> Result<(StructShape, u32, EdgeMode)> {
    let params = Params::new(doc)?;
    let size = params.u32_or("size", 3)?;
    let shape = params.string_or("shape", "rect")?;
    let edge = params.edge_mode()?;
    params.finish()?;
    let shape = StructShape::from_name(&shape)
        .ok_or_else(|| Error::invalid_argument("shape", format!("unknown element shape `{}`", shape)))?;
    Ok((shape, size, edge))
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "erode",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::erode(shape, size, edge)?))
            },
        },
        Registration {
            kind: "dilate",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::dilate(shape, size, edge)?))
            },
        },
        Registration {
            kind: "open",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::open(shape, size, edge)?))
            },
        },
        Registration {
            kind: "close",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::close(shape, size, edge)?))
            },
        },
        Registration {
            kind: "morph_gradient",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::gradient(shape, size, edge)?))
            },
        },
        Registration {
            kind: "top_hat",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::top_hat(shape, size, edge)?))
            },
        },
        Registration {
            kind: "black_hat",
            positional: &["size", "shape"],
            build: |doc| {
                let (shape, size, edge) = parse(doc)?;
                Ok(Arc::new(Morphology::black_hat(shape, size, edge)?))
            },
        },
    ]
}
