//! rasterflow — a composable image-processing engine.
//!
//! The crate layers bottom-up:
//!
//! - [`buffer`] and [`image`]: the pixel data model. A buffer is a dense,
//!   tightly packed raster with an explicit (element, layout) wire format;
//!   an [`image::Image`] is raw pixels, compressed bytes, or both, with
//!   lazy decode between the forms.
//! - [`kernel`]: pure, deterministic per-pixel and per-neighborhood
//!   operations in `U8` and `F32` variants sharing one algorithmic body.
//! - [`filter`], [`ops`], [`registry`]: immutable operator descriptors
//!   with typed ports, and the static kind-tag table that builds them from
//!   serialization documents.
//! - [`pipeline`] and [`graph`]: a linear chain (itself a filter) and a
//!   validated DAG of named nodes with typed ports.
//! - [`run`]: the sequential, data-parallel and stage-parallel executors.
//!   All three produce byte-identical output streams in submission order.
//! - [`parity`]: the golden-input harness checking kernels bit-for-bit
//!   across build targets.
//! - [`dsl`] and [`ser`]: the textual surface and the stable JSON
//!   documents.
pub mod buffer;
pub mod codec;
pub mod color;
pub mod dsl;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod graph;
pub mod image;
pub mod kernel;
pub mod ops;
pub mod parity;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod run;
pub mod ser;

pub use crate::buffer::{BufferLayout, ColorLayout, ElementType, ImageBuffer, PixelFormat};
pub use crate::codec::Codec;
pub use crate::color::Color;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::filter::{Filter, FilterRef, Port, PortSchema, PortValues};
pub use crate::geometry::{GeometryList, ImageList, Rectangle, Shape, Value, ValueKind};
pub use crate::graph::{Graph, GraphBuilder, GraphOutcome};
pub use crate::image::{Image, MetaValue};
pub use crate::pipeline::Pipeline;
pub use crate::pool::{Pool, PoolKey};
pub use crate::run::{
    CancelToken, Context, DataParallelConfig, DataParallelExecutor, Executor, SequentialExecutor,
    StageParallelConfig, StageParallelExecutor,
};
