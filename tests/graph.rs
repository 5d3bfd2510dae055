//! Graph construction, validation, and execution scenarios.
use std::collections::BTreeMap;

use rasterflow::buffer::{BufferLayout, ImageBuffer, PixelFormat};
use rasterflow::error::ErrorKind;
use rasterflow::geometry::{Value, ValueKind};
use rasterflow::graph::Graph;
use rasterflow::registry;
use rasterflow::run::Context;
use rasterflow::{Image, Pool};

fn solid_rgb(width: u32, height: u32, pixel: [u8; 3]) -> Image {
    let layout = BufferLayout::new(width, height, PixelFormat::RGB_U8).unwrap();
    let mut data = Vec::with_capacity(layout.byte_len());
    for _ in 0..width * height {
        data.extend_from_slice(&pixel);
    }
    Image::from_buffer(ImageBuffer::from_u8(layout, data).unwrap())
}

fn blend_multiply() -> rasterflow::FilterRef {
    registry::build_filter("blend", &serde_json::json!({"mode": "multiply"})).unwrap()
}

#[test]
fn two_source_multiply_graph() {
    let graph = Graph::builder()
        .source("source_a")
        .source("source_b")
        .filter("blend", blend_multiply())
        .sink("sink")
        .connect("source_a", "blend.a")
        .connect("source_b", "blend.b")
        .connect("blend", "sink")
        .build()
        .unwrap();

    let mut sources = BTreeMap::new();
    sources.insert(
        "source_a".to_owned(),
        Value::Image(solid_rgb(2, 2, [128; 3])),
    );
    sources.insert(
        "source_b".to_owned(),
        Value::Image(solid_rgb(2, 2, [128; 3])),
    );

    let mut outputs = graph.apply(sources, &Context::new()).unwrap();
    let sink = outputs.remove("sink").unwrap();
    let image = sink.into_image().unwrap();
    // 128 * 128 / 255 = 64.25 -> 64
    assert_eq!(
        image.pixels().unwrap().as_u8().unwrap(),
        &[64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64]
    );
}

#[test]
fn cycle_is_refused_before_execution() {
    let invert = || registry::build_filter("invert", &serde_json::json!({})).unwrap();
    let err = Graph::builder()
        .source("source")
        .filter("a", invert())
        .filter("b", invert())
        .sink("sink")
        .connect("source", "a")
        .connect("a", "b")
        .connect("b", "a")
        .connect("b", "sink")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GraphInvalid);
}

#[test]
fn unbound_required_port_is_refused() {
    let err = Graph::builder()
        .source("source_a")
        .filter("blend", blend_multiply())
        .sink("sink")
        .connect("source_a", "blend.a")
        .connect("blend", "sink")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GraphInvalid);
}

#[test]
fn type_mismatched_connection_is_refused() {
    let err = Graph::builder()
        .source_of("boxes", ValueKind::Geometry)
        .filter("blend", blend_multiply())
        .source("source_b")
        .sink("sink")
        .connect("boxes", "blend.a")
        .connect("source_b", "blend.b")
        .connect("blend", "sink")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GraphInvalid);
}

#[test]
fn partial_outcome_reports_emitted_and_failed_sinks() {
    // Two branches: a passing invert and a blend that fails on mismatched
    // operand sizes at run time.
    let invert = registry::build_filter("invert", &serde_json::json!({})).unwrap();
    let graph = Graph::builder()
        .source("source_a")
        .source("source_b")
        .filter("ok_branch", invert)
        .filter("bad_branch", blend_multiply())
        .sink("good")
        .sink("broken")
        .connect("source_a", "ok_branch")
        .connect("ok_branch", "good")
        .connect("source_a", "bad_branch.a")
        .connect("source_b", "bad_branch.b")
        .connect("bad_branch", "broken")
        .build()
        .unwrap();

    let mut sources = BTreeMap::new();
    sources.insert("source_a".to_owned(), Value::Image(solid_rgb(2, 2, [10; 3])));
    sources.insert("source_b".to_owned(), Value::Image(solid_rgb(4, 4, [10; 3])));

    let outcome = graph.apply_partial(sources, &Context::new()).unwrap();
    assert!(outcome.outputs.contains_key("good"));
    let failure = outcome.failures.get("broken").unwrap();
    assert_eq!(failure.kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn missing_source_binding_refuses_the_run() {
    let invert = registry::build_filter("invert", &serde_json::json!({})).unwrap();
    let graph = Graph::builder()
        .source("source")
        .filter("stage", invert)
        .sink("sink")
        .connect("source", "stage")
        .connect("stage", "sink")
        .build()
        .unwrap();
    let err = graph.apply(BTreeMap::new(), &Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn pool_binds_sources_by_key() {
    let mut pool = Pool::new();
    let key = pool.insert(solid_rgb(2, 2, [200; 3])).key();

    let invert = registry::build_filter("invert", &serde_json::json!({})).unwrap();
    let graph = Graph::builder()
        .source("source")
        .filter("stage", invert)
        .sink("sink")
        .connect("source", "stage")
        .connect("stage", "sink")
        .build()
        .unwrap();

    let sources = pool.bind_sources(vec![("source", key)]).unwrap();
    let mut outputs = graph.apply(sources, &Context::new()).unwrap();
    let image = outputs.remove("sink").unwrap().into_image().unwrap();
    assert_eq!(&image.pixels().unwrap().as_u8().unwrap()[..3], &[55, 55, 55]);
}

#[test]
fn multi_output_region_flow() {
    // extract_regions -> merge_regions round trip through an image list.
    use rasterflow::geometry::{GeometryList, Shape, ShapeStyle};

    let mut geometry = GeometryList::new();
    geometry.push(Shape::Rect {
        x: 1,
        y: 1,
        w: 2,
        h: 2,
        style: ShapeStyle::default(),
    });

    let extract = registry::build_filter("extract_regions", &serde_json::json!({})).unwrap();
    let merge = registry::build_filter("merge_regions", &serde_json::json!({"feather": 0})).unwrap();

    let graph = Graph::builder()
        .source("source")
        .source_of("boxes", ValueKind::Geometry)
        .filter("cut", extract)
        .filter("paste", merge)
        .sink("sink")
        .connect_ports("source", "output", "cut", "input")
        .connect_ports("boxes", "output", "cut", "regions")
        .connect_ports("source", "output", "paste", "canvas")
        .connect_ports("cut", "output", "paste", "regions")
        .connect("paste", "sink")
        .build()
        .unwrap();

    let source = solid_rgb(4, 4, [77; 3]);
    let mut sources = BTreeMap::new();
    sources.insert("source".to_owned(), Value::Image(source.clone()));
    sources.insert("boxes".to_owned(), Value::Geometry(geometry));

    let mut outputs = graph.apply(sources, &Context::new()).unwrap();
    let merged = outputs.remove("sink").unwrap().into_image().unwrap();
    // Pasting a region cut from the same image back is the identity.
    assert_eq!(
        merged.pixels().unwrap().as_u8(),
        source.pixels().unwrap().as_u8()
    );
}
