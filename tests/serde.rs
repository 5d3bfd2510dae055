//! Serialization round trips and strictness.
use rasterflow::error::ErrorKind;
use rasterflow::ser::{
    filter_from_doc, filter_to_doc, graph_from_doc, graph_to_doc, pipeline_from_doc,
    pipeline_to_doc,
};
use serde_json::json;

/// Serialize, re-parse, re-serialize: the two documents must agree.
fn assert_stable(doc: &serde_json::Value) {
    let first = filter_to_doc(filter_from_doc(doc).unwrap().as_ref());
    let second = filter_to_doc(filter_from_doc(&first).unwrap().as_ref());
    assert_eq!(first, second, "document not stable: {}", doc);
}

#[test]
fn filter_docs_round_trip() {
    let documents = [
        json!({"type": "threshold", "params": {"value": 0.5}}),
        json!({"type": "invert"}),
        json!({"type": "gaussian_blur", "params": {"sigma": 2.5, "edge": "reflect"}}),
        json!({"type": "median_blur", "params": {"size": 5}}),
        json!({"type": "erode", "params": {"size": 3, "shape": "ellipse"}}),
        json!({"type": "resize", "params": {"size": [10, 12], "interpolation": "bicubic"}}),
        json!({"type": "rotate", "params": {"degrees": 45.0, "fill": "#ff0000"}}),
        json!({"type": "flip", "params": {"axis": "both"}}),
        json!({"type": "clahe", "params": {"grid": [4, 4], "clip_limit": 2.0}}),
        json!({"type": "adaptive_threshold", "params": {"window": 9, "method": "gaussian"}}),
        json!({"type": "blend", "params": {"mode": "soft_light"}}),
        json!({"type": "grayscale", "params": {"method": "average"}}),
        json!({"type": "colormap", "params": {"map": "hot"}}),
        json!({"type": "premultiply"}),
        json!({"type": "distance_field", "params": {"spread": 12.0}}),
        json!({"type": "drop_shadow", "params": {
            "offset_x": 5.0, "offset_y": 5.0, "sigma": 2.0,
            "spread": 1, "color": "#202020", "opacity": 0.75,
        }}),
        json!({"type": "stroke", "params": {"size": 2, "position": "inside", "color": "#00ff00"}}),
        json!({"type": "gradient_overlay", "params": {
            "style": "radial",
            "stops": [[0.0, "#000000"], [1.0, "#ffffff"]],
            "reverse": true,
        }}),
        json!({"type": "lens_distort", "params": {"k1": 0.1, "k2": -0.05}}),
        json!({"type": "perspective", "params": {
            "from": [0.0, 0.0, 9.0, 0.0, 9.0, 9.0, 0.0, 9.0],
            "to":   [1.0, 1.0, 8.0, 0.0, 9.0, 9.0, 0.0, 8.0],
        }}),
        json!({"type": "merge_regions", "params": {"feather": 2}}),
    ];
    for doc in documents.iter() {
        assert_stable(doc);
    }
}

#[test]
fn pipeline_round_trip() {
    let doc = json!({
        "type": "pipeline",
        "filters": [
            {"type": "gaussian_blur", "params": {"sigma": 1.5}},
            {"type": "threshold", "params": {"value": 0.5}},
            {"type": "pipeline", "filters": [
                {"type": "invert"},
            ]},
        ],
    });
    let pipeline = pipeline_from_doc(&doc).unwrap();
    assert_eq!(pipeline.len(), 3);
    let first = pipeline_to_doc(&pipeline);
    let second = pipeline_to_doc(&pipeline_from_doc(&first).unwrap());
    assert_eq!(first, second);
}

#[test]
fn graph_round_trip() {
    let doc = json!({
        "type": "graph",
        "nodes": {
            "source_a": {"type": "source", "kind": "image"},
            "source_b": {"type": "source", "kind": "image"},
            "mix": {"type": "blend", "params": {"mode": "multiply"}},
            "sink": {"type": "sink"},
        },
        "connections": [
            {"from": "source_a", "to": "mix", "to_port": "a"},
            {"from": "source_b", "to": "mix", "to_port": "b"},
            // A bare string name implies the default port.
            {"from": "mix", "to": "sink"},
        ],
    });
    let graph = graph_from_doc(&doc).unwrap();
    assert_eq!(graph.source_names().len(), 2);

    let first = graph_to_doc(&graph);
    let second = graph_to_doc(&graph_from_doc(&first).unwrap());
    assert_eq!(first, second);
    // Ports are explicit after one round.
    assert_eq!(first["connections"][0]["from_port"], "output");
}

#[test]
fn unknown_kind_is_refused() {
    let err = filter_from_doc(&json!({"type": "mystery_meat"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn unknown_parameter_is_refused() {
    let err = filter_from_doc(&json!({
        "type": "gaussian_blur",
        "params": {"sigma": 1.0, "sigmah": 2.0},
    }))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn type_mismatched_connection_is_refused() {
    let doc = json!({
        "type": "graph",
        "nodes": {
            "boxes": {"type": "source", "kind": "geometry"},
            "stage": {"type": "invert"},
            "sink": {"type": "sink"},
        },
        "connections": [
            {"from": "boxes", "to": "stage"},
            {"from": "stage", "to": "sink"},
        ],
    });
    let err = graph_from_doc(&doc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GraphInvalid);
}

#[test]
fn colors_serialize_lowercase_hex() {
    let filter = filter_from_doc(&json!({
        "type": "color_overlay",
        "params": {"color": "#A0B0C0", "opacity": 1.0},
    }))
    .unwrap();
    let doc = filter_to_doc(filter.as_ref());
    assert_eq!(doc["params"]["color"], "#a0b0c0");
}
