//! Stable serialization of filters, pipelines, and graphs.
//!
//! Documents are codec-neutral JSON values: `{"type": kind, "params":
//! {…}}` for plain filters, with dedicated shapes for pipelines and
//! graphs. Deserialization is strict; unknown kinds, unknown parameters,
//! and ill-typed connections refuse the document with a typed error.
use serde_json::{json, Map, Value as Doc};

use crate::error::{Error, Result};
use crate::filter::{Filter, FilterRef};
use crate::geometry::ValueKind;
use crate::graph::{Graph, GraphBuilder, NodeKind};
use crate::pipeline::Pipeline;
use crate::registry;

/// Serialize any filter, including nested pipelines and graphs.
pub fn filter_to_doc(filter: &dyn Filter) -> Doc {
    match filter.kind() {
        "pipeline" => {
            let mut doc = Map::new();
            doc.insert("type".to_owned(), Doc::from("pipeline"));
            let params = filter.params_doc();
            doc.insert(
                "filters".to_owned(),
                params.get("filters").cloned().unwrap_or_else(|| json!([])),
            );
            Doc::Object(doc)
        }
        "graph" => {
            let mut doc = Map::new();
            doc.insert("type".to_owned(), Doc::from("graph"));
            if let Doc::Object(body) = filter.params_doc() {
                for (key, value) in body {
                    doc.insert(key, value);
                }
            }
            Doc::Object(doc)
        }
        kind => json!({
            "type": kind,
            "params": filter.params_doc(),
        }),
    }
}

/// Deserialize a filter document; nested pipelines and single-source
/// graphs come back behind the filter contract.
pub fn filter_from_doc(doc: &Doc) -> Result<FilterRef> {
    let kind = doc
        .get("type")
        .and_then(Doc::as_str)
        .ok_or_else(|| Error::invalid_argument("type", "document lacks a `type` tag"))?;
    match kind {
        "pipeline" => Ok(pipeline_from_doc(doc)?.into_ref()),
        "graph" => graph_from_doc(doc)?.into_filter(),
        _ => {
            for key in doc.as_object().map(Map::keys).into_iter().flatten() {
                if key != "type" && key != "params" {
                    return Err(Error::invalid_argument(
                        "params",
                        format!("unknown document key `{}`", key),
                    ));
                }
            }
            let params = doc.get("params").cloned().unwrap_or(Doc::Null);
            registry::build_filter(kind, &params)
        }
    }
}

pub fn pipeline_to_doc(pipeline: &Pipeline) -> Doc {
    filter_to_doc(pipeline)
}

pub fn pipeline_from_doc(doc: &Doc) -> Result<Pipeline> {
    match doc.get("type").and_then(Doc::as_str) {
        Some("pipeline") => {}
        _ => return Err(Error::invalid_argument("type", "expected a pipeline document")),
    }
    let filters = doc
        .get("filters")
        .and_then(Doc::as_array)
        .ok_or_else(|| Error::invalid_argument("filters", "pipeline document lacks `filters`"))?;
    let mut stages = Vec::with_capacity(filters.len());
    for stage in filters {
        stages.push(filter_from_doc(stage)?);
    }
    Ok(Pipeline::new(stages))
}

/// The `nodes`/`connections` body shared by graph documents and nested
/// graph filters.
pub(crate) fn graph_to_doc_body(graph: &Graph) -> Doc {
    let mut nodes = Map::new();
    for node in &graph.nodes {
        let doc = match &node.kind {
            NodeKind::Source { kind } => json!({
                "type": "source",
                "kind": kind.name(),
            }),
            NodeKind::Sink => json!({ "type": "sink" }),
            NodeKind::Filter(filter) => filter_to_doc(filter.as_ref()),
        };
        nodes.insert(node.name.clone(), doc);
    }

    let connections: Vec<Doc> = graph
        .edges
        .iter()
        .map(|edge| {
            json!({
                "from": graph.nodes[edge.from].name,
                "from_port": edge.from_port,
                "to": graph.nodes[edge.to].name,
                "to_port": edge.to_port,
            })
        })
        .collect();

    json!({ "nodes": nodes, "connections": connections })
}

pub fn graph_to_doc(graph: &Graph) -> Doc {
    let mut doc = Map::new();
    doc.insert("type".to_owned(), Doc::from("graph"));
    if let Doc::Object(body) = graph_to_doc_body(graph) {
        for (key, value) in body {
            doc.insert(key, value);
        }
    }
    Doc::Object(doc)
}

pub fn graph_from_doc(doc: &Doc) -> Result<Graph> {
    match doc.get("type").and_then(Doc::as_str) {
        Some("graph") => {}
        _ => return Err(Error::invalid_argument("type", "expected a graph document")),
    }
    let nodes = doc
        .get("nodes")
        .and_then(Doc::as_object)
        .ok_or_else(|| Error::invalid_argument("nodes", "graph document lacks `nodes`"))?;

    let mut builder = GraphBuilder::new();
    for (name, node_doc) in nodes {
        let node_kind = node_doc
            .get("type")
            .and_then(Doc::as_str)
            .ok_or_else(|| Error::invalid_argument("type", "graph node lacks a `type` tag"))?;
        builder = match node_kind {
            "source" => {
                let kind = match node_doc.get("kind").and_then(Doc::as_str) {
                    None | Some("image") => ValueKind::Image,
                    Some("geometry") => ValueKind::Geometry,
                    Some("images") => ValueKind::Images,
                    Some("bytes") => ValueKind::Bytes,
                    Some(other) => {
                        return Err(Error::invalid_argument(
                            "kind",
                            format!("unknown source kind `{}`", other),
                        ))
                    }
                };
                builder.source_of(name.clone(), kind)
            }
            "sink" => builder.sink(name.clone()),
            _ => builder.filter(name.clone(), filter_from_doc(node_doc)?),
        };
    }

    let connections = doc
        .get("connections")
        .and_then(Doc::as_array)
        .ok_or_else(|| Error::invalid_argument("connections", "graph document lacks `connections`"))?;
    for connection in connections {
        let object = connection.as_object().ok_or_else(|| {
            Error::invalid_argument("connections", "each connection must be an object")
        })?;
        let endpoint = |key: &str, port_key: &str| -> Result<String> {
            let node = object.get(key).and_then(Doc::as_str).ok_or_else(|| {
                Error::invalid_argument("connections", format!("connection lacks `{}`", key))
            })?;
            // A bare string name implies the default port.
            Ok(match object.get(port_key).and_then(Doc::as_str) {
                Some(port) => format!("{}.{}", node, port),
                None => node.to_owned(),
            })
        };
        let from = endpoint("from", "from_port")?;
        let to = endpoint("to", "to_port")?;
        builder = builder.connect(&from, &to);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_document_shape() {
        let filter = registry::build_filter("threshold", &json!({"value": 0.5})).unwrap();
        let doc = filter_to_doc(filter.as_ref());
        assert_eq!(doc["type"], "threshold");
        assert_eq!(doc["params"]["value"], 0.5);
        let back = filter_from_doc(&doc).unwrap();
        assert_eq!(filter_to_doc(back.as_ref()), doc);
    }

    #[test]
    fn unknown_kind_is_refused() {
        let err = filter_from_doc(&json!({"type": "definitely_not_a_filter"})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn pipeline_round_trip() {
        let doc = json!({
            "type": "pipeline",
            "filters": [
                {"type": "gaussian_blur", "params": {"sigma": 1.5}},
                {"type": "threshold", "params": {"value": 0.5}},
            ],
        });
        let pipeline = pipeline_from_doc(&doc).unwrap();
        assert_eq!(pipeline.len(), 2);
        let round = pipeline_to_doc(&pipeline);
        assert_eq!(round["type"], "pipeline");
        assert_eq!(round["filters"].as_array().unwrap().len(), 2);
        assert_eq!(round["filters"][0]["params"]["sigma"], 1.5);
    }
}
