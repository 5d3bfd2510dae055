//! The filter graph: a DAG of named nodes with typed ports.
//!
//! A graph is validated exhaustively at construction and immutable
//! afterwards; execution walks the stored topological order. Invalid
//! graphs are refused with `GraphInvalid` before any execution attempt.
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::buffer::PixelFormat;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterRef, PortSchema, PortValues};
use crate::geometry::{Value, ValueKind};
use crate::image::Image;
use crate::pipeline::Pipeline;
use crate::run::Context;

/// A node in a graph under construction.
enum NodeDef {
    Source { kind: ValueKind },
    Sink,
    Filter(FilterRef),
}

/// Builds and validates a [`Graph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<(String, NodeDef)>,
    connections: Vec<RawConnection>,
}

struct RawConnection {
    from_node: String,
    from_port: Option<String>,
    to_node: String,
    to_port: Option<String>,
}

/// A resolved, validated graph node.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Source { kind: ValueKind },
    Sink,
    Filter(FilterRef),
}

/// A resolved connection between two node ports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Edge {
    pub(crate) from: usize,
    pub(crate) from_port: String,
    pub(crate) to: usize,
    pub(crate) to_port: String,
}

/// An immutable, validated filter graph.
#[derive(Debug)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) order: Vec<usize>,
}

/// The outcome of a partial-tolerant run: emitted sinks plus, for every
/// sink a failing branch starved, the originating error.
pub struct GraphOutcome {
    pub outputs: BTreeMap<String, Value>,
    pub failures: BTreeMap<String, Error>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Declare an external input carrying images.
    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.nodes
            .push((name.into(), NodeDef::Source { kind: ValueKind::Image }));
        self
    }

    /// Declare an external input of an explicit value kind.
    pub fn source_of(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.nodes.push((name.into(), NodeDef::Source { kind }));
        self
    }

    /// Declare an external output.
    pub fn sink(mut self, name: impl Into<String>) -> Self {
        self.nodes.push((name.into(), NodeDef::Sink));
        self
    }

    /// Declare a filter node.
    pub fn filter(mut self, name: impl Into<String>, filter: FilterRef) -> Self {
        self.nodes.push((name.into(), NodeDef::Filter(filter)));
        self
    }

    /// Connect default ports; endpoint syntax `node` or `node.port`.
    pub fn connect(mut self, from: &str, to: &str) -> Self {
        let (from_node, from_port) = split_endpoint(from);
        let (to_node, to_port) = split_endpoint(to);
        self.connections.push(RawConnection {
            from_node,
            from_port,
            to_node,
            to_port,
        });
        self
    }

    /// Connect explicit ports.
    pub fn connect_ports(
        mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Self {
        self.connections.push(RawConnection {
            from_node: from_node.to_owned(),
            from_port: Some(from_port.to_owned()),
            to_node: to_node.to_owned(),
            to_port: Some(to_port.to_owned()),
        });
        self
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<Graph> {
        let mut by_name = BTreeMap::new();
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (index, (name, def)) in self.nodes.into_iter().enumerate() {
            if by_name.insert(name.clone(), index).is_some() {
                return Err(Error::graph(format!("duplicate node name `{}`", name)));
            }
            let kind = match def {
                NodeDef::Source { kind } => NodeKind::Source { kind },
                NodeDef::Sink => NodeKind::Sink,
                NodeDef::Filter(filter) => NodeKind::Filter(filter),
            };
            nodes.push(Node { name, kind });
        }

        let has_source = nodes
            .iter()
            .any(|node| matches!(node.kind, NodeKind::Source { .. }));
        let has_sink = nodes.iter().any(|node| matches!(node.kind, NodeKind::Sink));
        if !has_source || !has_sink {
            return Err(Error::graph("a graph needs at least one source and one sink"));
        }

        // Resolve and type-check every connection.
        let mut edges: Vec<Edge> = Vec::with_capacity(self.connections.len());
        for connection in &self.connections {
            let from = *by_name.get(&connection.from_node).ok_or_else(|| {
                Error::graph(format!("unknown node `{}`", connection.from_node))
            })?;
            let to = *by_name.get(&connection.to_node).ok_or_else(|| {
                Error::graph(format!("unknown node `{}`", connection.to_node))
            })?;

            let (from_port, from_kind) =
                resolve_output(&nodes[from], connection.from_port.as_deref())?;
            let (to_port, to_kind) = resolve_input(&nodes[to], connection.to_port.as_deref())?;

            if let Some(expected) = to_kind {
                if from_kind != expected {
                    return Err(Error::graph(format!(
                        "type mismatch on `{}`.`{}` -> `{}`.`{}`: {} into {}",
                        nodes[from].name,
                        from_port,
                        nodes[to].name,
                        to_port,
                        from_kind.name(),
                        expected.name(),
                    )));
                }
            }

            if edges
                .iter()
                .any(|edge| edge.to == to && edge.to_port == to_port)
            {
                return Err(Error::graph(format!(
                    "port `{}`.`{}` is bound twice",
                    nodes[to].name, to_port
                )));
            }

            edges.push(Edge {
                from,
                from_port,
                to,
                to_port,
            });
        }

        // Port coverage: every required filter input, every sink.
        for (index, node) in nodes.iter().enumerate() {
            match &node.kind {
                NodeKind::Filter(filter) => {
                    for port in filter.ports().inputs.iter().filter(|port| port.required) {
                        let bound = edges
                            .iter()
                            .any(|edge| edge.to == index && edge.to_port == port.name);
                        if !bound {
                            return Err(Error::graph(format!(
                                "required port `{}`.`{}` is unbound",
                                node.name, port.name
                            )));
                        }
                    }
                }
                NodeKind::Sink => {
                    let inbound = edges.iter().filter(|edge| edge.to == index).count();
                    if inbound != 1 {
                        return Err(Error::graph(format!(
                            "sink `{}` needs exactly one inbound connection, found {}",
                            node.name, inbound
                        )));
                    }
                }
                NodeKind::Source { .. } => {
                    if edges.iter().any(|edge| edge.to == index) {
                        return Err(Error::graph(format!(
                            "source `{}` cannot have inbound connections",
                            node.name
                        )));
                    }
                }
            }
        }

        // Acyclicity, and the execution order as a byproduct.
        let order = topological_order(nodes.len(), &edges)
            .ok_or_else(|| Error::graph("the graph contains a cycle"))?;

        log::debug!(
            "built graph: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );
        Ok(Graph {
            nodes,
            edges,
            order,
        })
    }
}

fn split_endpoint(text: &str) -> (String, Option<String>) {
    match text.split_once('.') {
        Some((node, port)) => (node.to_owned(), Some(port.to_owned())),
        None => (text.to_owned(), None),
    }
}

/// The outgoing port of a node, with its value kind.
fn resolve_output(node: &Node, port: Option<&str>) -> Result<(String, ValueKind)> {
    match &node.kind {
        NodeKind::Source { kind } => {
            let port = port.unwrap_or("output");
            if port != "output" {
                return Err(Error::graph(format!(
                    "source `{}` has no output port `{}`",
                    node.name, port
                )));
            }
            Ok((port.to_owned(), *kind))
        }
        NodeKind::Sink => Err(Error::graph(format!(
            "sink `{}` cannot be a connection origin",
            node.name
        ))),
        NodeKind::Filter(filter) => {
            let schema = filter.ports();
            let resolved = match port {
                Some(name) => schema.output(name),
                None => schema.default_output(),
            }
            .ok_or_else(|| {
                Error::graph(format!(
                    "filter `{}` has no output port `{}`",
                    node.name,
                    port.unwrap_or("<default>")
                ))
            })?;
            Ok((resolved.name.to_owned(), resolved.kind))
        }
    }
}

/// The inbound port of a node; `None` kind means "accepts anything"
/// (sinks).
fn resolve_input(node: &Node, port: Option<&str>) -> Result<(String, Option<ValueKind>)> {
    match &node.kind {
        NodeKind::Source { .. } => Err(Error::graph(format!(
            "source `{}` cannot be a connection target",
            node.name
        ))),
        NodeKind::Sink => {
            let port = port.unwrap_or("input");
            if port != "input" {
                return Err(Error::graph(format!(
                    "sink `{}` has no input port `{}`",
                    node.name, port
                )));
            }
            Ok((port.to_owned(), None))
        }
        NodeKind::Filter(filter) => {
            let schema = filter.ports();
            let resolved = match port {
                Some(name) => schema.input(name),
                None => schema.primary_input(),
            }
            .ok_or_else(|| {
                Error::graph(format!(
                    "filter `{}` has no input port `{}`",
                    node.name,
                    port.unwrap_or("<default>")
                ))
            })?;
            Ok((resolved.name.to_owned(), Some(resolved.kind)))
        }
    }
}

/// Kahn's algorithm; stable by node index for deterministic order.
fn topological_order(count: usize, edges: &[Edge]) -> Option<Vec<usize>> {
    let mut indegree = vec![0usize; count];
    for edge in edges {
        indegree[edge.to] += 1;
    }
    let mut ready: VecDeque<usize> = (0..count).filter(|&index| indegree[index] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(index) = ready.pop_front() {
        order.push(index);
        for edge in edges.iter().filter(|edge| edge.from == index) {
            indegree[edge.to] -= 1;
            if indegree[edge.to] == 0 {
                ready.push_back(edge.to);
            }
        }
    }
    if order.len() == count {
        Some(order)
    } else {
        None
    }
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Lower a pipeline into the equivalent linear graph.
    pub fn from_pipeline(pipeline: &Pipeline) -> Result<Graph> {
        let mut builder = Graph::builder().source("source");
        let mut previous = "source".to_owned();
        for (index, filter) in pipeline.filters().iter().enumerate() {
            let name = format!("stage{}", index);
            builder = builder
                .filter(name.clone(), filter.clone())
                .connect(&previous, &name);
            previous = name;
        }
        builder.sink("sink").connect(&previous, "sink").build()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Names of all sources, in declaration order.
    pub fn source_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Source { .. }))
            .map(|node| node.name.as_str())
            .collect()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Sink))
            .map(|node| node.name.as_str())
            .collect()
    }

    pub(crate) fn in_edges(&self, node: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.to == node)
    }

    pub(crate) fn out_edges(&self, node: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.from == node)
    }

    /// Execute, failing on the first error.
    pub fn apply(
        &self,
        sources: BTreeMap<String, Value>,
        ctx: &Context,
    ) -> Result<BTreeMap<String, Value>> {
        let outcome = self.apply_partial(sources, ctx)?;
        if let Some((sink, error)) = outcome.failures.into_iter().next() {
            log::debug!("graph sink `{}` failed: {}", sink, error);
            return Err(error);
        }
        Ok(outcome.outputs)
    }

    /// Execute with partial tolerance: emitted sinks are reported next to
    /// the failures that starved the others.
    ///
    /// The outer `Result` covers binding errors (missing or ill-typed
    /// source values), which refuse the whole run.
    pub fn apply_partial(
        &self,
        mut sources: BTreeMap<String, Value>,
        ctx: &Context,
    ) -> Result<GraphOutcome> {
        // Computed values per (node, port); failures per node.
        let mut values: BTreeMap<(usize, String), Value> = BTreeMap::new();
        let mut failed: BTreeMap<usize, Error> = BTreeMap::new();
        let mut outputs = BTreeMap::new();
        let mut failures = BTreeMap::new();

        for &index in &self.order {
            let node = &self.nodes[index];
            match &node.kind {
                NodeKind::Source { kind } => {
                    let value = sources.remove(&node.name).ok_or_else(|| {
                        Error::invalid_argument(
                            "sources",
                            format!("no value bound for source `{}`", node.name),
                        )
                    })?;
                    if value.kind() != *kind {
                        return Err(Error::invalid_argument(
                            "sources",
                            format!(
                                "source `{}` expects {}, got {}",
                                node.name,
                                kind.name(),
                                value.kind().name()
                            ),
                        ));
                    }
                    values.insert((index, "output".to_owned()), value);
                }
                NodeKind::Filter(filter) => {
                    // A combiner fires only when every bound input
                    // materialized; a failed upstream poisons this node.
                    let mut inputs = PortValues::new();
                    let mut upstream_failure: Option<Error> = None;
                    for edge in self.in_edges(index) {
                        if let Some(error) = failed.get(&edge.from) {
                            upstream_failure = Some(error.duplicate());
                            break;
                        }
                        if let Some(value) = values.get(&(edge.from, edge.from_port.clone())) {
                            inputs.insert(&edge.to_port, value.clone());
                        }
                    }
                    if let Some(error) = upstream_failure {
                        failed.insert(index, error);
                        continue;
                    }
                    if let Err(error) = ctx.check_cancelled() {
                        failed.insert(index, error);
                        continue;
                    }
                    log::trace!("graph node `{}` ({})", node.name, filter.kind());
                    match filter.apply_multi(inputs, ctx) {
                        Ok(produced) => {
                            for (port, value) in produced {
                                values.insert((index, port), value);
                            }
                        }
                        Err(error) => {
                            log::debug!("graph node `{}` failed: {}", node.name, error);
                            failed.insert(index, error);
                        }
                    }
                }
                NodeKind::Sink => {
                    // Validation guarantees exactly one inbound edge.
                    let edge = match self.in_edges(index).next() {
                        Some(edge) => edge,
                        None => continue,
                    };
                    if let Some(error) = failed.get(&edge.from) {
                        failures.insert(node.name.clone(), error.duplicate());
                    } else if let Some(value) =
                        values.get(&(edge.from, edge.from_port.clone()))
                    {
                        outputs.insert(node.name.clone(), value.clone());
                    } else {
                        failures.insert(
                            node.name.clone(),
                            Error::graph(format!(
                                "no value materialized for sink `{}`",
                                node.name
                            )),
                        );
                    }
                }
            }
        }

        Ok(GraphOutcome { outputs, failures })
    }

    /// Wrap a single-image-source, single-sink graph as a filter.
    pub fn into_filter(self) -> Result<FilterRef> {
        let sources = self.source_names();
        let sinks = self.sink_names();
        if sources.len() != 1 || sinks.len() != 1 {
            return Err(Error::graph(
                "only a graph with exactly one source and one sink can act as a filter",
            ));
        }
        let source = sources[0].to_owned();
        let sink = sinks[0].to_owned();
        Ok(Arc::new(GraphFilter {
            graph: Arc::new(self),
            source,
            sink,
        }))
    }
}

/// A graph behind the filter contract.
pub(crate) struct GraphFilter {
    pub(crate) graph: Arc<Graph>,
    source: String,
    sink: String,
}

impl Filter for GraphFilter {
    fn kind(&self) -> &'static str {
        "graph"
    }

    fn ports(&self) -> PortSchema {
        PortSchema::unary_image()
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        crate::filter::all_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        crate::ser::graph_to_doc_body(&self.graph)
    }

    fn apply(&self, image: &Image, ctx: &Context) -> Result<Image> {
        let mut sources = BTreeMap::new();
        sources.insert(self.source.clone(), Value::Image(image.clone()));
        let mut outputs = self.graph.apply(sources, ctx)?;
        match outputs.remove(&self.sink) {
            Some(Value::Image(image)) => Ok(image),
            Some(other) => Err(Error::invalid_argument(
                "sink",
                format!("sink produced {}, expected image", other.kind().name()),
            )),
            None => Err(Error::graph(format!("sink `{}` produced no value", self.sink))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ops::point::Invert;

    fn invert() -> FilterRef {
        Arc::new(Invert::new())
    }

    #[test]
    fn cycle_is_refused() {
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
    fn double_binding_is_refused() {
        let err = Graph::builder()
            .source("source")
            .filter("a", invert())
            .sink("sink")
            .connect("source", "a")
            .connect("source", "a")
            .connect("a", "sink")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphInvalid);
    }

    #[test]
    fn unbound_port_is_refused() {
        let err = Graph::builder()
            .source("source")
            .filter("a", invert())
            .sink("sink")
            .connect("a", "sink")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphInvalid);
    }

    #[test]
    fn missing_sink_binding_is_refused() {
        let err = Graph::builder()
            .source("source")
            .filter("a", invert())
            .sink("sink")
            .connect("source", "a")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphInvalid);
    }
}
