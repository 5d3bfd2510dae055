//! The compact textual surface for filters, pipelines, and graphs.
//!
//! ```text
//! stmt_list := stmt (sep stmt)*
//! sep       := ';' | '|'
//! stmt      := node_def | filter_call
//! node_def  := '[' ident ':' filter_call ']'
//! filter_call := ident (WS arg)*
//! arg       := kv | value
//! kv        := ident '=' value
//! value     := number | bool | string | color | ref | tuple
//! ```
//!
//! Positional arguments bind to the filter's parameter record in
//! declaration order; `key=value` binds by name. A bare identifier in
//! argument position references another node's default output (or
//! `name.port` a named output); an identifier that names no node is taken
//! as a string parameter. The names `source`, `source_a` and `source_b`
//! are implicit graph sources. A statement list without node definitions
//! or references parses to a [`Pipeline`]; anything else becomes a
//! [`Graph`] wired in statement order with an implicit sink on the last
//! statement.
use std::collections::BTreeSet;

use serde_json::{json, Map, Value as Doc};

use crate::error::{Error, Result};
use crate::filter::FilterRef;
use crate::graph::{Graph, GraphBuilder};
use crate::pipeline::Pipeline;
use crate::registry;

/// The parse result: the DSL yields either form.
#[derive(Debug)]
pub enum DslProgram {
    Pipeline(Pipeline),
    Graph(Graph),
}

impl DslProgram {
    /// Both forms behind the filter contract. Graphs must have a single
    /// source and sink, which DSL-built graphs always do.
    pub fn into_filter(self) -> Result<FilterRef> {
        match self {
            DslProgram::Pipeline(pipeline) => Ok(pipeline.into_ref()),
            DslProgram::Graph(graph) => graph.into_filter(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Color(String),
    Punct(char),
}

#[derive(Clone, Debug, PartialEq)]
enum ArgValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Color(String),
    Ref { node: String, port: Option<String> },
    Tuple(Vec<ArgValue>),
}

#[derive(Clone, Debug)]
enum Arg {
    Positional(ArgValue),
    Named(String, ArgValue),
}

#[derive(Clone, Debug)]
struct Statement {
    name: Option<String>,
    kind: String,
    args: Vec<Arg>,
}

fn parse_error(what: String, line: usize, column: usize) -> Error {
    Error::invalid_argument("dsl", format!("{} at line {}, column {}", what, line, column))
}

struct Tokenizer<'a> {
    text: &'a str,
    at: usize,
    line: usize,
    column: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Tokenizer {
            text,
            at: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.at..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.at += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn tokens(mut self) -> Result<Vec<(Token, usize, usize)>> {
        let mut out = Vec::new();
        loop {
            while matches!(self.peek_char(), Some(ch) if ch.is_whitespace()) {
                self.bump();
            }
            // Comments run to end of line.
            if self.peek_char() == Some('#')
                && self.text[self.at..]
                    .chars()
                    .nth(1)
                    .map_or(true, |ch| !ch.is_ascii_hexdigit())
            {
                while matches!(self.peek_char(), Some(ch) if ch != '\n') {
                    self.bump();
                }
                continue;
            }
            let (line, column) = (self.line, self.column);
            let ch = match self.peek_char() {
                Some(ch) => ch,
                None => return Ok(out),
            };
            let token = match ch {
                ';' | '|' | '[' | ']' | ':' | '=' | ',' | '(' | ')' => {
                    self.bump();
                    Token::Punct(ch)
                }
                '#' => {
                    self.bump();
                    let mut hex = String::new();
                    while matches!(self.peek_char(), Some(ch) if ch.is_ascii_hexdigit()) {
                        hex.push(self.bump().unwrap_or_default());
                    }
                    if hex.len() != 6 && hex.len() != 8 {
                        return Err(parse_error(
                            format!("malformed color `#{}`", hex),
                            line,
                            column,
                        ));
                    }
                    Token::Color(format!("#{}", hex.to_ascii_lowercase()))
                }
                '"' => {
                    self.bump();
                    let mut text = String::new();
                    loop {
                        match self.bump() {
                            Some('"') => break,
                            Some('\\') => match self.bump() {
                                Some(escaped) => text.push(escaped),
                                None => {
                                    return Err(parse_error(
                                        "unterminated string".to_owned(),
                                        line,
                                        column,
                                    ))
                                }
                            },
                            Some(ch) => text.push(ch),
                            None => {
                                return Err(parse_error(
                                    "unterminated string".to_owned(),
                                    line,
                                    column,
                                ))
                            }
                        }
                    }
                    Token::Str(text)
                }
                ch if ch.is_ascii_digit() || ch == '-' || ch == '+' => {
                    let mut literal = String::new();
                    literal.push(self.bump().unwrap_or_default());
                    while matches!(
                        self.peek_char(),
                        Some(ch) if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || ch == '-' || ch == '+'
                    ) {
                        // A sign only continues a number after an exponent.
                        if matches!(self.peek_char(), Some('-') | Some('+'))
                            && !matches!(literal.chars().last(), Some('e') | Some('E'))
                        {
                            break;
                        }
                        literal.push(self.bump().unwrap_or_default());
                    }
                    let value = literal.parse::<f64>().map_err(|_| {
                        parse_error(format!("malformed number `{}`", literal), line, column)
                    })?;
                    Token::Number(value)
                }
                ch if ch.is_ascii_alphabetic() || ch == '_' => {
                    let mut ident = String::new();
                    while matches!(
                        self.peek_char(),
                        Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
                    ) {
                        ident.push(self.bump().unwrap_or_default());
                    }
                    Token::Ident(ident)
                }
                other => {
                    return Err(parse_error(
                        format!("unexpected character `{}`", other),
                        line,
                        column,
                    ))
                }
            };
            out.push((token, line, column));
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize, usize)>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.at).map(|(token, _, _)| token)
    }

    fn position(&self) -> (usize, usize) {
        self.tokens
            .get(self.at.min(self.tokens.len().saturating_sub(1)))
            .map(|&(_, line, column)| (line, column))
            .unwrap_or((1, 1))
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.at).map(|(token, _, _)| token.clone());
        self.at += 1;
        token
    }

    fn expect_punct(&mut self, expected: char) -> Result<()> {
        let (line, column) = self.position();
        match self.bump() {
            Some(Token::Punct(ch)) if ch == expected => Ok(()),
            other => Err(parse_error(
                format!("expected `{}`, found {:?}", expected, other),
                line,
                column,
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        let (line, column) = self.position();
        match self.bump() {
            Some(Token::Ident(ident)) => Ok(ident),
            other => Err(parse_error(
                format!("expected identifier, found {:?}", other),
                line,
                column,
            )),
        }
    }

    fn statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            // Skip stray separators.
            while matches!(self.peek(), Some(Token::Punct(';')) | Some(Token::Punct('|'))) {
                self.bump();
            }
            if self.peek().is_none() {
                return Ok(statements);
            }
            statements.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        if matches!(self.peek(), Some(Token::Punct('['))) {
            self.bump();
            let name = self.expect_ident()?;
            self.expect_punct(':')?;
            let (kind, args) = self.filter_call()?;
            self.expect_punct(']')?;
            return Ok(Statement {
                name: Some(name),
                kind,
                args,
            });
        }
        let (kind, args) = self.filter_call()?;
        Ok(Statement {
            name: None,
            kind,
            args,
        })
    }

    fn filter_call(&mut self) -> Result<(String, Vec<Arg>)> {
        let kind = self.expect_ident()?;
        let mut args = Vec::new();
        loop {
            match self.peek() {
                None
                | Some(Token::Punct(';'))
                | Some(Token::Punct('|'))
                | Some(Token::Punct(']')) => break,
                Some(Token::Ident(_)) => {
                    // Either `key=value` or a bare reference/string.
                    let ident = self.expect_ident()?;
                    if matches!(self.peek(), Some(Token::Punct('='))) {
                        self.bump();
                        let value = self.value()?;
                        args.push(Arg::Named(ident, value));
                    } else {
                        args.push(Arg::Positional(ident_value(&ident)));
                    }
                }
                _ => {
                    let value = self.value()?;
                    args.push(Arg::Positional(value));
                }
            }
        }
        Ok((kind, args))
    }

    fn value(&mut self) -> Result<ArgValue> {
        let first = self.scalar()?;
        // A comma continues a tuple.
        if matches!(self.peek(), Some(Token::Punct(','))) {
            let mut items = vec![first];
            while matches!(self.peek(), Some(Token::Punct(','))) {
                self.bump();
                items.push(self.scalar()?);
            }
            return Ok(ArgValue::Tuple(items));
        }
        Ok(first)
    }

    fn scalar(&mut self) -> Result<ArgValue> {
        let (line, column) = self.position();
        match self.bump() {
            Some(Token::Number(value)) => Ok(ArgValue::Number(value)),
            Some(Token::Str(text)) => Ok(ArgValue::Text(text)),
            Some(Token::Color(color)) => Ok(ArgValue::Color(color)),
            Some(Token::Ident(ident)) => Ok(ident_value(&ident)),
            // Parenthesized tuples are tolerated for readability.
            Some(Token::Punct('(')) => {
                let mut items = vec![self.scalar()?];
                while matches!(self.peek(), Some(Token::Punct(','))) {
                    self.bump();
                    items.push(self.scalar()?);
                }
                self.expect_punct(')')?;
                if items.len() == 1 {
                    Ok(items.pop().unwrap_or(ArgValue::Number(0.0)))
                } else {
                    Ok(ArgValue::Tuple(items))
                }
            }
            other => Err(parse_error(
                format!("expected a value, found {:?}", other),
                line,
                column,
            )),
        }
    }
}

fn ident_value(ident: &str) -> ArgValue {
    match ident {
        "true" => ArgValue::Bool(true),
        "false" => ArgValue::Bool(false),
        _ => match ident.split_once('.') {
            Some((node, port)) => ArgValue::Ref {
                node: node.to_owned(),
                port: Some(port.to_owned()),
            },
            None => ArgValue::Ref {
                node: ident.to_owned(),
                port: None,
            },
        },
    }
}

fn doc_of(value: &ArgValue) -> Doc {
    match value {
        ArgValue::Number(number) => number_doc(*number),
        ArgValue::Bool(flag) => Doc::from(*flag),
        ArgValue::Text(text) => Doc::from(text.as_str()),
        ArgValue::Color(color) => Doc::from(color.as_str()),
        // A reference that did not resolve to a node reads as a string
        // parameter (e.g. `interpolation=nearest`).
        ArgValue::Ref { node, port } => match port {
            Some(port) => Doc::from(format!("{}.{}", node, port)),
            None => Doc::from(node.as_str()),
        },
        ArgValue::Tuple(items) => Doc::Array(items.iter().map(doc_of).collect()),
    }
}

fn number_doc(value: f64) -> Doc {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        if value >= 0.0 {
            json!(value as u64)
        } else {
            json!(value as i64)
        }
    } else {
        json!(value)
    }
}

const IMPLICIT_SOURCES: [&str; 3] = ["source", "source_a", "source_b"];

/// Parse a DSL program.
pub fn parse(text: &str) -> Result<DslProgram> {
    let tokens = Tokenizer::new(text).tokens()?;
    let mut parser = Parser { tokens, at: 0 };
    let statements = parser.statements()?;
    if statements.is_empty() {
        return Ok(DslProgram::Pipeline(Pipeline::empty()));
    }

    let node_names: BTreeSet<&str> = statements
        .iter()
        .filter_map(|statement| statement.name.as_deref())
        .collect();

    // A reference is an identifier that names a statement or an implicit
    // source; everything else stays a string parameter.
    let is_reference = |value: &ArgValue| -> bool {
        match value {
            ArgValue::Ref { node, .. } => {
                node_names.contains(node.as_str()) || IMPLICIT_SOURCES.contains(&node.as_str())
            }
            _ => false,
        }
    };

    let uses_graph_features = statements.iter().any(|statement| {
        statement.name.is_some()
            || statement.args.iter().any(|arg| match arg {
                Arg::Positional(value) | Arg::Named(_, value) => is_reference(value),
            })
    });

    if !uses_graph_features {
        let mut pipeline = Pipeline::empty();
        for statement in &statements {
            pipeline.push(build_statement_filter(statement, &[])?);
        }
        return Ok(DslProgram::Pipeline(pipeline));
    }

    // Graph form: every statement becomes a node, wired in order, with an
    // implicit sink on the last statement.
    let mut builder = GraphBuilder::new();
    let mut used_sources = BTreeSet::new();
    let mut auto_names = Vec::with_capacity(statements.len());
    for (index, statement) in statements.iter().enumerate() {
        let name = statement
            .name
            .clone()
            .unwrap_or_else(|| format!("n{}", index));
        auto_names.push(name);
    }

    let mut previous: Option<String> = None;
    for (index, statement) in statements.iter().enumerate() {
        let name = &auto_names[index];
        let filter = build_statement_filter(statement, &node_names_vec(&statements, &auto_names))?;
        let schema = filter.ports();
        builder = builder.filter(name.clone(), filter);

        // Collect connections: positional references fill input ports in
        // order; named references pick their port by key.
        let mut port_cursor = 0usize;
        let mut bound_ports: BTreeSet<String> = BTreeSet::new();
        for arg in &statement.args {
            match arg {
                Arg::Positional(value) if is_reference(value) => {
                    let port = schema
                        .inputs
                        .get(port_cursor)
                        .map(|port| port.name.to_owned())
                        .ok_or_else(|| {
                            Error::invalid_argument(
                                "dsl",
                                format!("`{}` has no free input port for a reference", statement.kind),
                            )
                        })?;
                    port_cursor += 1;
                    let endpoint = reference_endpoint(value);
                    track_source(&endpoint, &mut used_sources);
                    bound_ports.insert(port.clone());
                    builder = builder.connect(&endpoint, &format!("{}.{}", name, port));
                }
                Arg::Named(key, value) if is_reference(value) && schema.input(key).is_some() => {
                    let endpoint = reference_endpoint(value);
                    track_source(&endpoint, &mut used_sources);
                    bound_ports.insert(key.clone());
                    builder = builder.connect(&endpoint, &format!("{}.{}", name, key));
                }
                _ => {}
            }
        }

        // Chain binding: an unbound primary input takes the previous
        // statement's output, or the implicit `source`.
        if let Some(primary) = schema.primary_input() {
            if primary.required && !bound_ports.contains(primary.name) {
                let upstream = match &previous {
                    Some(previous) => previous.clone(),
                    None => {
                        used_sources.insert("source".to_owned());
                        "source".to_owned()
                    }
                };
                builder = builder.connect(&upstream, &format!("{}.{}", name, primary.name));
            }
        }

        previous = Some(name.clone());
    }

    for source in &used_sources {
        builder = builder.source(source.clone());
    }
    let last = auto_names
        .last()
        .cloned()
        .unwrap_or_else(|| "source".to_owned());
    builder = builder.sink("sink").connect(&last, "sink");

    Ok(DslProgram::Graph(builder.build()?))
}

fn node_names_vec(statements: &[Statement], auto_names: &[String]) -> Vec<String> {
    statements
        .iter()
        .zip(auto_names.iter())
        .map(|(statement, auto)| statement.name.clone().unwrap_or_else(|| auto.clone()))
        .collect()
}

fn reference_endpoint(value: &ArgValue) -> String {
    match value {
        ArgValue::Ref { node, port: Some(port) } => format!("{}.{}", node, port),
        ArgValue::Ref { node, port: None } => node.clone(),
        _ => String::new(),
    }
}

fn track_source(endpoint: &str, used: &mut BTreeSet<String>) {
    let node = endpoint.split('.').next().unwrap_or(endpoint);
    if IMPLICIT_SOURCES.contains(&node) {
        used.insert(node.to_owned());
    }
}

/// Build one statement's filter from its non-reference arguments.
fn build_statement_filter(statement: &Statement, known_nodes: &[String]) -> Result<FilterRef> {
    let registration = registry::lookup(&statement.kind).ok_or_else(|| {
        Error::invalid_argument("dsl", format!("unknown filter kind `{}`", statement.kind))
    })?;

    let is_node_ref = |value: &ArgValue| -> bool {
        match value {
            ArgValue::Ref { node, .. } => {
                known_nodes.iter().any(|known| known == node)
                    || IMPLICIT_SOURCES.contains(&node.as_str())
            }
            _ => false,
        }
    };

    let mut params = Map::new();
    let mut positional = 0usize;
    for arg in &statement.args {
        match arg {
            Arg::Positional(value) => {
                if is_node_ref(value) {
                    continue;
                }
                let key = registration.positional.get(positional).ok_or_else(|| {
                    Error::invalid_argument(
                        "dsl",
                        format!(
                            "`{}` takes at most {} positional arguments",
                            statement.kind,
                            registration.positional.len()
                        ),
                    )
                })?;
                positional += 1;
                params.insert((*key).to_owned(), doc_of(value));
            }
            Arg::Named(key, value) => {
                if is_node_ref(value) {
                    continue;
                }
                params.insert(key.clone(), doc_of(value));
            }
        }
    }
    (registration.build)(&Doc::Object(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_chain_is_a_pipeline() {
        let program = parse("gaussian_blur 1.5; threshold value=0.5").unwrap();
        match program {
            DslProgram::Pipeline(pipeline) => {
                assert_eq!(pipeline.len(), 2);
                assert_eq!(pipeline.filters()[0].kind(), "gaussian_blur");
            }
            DslProgram::Graph(_) => panic!("expected a pipeline"),
        }
    }

    #[test]
    fn pipe_separator_works() {
        let program = parse("invert | invert").unwrap();
        match program {
            DslProgram::Pipeline(pipeline) => assert_eq!(pipeline.len(), 2),
            DslProgram::Graph(_) => panic!("expected a pipeline"),
        }
    }

    #[test]
    fn named_nodes_make_a_graph() {
        let program =
            parse("[a: gaussian_blur 2.0]; [b: blend a=source_a b=a mode=multiply]").unwrap();
        match program {
            DslProgram::Graph(graph) => {
                let sources = graph.source_names();
                assert!(sources.contains(&"source") || sources.contains(&"source_a"));
                assert!(graph.sink_names().contains(&"sink"));
            }
            DslProgram::Pipeline(_) => panic!("expected a graph"),
        }
    }

    #[test]
    fn string_idents_stay_parameters() {
        let program = parse("resize size=(2,2) interpolation=nearest").unwrap();
        match program {
            DslProgram::Pipeline(pipeline) => {
                assert_eq!(pipeline.filters()[0].kind(), "resize");
            }
            DslProgram::Graph(_) => panic!("expected a pipeline"),
        }
    }

    #[test]
    fn colors_parse() {
        let program = parse("drop_shadow 4 4 2.0 color=#102030 opacity=0.5").unwrap();
        match program {
            DslProgram::Pipeline(pipeline) => {
                let doc = pipeline.filters()[0].params_doc();
                assert_eq!(doc["color"], "#102030");
            }
            DslProgram::Graph(_) => panic!("expected a pipeline"),
        }
    }

    #[test]
    fn parse_errors_carry_position() {
        let err = parse("threshold value=").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("line"));
    }
}
