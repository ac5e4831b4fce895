//! Reader for the DOT subset written by LLVM's `dot-cfg` printer.
//!
//! Only the pieces needed to recover the shape of a control-flow graph are
//! interpreted: node statements become blocks, edge statements become edges
//! (ports such as `Node0x1:s0` are dropped). Graph-level attributes and
//! default-attribute statements (`node [...]`) are skipped.

use crate::graph::{DiGraph, NodeIndex};

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, opt},
    error::{ErrorKind, ParseError, VerboseError},
    multi::many0,
    sequence::{preceded, terminated},
};
use std::collections::HashMap;
use thiserror::Error;

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DotError {
    #[error("malformed graph description near `{0}`")]
    Syntax(String),
    #[error("unexpected trailing input `{0}`")]
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub label: Option<String>,
}

/// A control-flow graph recovered from a graph description.
#[derive(Debug, Clone)]
pub struct Cfg {
    title: Option<String>,
    graph: DiGraph<Block, ()>,
}

impl Cfg {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn graph(&self) -> &DiGraph<Block, ()> {
        &self.graph
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// McCabe complexity `E - N + 2` of a single connected routine.
    pub fn cyclomatic_complexity(&self) -> usize {
        if self.block_count() == 0 {
            return 0;
        }
        (self.edge_count() + 2).saturating_sub(self.block_count())
    }

    /// Blocks that cannot be reached from the entry block (the first one).
    pub fn unreachable_blocks(&self) -> usize {
        self.block_count() - self.graph.reachable_from(0).len()
    }
}

enum Stmt {
    Node(String, Vec<(String, String)>),
    Edge(String, String),
    Attr,
}

pub fn parse(input: &str) -> Result<Cfg, DotError> {
    match parse_digraph(input) {
        Ok((rest, cfg)) => {
            if rest.trim().is_empty() {
                Ok(cfg)
            } else {
                Err(DotError::Unexpected(excerpt(rest)))
            }
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let near = e.errors.first().map(|(i, _)| excerpt(i)).unwrap_or_default();
            Err(DotError::Syntax(near))
        },
        Err(nom::Err::Incomplete(_)) => Err(DotError::Syntax(String::new())),
    }
}

fn excerpt(input: &str) -> String {
    input.trim_start().chars().take(32).collect()
}

fn parse_digraph(input: &str) -> PResult<Cfg> {
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(terminated(tag("strict"), multispace1))(input)?;
    let (input, _) = tag("digraph")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, title) = opt(parse_id)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('{')(input)?;
    let (input, stmts) = many0(parse_stmt)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('}')(input)?;

    let mut graph: DiGraph<Block, ()> = DiGraph::new();
    let mut index: HashMap<String, NodeIndex> = HashMap::new();
    for stmt in stmts {
        match stmt {
            Stmt::Attr => {},
            Stmt::Node(id, attrs) => {
                if matches!(id.as_str(), "node" | "edge" | "graph") {
                    continue;
                }
                let block_label = attrs.into_iter().find(|(k, _)| k == "label").map(|(_, v)| v);
                match index.get(&id) {
                    Some(&u) => {
                        // declared after an edge already mentioned it
                        if block_label.is_some() {
                            graph.node_weight_mut(u).label = block_label;
                        }
                    },
                    None => {
                        let u = graph.add_node(Block { id: id.clone(), label: block_label });
                        index.insert(id, u);
                    },
                }
            },
            Stmt::Edge(from, to) => {
                let u = node_for(&mut graph, &mut index, from);
                let v = node_for(&mut graph, &mut index, to);
                graph.add_edge(u, v, ());
            },
        }
    }

    Ok((input, Cfg { title, graph }))
}

fn node_for(graph: &mut DiGraph<Block, ()>, index: &mut HashMap<String, NodeIndex>, id: String) -> NodeIndex {
    if let Some(&u) = index.get(&id) {
        return u;
    }
    let u = graph.add_node(Block { id: id.clone(), label: None });
    index.insert(id, u);
    u
}

fn parse_stmt(input: &str) -> PResult<Stmt> {
    let (input, _) = multispace0(input)?;
    let (input, from) = parse_endpoint(input)?;
    let (input, _) = multispace0(input)?;

    if let Ok((input, _)) = tag::<_, _, VerboseError<&str>>("->")(input) {
        let (input, _) = multispace0(input)?;
        let (input, to) = parse_endpoint(input)?;
        let (input, _) = multispace0(input)?;
        let (input, _) = opt(parse_attr_list)(input)?;
        let (input, _) = parse_stmt_end(input)?;
        return Ok((input, Stmt::Edge(from, to)));
    }

    if let Ok((input, _)) = char::<_, VerboseError<&str>>('=')(input) {
        let (input, _) = multispace0(input)?;
        let (input, _) = parse_id(input)?;
        let (input, _) = parse_stmt_end(input)?;
        return Ok((input, Stmt::Attr));
    }

    let (input, attrs) = opt(parse_attr_list)(input)?;
    let (input, _) = parse_stmt_end(input)?;
    Ok((input, Stmt::Node(from, attrs.unwrap_or_default())))
}

fn parse_stmt_end(input: &str) -> PResult<()> {
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(char(';'))(input)?;
    Ok((input, ()))
}

/// A node id with an optional port suffix, which is discarded.
fn parse_endpoint(input: &str) -> PResult<String> {
    let (input, id) = parse_id(input)?;
    let (input, _) = many0(preceded(char(':'), parse_ident))(input)?;
    Ok((input, id))
}

fn parse_attr_list(input: &str) -> PResult<Vec<(String, String)>> {
    let (input, _) = char('[')(input)?;
    let (input, attrs) = many0(preceded(parse_attr_sep, parse_attr))(input)?;
    let (input, _) = parse_attr_sep(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, attrs))
}

fn parse_attr_sep(input: &str) -> PResult<()> {
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(alt((char(','), char(';'))))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, ()))
}

fn parse_attr(input: &str) -> PResult<(String, String)> {
    let (input, key) = parse_ident(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = parse_id(input)?;
    Ok((input, (key.to_string(), value)))
}

fn parse_id(input: &str) -> PResult<String> {
    alt((parse_quoted, map(parse_ident, String::from)))(input)
}

fn parse_ident(input: &str) -> PResult<&str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.')(input)
}

fn parse_quoted(input: &str) -> PResult<String> {
    let (rest, _) = char('"')(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[i + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'l')) | Some((_, 'n')) | Some((_, 'r')) => out.push('\n'),
                Some((_, e)) => out.push(e),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(nom::Err::Error(VerboseError::from_error_kind(input, ErrorKind::Char)))
}
