//! Core graph types: nodes, edges, and the deterministic id scheme.
//!
//! Node and edge ids are stable strings derived from type, path, and name.
//! Two builds of unchanged source must produce identical ids, so the id
//! constructors here are the single source of truth for the scheme:
//!
//! - Module: `mod:<path>`
//! - Class: `cls:<path>:<ClassName>`
//! - Function: `fn:<path>:<name>`; method: `fn:<path>:<ClassName>.<name>`
//! - External package: `ext:<name>`; unresolved base: `cls:external:<name>`
//! - Edge: `edge:<source_id>:<type>:<target_id>`, with a `:<line>` suffix
//!   on CALLS edges to disambiguate multiple call sites

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of a graph node. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A source module (one file in most languages).
    Module,
    /// A class, struct, or equivalent type declaration.
    Class,
    /// A free function or method.
    Function,
    /// An entity outside the analyzed codebase (package, unresolved base).
    External,
}

impl NodeType {
    /// Storage representation of this node type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::External => "external",
        }
    }

    /// Parse the storage representation back into a node type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(Self::Module),
            "class" => Some(Self::Class),
            "function" => Some(Self::Function),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// The kind of a graph edge. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Containment: Module→Class, Module→Function, Class→Function.
    Contains,
    /// One module imports another.
    Imports,
    /// A class inherits from a base class.
    Inherits,
    /// A function calls another function (keyed by call-site line).
    Calls,
    /// A class uses another class in an annotation.
    Uses,
}

impl EdgeType {
    /// Storage representation of this edge type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::Calls => "calls",
            Self::Uses => "uses",
        }
    }

    /// Parse the storage representation back into an edge type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contains" => Some(Self::Contains),
            "imports" => Some(Self::Imports),
            "inherits" => Some(Self::Inherits),
            "calls" => Some(Self::Calls),
            "uses" => Some(Self::Uses),
            _ => None,
        }
    }
}

/// A vertex in the semantic graph.
///
/// The `properties` bag carries type-specific extras (bases, decorators,
/// parameters, docstrings, `external_deps`) and is not structurally
/// validated by the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Deterministic, stable id (see module docs for the scheme).
    pub id: String,
    /// Kind of this node.
    pub node_type: NodeType,
    /// Short name (class name, function name, module name).
    pub name: String,
    /// Dotted qualified name, when one exists.
    pub qualified_name: Option<String>,
    /// Source file path, when the node has one.
    pub file_path: Option<String>,
    /// First source line, when known.
    pub line_start: Option<u32>,
    /// Last source line, when known.
    pub line_end: Option<u32>,
    /// Open bag of type-specific properties.
    pub properties: Map<String, Value>,
    /// Cyclomatic complexity (0 for nodes where it does not apply).
    pub complexity: u32,
}

impl Node {
    /// Create a node with empty optional fields.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            qualified_name: None,
            file_path: None,
            line_start: None,
            line_end: None,
            properties: Map::new(),
            complexity: 0,
        }
    }
}

/// A typed, directed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Deterministic id derived from source, type, and target.
    pub id: String,
    /// Id of the source node.
    pub source_id: String,
    /// Id of the target node.
    pub target_id: String,
    /// Kind of this edge.
    pub edge_type: EdgeType,
    /// Open bag of edge properties (e.g. call-site `line`).
    pub properties: Map<String, Value>,
}

impl Edge {
    /// Create an edge with a deterministic id.
    #[must_use]
    pub fn new(source_id: &str, edge_type: EdgeType, target_id: &str) -> Self {
        Self {
            id: ids::edge_id(source_id, edge_type, target_id),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            edge_type,
            properties: Map::new(),
        }
    }

    /// Create a CALLS edge keyed by its call-site line.
    ///
    /// One function may call another from multiple sites, so the line
    /// number participates in the edge id.
    #[must_use]
    pub fn call(source_id: &str, target_id: &str, line: u32) -> Self {
        let mut properties = Map::new();
        properties.insert("line".to_string(), Value::from(line));
        Self {
            id: ids::call_edge_id(source_id, target_id, line),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            edge_type: EdgeType::Calls,
            properties,
        }
    }
}

/// Deterministic id constructors.
///
/// Kept together so the scheme cannot drift between builder passes.
pub mod ids {
    use super::EdgeType;

    /// Id of a module node: `mod:<path>`.
    #[must_use]
    pub fn module_id(path: &str) -> String {
        format!("mod:{path}")
    }

    /// Id of a class node: `cls:<path>:<ClassName>`.
    #[must_use]
    pub fn class_id(path: &str, name: &str) -> String {
        format!("cls:{path}:{name}")
    }

    /// Id of a top-level function node: `fn:<path>:<name>`.
    #[must_use]
    pub fn function_id(path: &str, name: &str) -> String {
        format!("fn:{path}:{name}")
    }

    /// Id of a method node: `fn:<path>:<ClassName>.<name>`.
    #[must_use]
    pub fn method_id(path: &str, class_name: &str, name: &str) -> String {
        format!("fn:{path}:{class_name}.{name}")
    }

    /// Id of an external package node: `ext:<name>`.
    #[must_use]
    pub fn external_id(name: &str) -> String {
        format!("ext:{name}")
    }

    /// Id of the placeholder class node for an unresolved base: `cls:external:<name>`.
    #[must_use]
    pub fn external_class_id(name: &str) -> String {
        format!("cls:external:{name}")
    }

    /// Id of an edge: `edge:<source_id>:<type>:<target_id>`.
    #[must_use]
    pub fn edge_id(source_id: &str, edge_type: EdgeType, target_id: &str) -> String {
        format!("edge:{source_id}:{}:{target_id}", edge_type.as_str())
    }

    /// Id of a CALLS edge, suffixed with the call-site line.
    #[must_use]
    pub fn call_edge_id(source_id: &str, target_id: &str, line: u32) -> String {
        format!(
            "edge:{source_id}:{}:{target_id}:{line}",
            EdgeType::Calls.as_str()
        )
    }
}
