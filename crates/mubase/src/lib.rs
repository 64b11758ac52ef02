//! Persistent semantic code graph: construction, storage, traversal, and
//! query kernel.
//!
//! Language-specific front ends extract source into a neutral module
//! model ([`model`]); this crate turns that model into a typed graph and
//! serves reads over it:
//!
//! - [`GraphBuilder`] — four-pass construction of nodes and edges from
//!   module models (imports, declarations, calls, type uses)
//! - [`GraphStore`] — `SQLite`-backed storage with indexed lookups,
//!   bounded dependency walks, and single-writer/multi-reader locking
//! - [`GraphManager`] — in-memory snapshot for whole-graph traversal
//!   (impact, ancestors) and cycle detection
//! - [`NodeResolver`] — scored disambiguation of free-form node
//!   references
//! - [`muql`] — a query language compiled to parameterized SQL
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use mubase::{GraphBuilder, GraphManager, GraphStore, ModuleModel};
//!
//! # fn main() -> mubase::Result<()> {
//! let modules: Vec<ModuleModel> =
//!     serde_json::from_str(&std::fs::read_to_string("modules.json")?)
//!         .map_err(|e| mubase::Error::InvalidInput(e.to_string()))?;
//!
//! let (nodes, edges) = GraphBuilder::new().build(&modules);
//!
//! let mut store = GraphStore::open(Path::new("graph.db"))?;
//! store.replace(&nodes, &edges)?;
//!
//! let manager = GraphManager::load(&store)?;
//! for cycle in manager.find_cycles(None) {
//!     println!("cycle: {}", cycle.join(" -> "));
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
pub mod manager;
pub mod model;
pub mod muql;
pub mod resolver;
pub mod store;
pub mod types;

pub use builder::{BuildOptions, GraphBuilder};
pub use error::{Error, Result};
pub use manager::{DEFAULT_CYCLE_EDGES, GraphManager};
pub use model::{CallSite, ClassModel, FunctionModel, ImportModel, ModuleModel, Parameter};
pub use muql::{QueryEngine, QueryOutput};
pub use resolver::{
    Candidate, Chooser, MatchKind, NodeResolver, Resolution, ResolutionStrategy,
};
pub use store::{GraphStats, GraphStore};
pub use types::{Edge, EdgeType, Node, NodeType, ids};
