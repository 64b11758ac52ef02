//! MUQL: a small query language over the graph.
//!
//! A query flows through three stages with hard boundaries:
//!
//! 1. [`parser`] — tokenize and parse into a [`Statement`]; a bare `;`
//!    outside a quoted literal is rejected at the lexer.
//! 2. [`plan`] — translate the statement into a [`Plan`]; relational
//!    plans carry SQL text assembled from fixed fragments plus an ordered
//!    parameter list holding every literal value.
//! 3. [`engine`] — execute the plan; failures during execution are
//!    [`QueryOutput::Failed`] values, not errors.
//!
//! ```no_run
//! use mubase::{GraphStore, muql::QueryEngine};
//!
//! # fn main() -> mubase::Result<()> {
//! let store = GraphStore::open_read_only(std::path::Path::new("graph.db"))?;
//! let engine = QueryEngine::new(&store);
//! let output = engine.run("SELECT * FROM functions WHERE complexity > 10")?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod parser;
pub mod plan;
pub mod token;

pub use engine::{QueryEngine, QueryOutput};
pub use parser::{Statement, parse};
pub use plan::{Plan, SqlParam, plan};
