//! MUQL execution.
//!
//! Parse and plan failures fail fast as [`Error::Syntax`]; execution
//! failures come back as [`QueryOutput::Failed`] values so batch and
//! interactive callers keep uniform control flow (a failed query in a
//! batch does not abort the batch).

use rusqlite::types::ValueRef;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manager::GraphManager;
use crate::resolver::NodeResolver;
use crate::store::GraphStore;
use crate::types::{Node, NodeType};

use super::parser::{Direction, Source, parse};
use super::plan::{Plan, SqlParam, plan};

/// The result of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// A successful, tabular result.
    Table {
        /// Column names, in output order.
        columns: Vec<String>,
        /// Rows of JSON values, one per column.
        rows: Vec<Vec<Value>>,
    },
    /// The query parsed and planned but failed to execute.
    Failed(String),
}

/// Executes MUQL queries against a store.
pub struct QueryEngine<'a> {
    store: &'a GraphStore,
}

impl<'a> QueryEngine<'a> {
    /// Create an engine over a store handle.
    #[must_use]
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Parse, plan, and execute one query.
    ///
    /// # Errors
    ///
    /// [`Error::Syntax`] when the query does not parse. Execution
    /// failures are not errors; they return [`QueryOutput::Failed`].
    pub fn run(&self, query: &str) -> Result<QueryOutput> {
        let statement = parse(query)?;
        let plan = plan(&statement);
        debug!(query, ?plan, "Executing query");

        let output = match plan {
            Plan::Sql { sql, params } => self.execute_sql(&sql, &params),
            Plan::Show {
                direction,
                reference,
                depth,
            } => self.execute_show(direction, &reference, depth),
            Plan::Describe { source } => self.execute_describe(source),
            Plan::Cycles => self.execute_cycles(),
        };
        Ok(output)
    }

    fn execute_sql(&self, sql: &str, params: &[SqlParam]) -> QueryOutput {
        match self.run_sql(sql, params) {
            Ok(output) => output,
            Err(e) => QueryOutput::Failed(e.to_string()),
        }
    }

    fn run_sql(&self, sql: &str, params: &[SqlParam]) -> rusqlite::Result<QueryOutput> {
        let mut stmt = self.store.connection().prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(value_ref_to_json(row.get_ref(i)?));
            }
            out.push(values);
        }

        Ok(QueryOutput::Table { columns, rows: out })
    }

    fn execute_show(&self, direction: Direction, reference: &str, depth: u32) -> QueryOutput {
        let resolver = NodeResolver::new(self.store);
        let node = match resolver.resolve(reference) {
            Ok(resolution) => resolution.node,
            Err(Error::NodeNotFound { .. }) => {
                return QueryOutput::Failed(format!("no node matches '{reference}'"));
            }
            Err(e) => return QueryOutput::Failed(e.to_string()),
        };

        let walked = match direction {
            Direction::Dependencies => self.store.get_dependencies(&node.id, depth),
            Direction::Dependents => self.store.get_dependents(&node.id, depth),
        };
        match walked {
            Ok(nodes) => node_table(&nodes),
            Err(e) => QueryOutput::Failed(e.to_string()),
        }
    }

    fn execute_describe(&self, source: Source) -> QueryOutput {
        let count = match self.store.get_nodes(source.node_type()) {
            Ok(nodes) => nodes.len(),
            Err(e) => return QueryOutput::Failed(e.to_string()),
        };

        let type_name = source.node_type().map_or("node", NodeType::as_str);
        QueryOutput::Table {
            columns: vec!["property".to_string(), "value".to_string()],
            rows: vec![
                vec![Value::from("type"), Value::from(type_name)],
                vec![Value::from("count"), Value::from(count)],
                vec![
                    Value::from("fields"),
                    Value::from(
                        "id, type, name, qualified_name, file_path, \
                         line_start, line_end, properties, complexity",
                    ),
                ],
            ],
        }
    }

    fn execute_cycles(&self) -> QueryOutput {
        let manager = match GraphManager::load(self.store) {
            Ok(manager) => manager,
            Err(e) => return QueryOutput::Failed(e.to_string()),
        };

        let cycles = manager.find_cycles(None);
        let rows = cycles
            .iter()
            .enumerate()
            .map(|(i, members)| {
                vec![
                    Value::from(i + 1),
                    Value::from(members.len()),
                    Value::from(members.join(" -> ")),
                ]
            })
            .collect();
        QueryOutput::Table {
            columns: vec![
                "cycle".to_string(),
                "size".to_string(),
                "members".to_string(),
            ],
            rows,
        }
    }
}

fn node_table(nodes: &[Node]) -> QueryOutput {
    let rows = nodes
        .iter()
        .map(|n| {
            vec![
                Value::from(n.id.clone()),
                Value::from(n.node_type.as_str()),
                Value::from(n.name.clone()),
                n.file_path.clone().map_or(Value::Null, Value::from),
                Value::from(n.complexity),
            ]
        })
        .collect();
    QueryOutput::Table {
        columns: vec![
            "id".to_string(),
            "type".to_string(),
            "name".to_string(),
            "file_path".to_string(),
            "complexity".to_string(),
        ],
        rows,
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
