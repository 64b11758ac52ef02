//! MUQL planning: AST to parameterized SQL.
//!
//! The injection defense is structural, not review-dependent: SQL text is
//! assembled by [`ParamSql`], which accepts only `&'static str` grammar
//! fragments, allow-listed field columns, and bound parameters. There is
//! no way to interpolate a runtime string into the query text through its
//! API. Every literal value — including the implicit node-type filter,
//! whose value comes from a closed trusted enum — travels as a `?`
//! placeholder with its value in the ordered parameter list.

use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;

use super::parser::{
    Analysis, CompareOp, Condition, Direction, Field, Literal, Source, Statement,
};

/// Row cap applied by the ranked `ANALYZE` built-ins.
const ANALYSIS_LIMIT: i64 = 20;

/// One bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// A text value.
    Text(String),
    /// An integer value.
    Int(i64),
    /// A float value.
    Float(f64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(s) => s.to_sql(),
            Self::Int(i) => i.to_sql(),
            Self::Float(f) => f.to_sql(),
        }
    }
}

/// Parameterized-SQL builder.
///
/// Accepts fixed grammar fragments and bound values only; the type system
/// keeps runtime strings out of the SQL text.
struct ParamSql {
    sql: String,
    params: Vec<SqlParam>,
}

impl ParamSql {
    fn new(head: &'static str) -> Self {
        Self {
            sql: head.to_string(),
            params: Vec::new(),
        }
    }

    fn fragment(&mut self, fragment: &'static str) {
        self.sql.push_str(fragment);
    }

    fn field(&mut self, field: Field) {
        self.sql.push_str(field.column());
    }

    /// Append a `?` placeholder and queue its value.
    fn bind(&mut self, value: SqlParam) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn finish(self) -> Plan {
        Plan::Sql {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// An executable plan. Closed set: the engine matches exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// A parameterized relational query.
    Sql {
        /// Query text containing only grammar fragments and placeholders.
        sql: String,
        /// Bound values, in placeholder order.
        params: Vec<SqlParam>,
    },
    /// A bounded dependency walk around one resolved node.
    Show {
        /// Traversal direction.
        direction: Direction,
        /// Unresolved node reference.
        reference: String,
        /// Hop bound.
        depth: u32,
    },
    /// A schema/count summary for one node population.
    Describe {
        /// Node population.
        source: Source,
    },
    /// Whole-graph cycle detection.
    Cycles,
}

/// Translate a statement into a plan.
#[must_use]
pub fn plan(statement: &Statement) -> Plan {
    match statement {
        Statement::Select { source, conditions } => plan_select(*source, conditions),
        Statement::Find { source, pattern } => plan_find(*source, pattern),
        Statement::Show {
            direction,
            reference,
            depth,
        } => Plan::Show {
            direction: *direction,
            reference: reference.clone(),
            depth: *depth,
        },
        Statement::Describe { source } => Plan::Describe { source: *source },
        Statement::Analyze { analysis } => plan_analysis(*analysis),
    }
}

fn plan_select(source: Source, conditions: &[Condition]) -> Plan {
    let mut q = ParamSql::new("SELECT id, type, name, file_path, complexity FROM nodes");
    let mut has_where = false;

    if let Some(node_type) = source.node_type() {
        q.fragment(" WHERE type = ");
        q.bind(SqlParam::Text(node_type.as_str().to_string()));
        has_where = true;
    }

    for condition in conditions {
        q.fragment(if has_where { " AND " } else { " WHERE " });
        has_where = true;
        push_condition(&mut q, condition);
    }

    q.fragment(" ORDER BY id");
    q.finish()
}

fn push_condition(q: &mut ParamSql, condition: &Condition) {
    q.field(condition.field);
    match condition.op {
        CompareOp::Eq => {
            q.fragment(" = ");
            q.bind(literal_param(&condition.values[0]));
        }
        CompareOp::Gt => {
            q.fragment(" > ");
            q.bind(literal_param(&condition.values[0]));
        }
        CompareOp::Lt => {
            q.fragment(" < ");
            q.bind(literal_param(&condition.values[0]));
        }
        // Substring semantics: the wildcards live in the parameter value,
        // never in the SQL text.
        CompareOp::Like | CompareOp::Contains => {
            q.fragment(" LIKE ");
            q.bind(SqlParam::Text(format!(
                "%{}%",
                literal_text(&condition.values[0])
            )));
        }
        CompareOp::In => {
            q.fragment(" IN (");
            for (i, value) in condition.values.iter().enumerate() {
                if i > 0 {
                    q.fragment(", ");
                }
                q.bind(literal_param(value));
            }
            q.fragment(")");
        }
    }
}

fn plan_find(source: Source, pattern: &str) -> Plan {
    let mut like = pattern.replace('*', "%");
    if !like.contains('%') {
        like = format!("%{like}%");
    }

    let mut q = ParamSql::new("SELECT id, type, name, file_path, complexity FROM nodes");
    if let Some(node_type) = source.node_type() {
        q.fragment(" WHERE type = ");
        q.bind(SqlParam::Text(node_type.as_str().to_string()));
        q.fragment(" AND name LIKE ");
    } else {
        q.fragment(" WHERE name LIKE ");
    }
    q.bind(SqlParam::Text(like));
    q.fragment(" ORDER BY id");
    q.finish()
}

fn plan_analysis(analysis: Analysis) -> Plan {
    match analysis {
        Analysis::Circular => Plan::Cycles,
        Analysis::Complexity => {
            let mut q =
                ParamSql::new("SELECT id, type, name, file_path, complexity FROM nodes");
            q.fragment(" WHERE type IN (");
            q.bind(SqlParam::Text("function".to_string()));
            q.fragment(", ");
            q.bind(SqlParam::Text("class".to_string()));
            q.fragment(") AND complexity > ");
            q.bind(SqlParam::Int(0));
            q.fragment(" ORDER BY complexity DESC, id LIMIT ");
            q.bind(SqlParam::Int(ANALYSIS_LIMIT));
            q.finish()
        }
        Analysis::Coupling => {
            let mut q = ParamSql::new(
                "SELECT n.id, n.type, n.name, \
                 (SELECT COUNT(*) FROM edges e WHERE e.source_id = n.id) + \
                 (SELECT COUNT(*) FROM edges e WHERE e.target_id = n.id) AS degree \
                 FROM nodes n WHERE n.type <> ",
            );
            q.bind(SqlParam::Text("external".to_string()));
            q.fragment(" ORDER BY degree DESC, n.id LIMIT ");
            q.bind(SqlParam::Int(ANALYSIS_LIMIT));
            q.finish()
        }
        Analysis::Unused => {
            let mut q = ParamSql::new(
                "SELECT id, type, name, file_path, complexity FROM nodes n WHERE type = ",
            );
            q.bind(SqlParam::Text("function".to_string()));
            q.fragment(
                " AND NOT EXISTS (SELECT 1 FROM edges e \
                 WHERE e.target_id = n.id AND e.type = ",
            );
            q.bind(SqlParam::Text("calls".to_string()));
            // Entry points are called from outside the graph.
            q.fragment(") AND name NOT IN (");
            q.bind(SqlParam::Text("main".to_string()));
            q.fragment(", ");
            q.bind(SqlParam::Text("__main__".to_string()));
            q.fragment(", ");
            q.bind(SqlParam::Text("__init__".to_string()));
            q.fragment(") ORDER BY id");
            q.finish()
        }
        Analysis::Hotspots => {
            let mut q = ParamSql::new(
                "SELECT n.id, n.name, n.complexity, \
                 (SELECT COUNT(*) FROM edges e WHERE e.target_id = n.id AND e.type = ",
            );
            q.bind(SqlParam::Text("calls".to_string()));
            q.fragment(
                ") AS fan_in, \
                 n.complexity * (SELECT COUNT(*) FROM edges e \
                 WHERE e.target_id = n.id AND e.type = ",
            );
            q.bind(SqlParam::Text("calls".to_string()));
            q.fragment(") AS score FROM nodes n WHERE n.type = ");
            q.bind(SqlParam::Text("function".to_string()));
            q.fragment(" ORDER BY score DESC, n.id LIMIT ");
            q.bind(SqlParam::Int(ANALYSIS_LIMIT));
            q.finish()
        }
    }
}

fn literal_param(literal: &Literal) -> SqlParam {
    match literal {
        Literal::Text(s) => SqlParam::Text(s.clone()),
        Literal::Int(i) => SqlParam::Int(*i),
        Literal::Float(f) => SqlParam::Float(*f),
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Text(s) => s.clone(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => f.to_string(),
    }
}
