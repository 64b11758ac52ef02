//! `SQLite` storage layer for the semantic graph.
//!
//! `SQLite` is the source of truth: the logical schema is a `nodes` table
//! and an `edges` table. Point lookups and filtered scans run as indexed
//! queries; bounded-depth dependency walks use recursive CTEs so traversal
//! stays inside the database.
//!
//! ## Locking discipline
//!
//! Exactly one writer handle may be open per physical store. The writer
//! holds an advisory lock file next to the database; a second
//! [`GraphStore::open`] fails immediately with [`Error::Locked`] instead of
//! blocking, so callers can reroute to the process holding the lock.
//! Read-only handles ([`GraphStore::open_read_only`]) may coexist with each
//! other but refuse to open while a writer lock is held.

// SQLite uses i64 for all integer storage. These casts are intentional and
// safe for practical values (line numbers, counts).
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::types::{Edge, EdgeType, Node, NodeType};

/// Default maximum depth for recursive graph traversals.
///
/// Prevents runaway recursion in deeply nested or cyclic graphs when a
/// caller passes an absurd depth.
const MAX_WALK_DEPTH: u32 = 50;

/// Advisory writer lock, released on drop.
///
/// Created with `O_EXCL` semantics so acquisition is atomic: either this
/// handle created the lock file, or another writer holds it.
#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(db_path: &Path) -> Result<Self> {
        let path = lock_path(db_path);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::Locked { path })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Failed to remove store lock file");
        }
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map_or_else(|| "graph.db".into(), std::ffi::OsStr::to_os_string);
    name.push(".lock");
    db_path.with_file_name(name)
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStats {
    /// Total number of nodes.
    pub node_count: usize,
    /// Total number of edges.
    pub edge_count: usize,
    /// Node counts keyed by node type storage string.
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Edge counts keyed by edge type storage string.
    pub edges_by_type: BTreeMap<String, usize>,
}

/// Durable node/edge storage with indexed lookups.
pub struct GraphStore {
    conn: Connection,
    path: PathBuf,
    // None for read-only handles.
    lock: Option<StoreLock>,
}

impl GraphStore {
    /// Open (or create) a store with the exclusive writer handle.
    ///
    /// Creates parent directories, enables WAL mode, and applies the schema
    /// idempotently.
    ///
    /// The lock excludes other writers and new read-only handles, but not
    /// read-only handles that were already open: those keep reading a
    /// consistent WAL snapshot and are never invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] immediately if another writer holds the
    /// store, without blocking.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock = StoreLock::acquire(path)?;

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            lock: Some(lock),
        })
    }

    /// Open a read-only handle.
    ///
    /// Any number of read-only handles may coexist. Opening is refused
    /// while a writer holds the store; the check runs at open time only,
    /// so a writer may still appear later while this handle is live (WAL
    /// keeps its reads consistent).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if a writer currently holds the store, or
    /// a database error if the store does not exist.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let lock_file = lock_path(path);
        if lock_file.exists() {
            return Err(Error::Locked { path: lock_file });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            lock: None,
        })
    }

    /// Path of the backing database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle can write.
    #[must_use]
    pub fn is_writer(&self) -> bool {
        self.lock.is_some()
    }

    /// Borrow the underlying connection for query execution.
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn require_writer(&self) -> Result<()> {
        if self.lock.is_some() {
            Ok(())
        } else {
            Err(Error::InvalidInput(
                "store handle is read-only".to_string(),
            ))
        }
    }

    // === Writes ===

    /// Insert a node, idempotent by id (last write wins).
    pub fn add_node(&self, node: &Node) -> Result<()> {
        self.require_writer()?;
        insert_node(&self.conn, node)?;
        Ok(())
    }

    /// Insert an edge, idempotent by id (last write wins).
    pub fn add_edge(&self, edge: &Edge) -> Result<()> {
        self.require_writer()?;
        insert_edge(&self.conn, edge)?;
        Ok(())
    }

    /// Insert a batch of nodes in a single transaction.
    pub fn add_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        self.require_writer()?;
        let tx = self.conn.transaction()?;
        for node in nodes {
            insert_node(&tx, node)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert a batch of edges in a single transaction.
    pub fn add_edges(&mut self, edges: &[Edge]) -> Result<()> {
        self.require_writer()?;
        let tx = self.conn.transaction()?;
        for edge in edges {
            insert_edge(&tx, edge)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace the entire store contents atomically.
    ///
    /// This is the only supported "update" path: builds are full,
    /// idempotent rebuilds, never partial mutations.
    pub fn replace(&mut self, nodes: &[Node], edges: &[Edge]) -> Result<()> {
        self.require_writer()?;
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;
        for node in nodes {
            insert_node(&tx, node)?;
        }
        for edge in edges {
            insert_edge(&tx, edge)?;
        }
        tx.commit()?;
        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            "Replaced store contents"
        );
        Ok(())
    }

    // === Point lookups and scans ===

    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> Result<Option<Node>> {
        self.conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                [id],
                row_to_node,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Scan nodes, optionally filtered to one type.
    pub fn get_nodes(&self, node_type: Option<NodeType>) -> Result<Vec<Node>> {
        match node_type {
            Some(t) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {NODE_COLUMNS} FROM nodes WHERE type = ?1 ORDER BY id"
                ))?;
                let nodes = stmt
                    .query_map([t.as_str()], row_to_node)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(nodes)
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY id"))?;
                let nodes = stmt
                    .query_map([], row_to_node)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(nodes)
            }
        }
    }

    /// All node ids in the store.
    pub fn node_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM nodes ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// All edges in the store.
    pub fn get_edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {EDGE_COLUMNS} FROM edges ORDER BY id"))?;
        let edges = stmt
            .query_map([], row_to_edge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Find nodes by name.
    ///
    /// Exact match when the pattern has no wildcard; case-sensitive
    /// glob-style match (`*`, `?`) otherwise.
    pub fn find_by_name(&self, pattern: &str) -> Result<Vec<Node>> {
        let sql = if pattern.contains('*') || pattern.contains('?') {
            format!("SELECT {NODE_COLUMNS} FROM nodes WHERE name GLOB ?1 ORDER BY id")
        } else {
            format!("SELECT {NODE_COLUMNS} FROM nodes WHERE name = ?1 ORDER BY id")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map([pattern], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// Functions and classes with complexity strictly above `min`.
    ///
    /// Ordering is a presentation concern; only the filter is guaranteed.
    pub fn find_by_complexity(&self, min: u32) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE type IN ('function', 'class') AND complexity > ?1
             ORDER BY id"
        ))?;
        let nodes = stmt
            .query_map([i64::from(min)], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    // === Containment ===

    /// Direct children of a node along CONTAINS edges.
    pub fn get_children(&self, id: &str) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS_N} FROM edges e
             JOIN nodes n ON n.id = e.target_id
             WHERE e.source_id = ?1 AND e.type = 'contains'
             ORDER BY n.id"
        ))?;
        let nodes = stmt
            .query_map([id], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// The CONTAINS parent of a node, if any.
    ///
    /// CONTAINS edges form a forest, so at most one parent exists.
    pub fn get_parent(&self, id: &str) -> Result<Option<Node>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {NODE_COLUMNS_N} FROM edges e
                     JOIN nodes n ON n.id = e.source_id
                     WHERE e.target_id = ?1 AND e.type = 'contains'
                     LIMIT 1"
                ),
                [id],
                row_to_node,
            )
            .optional()
            .map_err(Into::into)
    }

    // === Bounded dependency walks ===

    /// Forward BFS from `id` along outgoing edges, bounded to `depth` hops.
    ///
    /// Returns the expanded frontier set: each reachable node once, the
    /// start node excluded.
    pub fn get_dependencies(&self, id: &str, depth: u32) -> Result<Vec<Node>> {
        trace!(id, depth, "Walking dependencies");
        self.walk(id, depth, "source_id", "target_id")
    }

    /// The same walk over incoming edges: who reaches `id` within `depth` hops.
    pub fn get_dependents(&self, id: &str, depth: u32) -> Result<Vec<Node>> {
        trace!(id, depth, "Walking dependents");
        self.walk(id, depth, "target_id", "source_id")
    }

    /// Shared recursive-CTE walk. `from_col`/`to_col` select the direction;
    /// both values come from call sites above, never from input.
    fn walk(&self, id: &str, depth: u32, from_col: &str, to_col: &str) -> Result<Vec<Node>> {
        let depth = depth.min(MAX_WALK_DEPTH);
        let sql = format!(
            "WITH RECURSIVE walk(node_id, hops) AS (
                SELECT e.{to_col}, 1 FROM edges e WHERE e.{from_col} = ?1
                UNION
                SELECT e.{to_col}, w.hops + 1
                FROM edges e
                JOIN walk w ON e.{from_col} = w.node_id
                WHERE w.hops < ?2
            )
            SELECT DISTINCT {NODE_COLUMNS_N}
            FROM walk w
            JOIN nodes n ON n.id = w.node_id
            WHERE n.id <> ?1
            ORDER BY n.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![id, i64::from(depth)], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    // === Stats ===

    /// Aggregate node and edge counts, broken down by type.
    pub fn stats(&self) -> Result<GraphStats> {
        let node_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let edge_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;

        let mut nodes_by_type = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT type, COUNT(*) FROM nodes GROUP BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (t, n) = row?;
            nodes_by_type.insert(t, n as usize);
        }

        let mut edges_by_type = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT type, COUNT(*) FROM edges GROUP BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (t, n) = row?;
            edges_by_type.insert(t, n as usize);
        }

        Ok(GraphStats {
            node_count: node_count as usize,
            edge_count: edge_count as usize,
            nodes_by_type,
            edges_by_type,
        })
    }
}

fn insert_node(conn: &Connection, node: &Node) -> rusqlite::Result<()> {
    let properties = serde_json::Value::Object(node.properties.clone()).to_string();
    conn.execute(
        "INSERT INTO nodes (id, type, name, qualified_name, file_path, line_start, line_end, properties, complexity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
             type = excluded.type,
             name = excluded.name,
             qualified_name = excluded.qualified_name,
             file_path = excluded.file_path,
             line_start = excluded.line_start,
             line_end = excluded.line_end,
             properties = excluded.properties,
             complexity = excluded.complexity",
        params![
            node.id,
            node.node_type.as_str(),
            node.name,
            node.qualified_name,
            node.file_path,
            node.line_start,
            node.line_end,
            properties,
            i64::from(node.complexity),
        ],
    )?;
    Ok(())
}

fn insert_edge(conn: &Connection, edge: &Edge) -> rusqlite::Result<()> {
    let properties = serde_json::Value::Object(edge.properties.clone()).to_string();
    conn.execute(
        "INSERT INTO edges (id, source_id, target_id, type, properties)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             source_id = excluded.source_id,
             target_id = excluded.target_id,
             type = excluded.type,
             properties = excluded.properties",
        params![
            edge.id,
            edge.source_id,
            edge.target_id,
            edge.edge_type.as_str(),
            properties,
        ],
    )?;
    Ok(())
}

/// Column list for node queries. Order must match [`row_to_node`].
pub(crate) const NODE_COLUMNS: &str =
    "id, type, name, qualified_name, file_path, line_start, line_end, properties, complexity";

/// The same columns qualified with the `n` alias, for joins.
const NODE_COLUMNS_N: &str = "n.id, n.type, n.name, n.qualified_name, n.file_path, n.line_start, n.line_end, n.properties, n.complexity";

const EDGE_COLUMNS: &str = "id, source_id, target_id, type, properties";

/// Parse a node type string from the database.
///
/// Returns an error for unrecognized values, indicating possible database
/// corruption or a newer schema version.
fn parse_node_type(s: &str) -> rusqlite::Result<NodeType> {
    NodeType::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("Unknown node type '{s}' in database").into(),
        )
    })
}

fn parse_edge_type(s: &str) -> rusqlite::Result<EdgeType> {
    EdgeType::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("Unknown edge type '{s}' in database").into(),
        )
    })
}

fn parse_properties(s: &str) -> rusqlite::Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(s) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("Malformed properties JSON in database: {s}").into(),
        )),
    }
}

/// Convert a database row to a [`Node`].
///
/// Expected columns: those of [`NODE_COLUMNS`], in order.
pub(crate) fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        node_type: parse_node_type(&row.get::<_, String>(1)?)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        file_path: row.get(4)?,
        line_start: row.get(5)?,
        line_end: row.get(6)?,
        properties: parse_properties(&row.get::<_, String>(7)?)?,
        complexity: row.get::<_, i64>(8)? as u32,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    Ok(Edge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        edge_type: parse_edge_type(&row.get::<_, String>(3)?)?,
        properties: parse_properties(&row.get::<_, String>(4)?)?,
    })
}

/// Database schema definition.
const SCHEMA: &str = r"
-- Graph vertices: modules, classes, functions, externals
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT,
    file_path TEXT,
    line_start INTEGER,
    line_end INTEGER,
    properties TEXT NOT NULL DEFAULT '{}',
    complexity INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);
CREATE INDEX IF NOT EXISTS idx_nodes_file_path ON nodes(file_path);

-- Typed relations between nodes
CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(type);
";
