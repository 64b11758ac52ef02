//! In-memory traversal over a loaded graph snapshot.
//!
//! [`GraphManager`] holds the full edge set in adjacency lists, so
//! whole-graph analyses (transitive closures, cycle detection) run without
//! touching the database. The snapshot is immutable: rebuild it with
//! [`GraphManager::load`] after the store changes.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{Edge, EdgeType};

/// Edge types considered by cycle detection when no filter is given.
///
/// CALLS cycles (recursion) and CONTAINS are structural, not design smells;
/// import and inheritance cycles are.
pub const DEFAULT_CYCLE_EDGES: &[EdgeType] = &[EdgeType::Imports, EdgeType::Inherits];

/// An immutable adjacency snapshot of the graph.
pub struct GraphManager {
    node_ids: HashSet<String>,
    /// Outgoing edges: source → (target, type).
    forward: HashMap<String, Vec<(String, EdgeType)>>,
    /// Incoming edges: target → (source, type).
    reverse: HashMap<String, Vec<(String, EdgeType)>>,
    edge_count: usize,
}

impl GraphManager {
    /// Load a snapshot from the store.
    pub fn load(store: &GraphStore) -> Result<Self> {
        let node_ids = store.node_ids()?;
        let edges = store.get_edges()?;
        let manager = Self::from_parts(node_ids, &edges);
        debug!(
            nodes = manager.node_ids.len(),
            edges = manager.edge_count,
            "Loaded graph snapshot"
        );
        Ok(manager)
    }

    /// Build a snapshot directly from nodes and edges.
    ///
    /// Endpoints referenced by edges are included even when absent from
    /// `node_ids`.
    #[must_use]
    pub fn from_parts(node_ids: Vec<String>, edges: &[Edge]) -> Self {
        let mut ids: HashSet<String> = node_ids.into_iter().collect();
        let mut forward: HashMap<String, Vec<(String, EdgeType)>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<(String, EdgeType)>> = HashMap::new();

        for edge in edges {
            ids.insert(edge.source_id.clone());
            ids.insert(edge.target_id.clone());
            forward
                .entry(edge.source_id.clone())
                .or_default()
                .push((edge.target_id.clone(), edge.edge_type));
            reverse
                .entry(edge.target_id.clone())
                .or_default()
                .push((edge.source_id.clone(), edge.edge_type));
        }

        Self {
            node_ids: ids,
            forward,
            reverse,
            edge_count: edges.len(),
        }
    }

    /// Whether the snapshot contains a node.
    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    /// Number of nodes in the snapshot.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Number of edges in the snapshot.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Everything `id` transitively depends on: the closure over outgoing
    /// edges, optionally restricted to `edge_types`. The start node is
    /// excluded unless it sits on a cycle through itself.
    #[must_use]
    pub fn ancestors(&self, id: &str, edge_types: Option<&[EdgeType]>) -> HashSet<String> {
        self.closure(id, &self.forward, edge_types)
    }

    /// Everything that transitively depends on `id`: the same closure over
    /// incoming edges. Dual to [`ancestors`](Self::ancestors): `b` is in
    /// `impact(a)` exactly when `a` is in `ancestors(b)`.
    #[must_use]
    pub fn impact(&self, id: &str, edge_types: Option<&[EdgeType]>) -> HashSet<String> {
        self.closure(id, &self.reverse, edge_types)
    }

    fn closure(
        &self,
        id: &str,
        adjacency: &HashMap<String, Vec<(String, EdgeType)>>,
        edge_types: Option<&[EdgeType]>,
    ) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            let Some(neighbors) = adjacency.get(current) else {
                continue;
            };
            for (next, edge_type) in neighbors {
                if let Some(allowed) = edge_types {
                    if !allowed.contains(edge_type) {
                        continue;
                    }
                }
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }

        seen.remove(id);
        seen
    }

    /// Strongly connected components with at least two members, plus
    /// genuine self-loops, over the filtered edge set.
    ///
    /// Defaults to [`DEFAULT_CYCLE_EDGES`] when no filter is given. Members
    /// of each cycle are sorted, and the cycle list itself is sorted by its
    /// first member, so output is deterministic.
    #[must_use]
    pub fn find_cycles(&self, edge_types: Option<&[EdgeType]>) -> Vec<Vec<String>> {
        let allowed = edge_types.unwrap_or(DEFAULT_CYCLE_EDGES);

        let mut graph: DiGraph<&str, ()> = DiGraph::new();

        let mut filtered: Vec<(&str, &str)> = Vec::new();
        for (source, neighbors) in &self.forward {
            for (target, edge_type) in neighbors {
                if allowed.contains(edge_type) {
                    filtered.push((source.as_str(), target.as_str()));
                }
            }
        }

        let mut index_map: HashMap<&str, NodeIndex> = HashMap::new();
        for &(source, target) in &filtered {
            for id in [source, target] {
                index_map
                    .entry(id)
                    .or_insert_with(|| graph.add_node(id));
            }
        }
        for &(source, target) in &filtered {
            graph.add_edge(index_map[source], index_map[target], ());
        }

        let mut cycles: Vec<Vec<String>> = Vec::new();
        for component in petgraph::algo::tarjan_scc(&graph) {
            let is_cycle = component.len() > 1
                || component.first().is_some_and(|&idx| {
                    graph
                        .edges(idx)
                        .any(|edge| petgraph::visit::EdgeRef::target(&edge) == idx)
                });
            if is_cycle {
                let mut members: Vec<String> = component
                    .iter()
                    .map(|&idx| graph[idx].to_string())
                    .collect();
                members.sort_unstable();
                cycles.push(members);
            }
        }
        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Edge;

    fn imports(a: &str, b: &str) -> Edge {
        Edge::new(a, EdgeType::Imports, b)
    }

    fn chain() -> GraphManager {
        // a → b → c along imports
        GraphManager::from_parts(
            vec!["mod:a.py".into(), "mod:b.py".into(), "mod:c.py".into()],
            &[
                imports("mod:a.py", "mod:b.py"),
                imports("mod:b.py", "mod:c.py"),
            ],
        )
    }

    #[test]
    fn ancestors_follow_outgoing_edges_transitively() {
        let manager = chain();
        let ancestors = manager.ancestors("mod:a.py", None);
        assert_eq!(
            ancestors,
            HashSet::from(["mod:b.py".to_string(), "mod:c.py".to_string()])
        );
        assert!(manager.ancestors("mod:c.py", None).is_empty());
    }

    #[test]
    fn impact_is_the_reverse_closure() {
        let manager = chain();
        let impact = manager.impact("mod:c.py", None);
        assert_eq!(
            impact,
            HashSet::from(["mod:a.py".to_string(), "mod:b.py".to_string()])
        );
        assert!(manager.impact("mod:a.py", None).is_empty());
    }

    #[test]
    fn closure_excludes_start_node_even_on_cycle() {
        let manager = GraphManager::from_parts(
            vec![],
            &[
                imports("mod:a.py", "mod:b.py"),
                imports("mod:b.py", "mod:a.py"),
            ],
        );
        let ancestors = manager.ancestors("mod:a.py", None);
        assert_eq!(ancestors, HashSet::from(["mod:b.py".to_string()]));
    }

    #[test]
    fn edge_filter_restricts_traversal() {
        let manager = GraphManager::from_parts(
            vec![],
            &[
                imports("mod:a.py", "mod:b.py"),
                Edge::new("mod:b.py", EdgeType::Uses, "mod:c.py"),
            ],
        );
        let only_imports = manager.ancestors("mod:a.py", Some(&[EdgeType::Imports]));
        assert_eq!(only_imports, HashSet::from(["mod:b.py".to_string()]));
        assert_eq!(manager.ancestors("mod:a.py", None).len(), 2);
    }

    #[test]
    fn unknown_node_has_empty_closures() {
        let manager = chain();
        assert!(!manager.has_node("mod:zzz.py"));
        assert!(manager.ancestors("mod:zzz.py", None).is_empty());
        assert!(manager.impact("mod:zzz.py", None).is_empty());
    }

    #[test]
    fn dag_has_no_cycles() {
        let manager = chain();
        assert!(manager.find_cycles(None).is_empty());
    }

    #[test]
    fn two_node_import_cycle_is_reported_sorted() {
        let manager = GraphManager::from_parts(
            vec![],
            &[
                imports("mod:b.py", "mod:a.py"),
                imports("mod:a.py", "mod:b.py"),
            ],
        );
        let cycles = manager.find_cycles(None);
        assert_eq!(
            cycles,
            vec![vec!["mod:a.py".to_string(), "mod:b.py".to_string()]]
        );
    }

    #[test]
    fn calls_recursion_is_not_a_default_cycle() {
        let manager = GraphManager::from_parts(
            vec![],
            &[
                Edge::call("fn:a.py:f", "fn:a.py:g", 1),
                Edge::call("fn:a.py:g", "fn:a.py:f", 2),
            ],
        );
        assert!(manager.find_cycles(None).is_empty());
        // With an explicit filter the recursion shows up.
        let cycles = manager.find_cycles(Some(&[EdgeType::Calls]));
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn self_loop_counts_as_a_cycle() {
        let manager = GraphManager::from_parts(vec![], &[imports("mod:a.py", "mod:a.py")]);
        let cycles = manager.find_cycles(None);
        assert_eq!(cycles, vec![vec!["mod:a.py".to_string()]]);
    }

    #[test]
    fn single_node_without_self_loop_is_not_a_cycle() {
        let manager = chain();
        // Tarjan reports every node as a singleton SCC; none qualify.
        assert!(manager.find_cycles(None).is_empty());
    }

    #[test]
    fn counts_match_input() {
        let manager = chain();
        assert_eq!(manager.node_count(), 3);
        assert_eq!(manager.edge_count(), 2);
    }
}
