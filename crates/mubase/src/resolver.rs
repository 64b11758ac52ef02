//! Resolution of free-form node references.
//!
//! A reference may be a node id, a file path, a bare name, or a fragment.
//! The common ambiguity is structural duplication: a source file and its
//! test file both define `AuthService`. The resolver searches candidate
//! tiers in strict priority order, scores the matches, and applies a
//! pluggable strategy to pick one.
//!
//! Resolution is a deterministic function of (store state, reference,
//! strategy): candidates carry a total order (score descending, id
//! ascending), so repeated calls return the same node and the same
//! alternative ranking.

use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{GraphStore, NODE_COLUMNS, row_to_node};
use crate::types::Node;

/// How one candidate matched the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The reference was a node id.
    Id,
    /// Exact `file_path` match.
    PathExact,
    /// The reference is a suffix of the node's `file_path`.
    PathSuffix,
    /// Exact name match.
    NameExact,
    /// The reference is a suffix of the node's name.
    NameSuffix,
    /// The reference is a substring of the node's name.
    Fuzzy,
}

/// One scored match for a reference.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The matched node.
    pub node: Node,
    /// Ranking score; higher is better.
    pub score: i32,
    /// Which tier produced the match.
    pub match_kind: MatchKind,
    /// Whether the node looks like a test entity.
    pub is_test: bool,
}

/// Policy applied to a multi-candidate match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionStrategy {
    /// Pick the best non-test candidate; fall back to the best overall
    /// when every candidate is a test entity.
    #[default]
    PreferSource,
    /// Pick the top-ranked candidate unconditionally.
    FirstMatch,
    /// Delegate to the configured chooser callback; without one, behaves
    /// like `PreferSource`.
    Interactive,
    /// Refuse to choose: more than one candidate is an error.
    Strict,
}

/// Callback for [`ResolutionStrategy::Interactive`]: given the ranked
/// candidates, return the index of the chosen one (or `None` to fall back
/// to `PreferSource`).
pub type Chooser = Box<dyn Fn(&[Candidate]) -> Option<usize>>;

/// The outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The chosen node.
    pub node: Node,
    /// Whether more than one candidate matched.
    pub was_ambiguous: bool,
    /// The candidates that were not chosen, in rank order.
    pub alternatives: Vec<Candidate>,
}

/// Resolves reference strings against a store.
pub struct NodeResolver<'a> {
    store: &'a GraphStore,
    strategy: ResolutionStrategy,
    chooser: Option<Chooser>,
}

impl<'a> NodeResolver<'a> {
    /// Create a resolver with the default `PreferSource` strategy.
    #[must_use]
    pub fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            strategy: ResolutionStrategy::default(),
            chooser: None,
        }
    }

    /// Select a disambiguation strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Configure the callback consulted by the `Interactive` strategy.
    #[must_use]
    pub fn with_chooser(mut self, chooser: Chooser) -> Self {
        self.chooser = Some(chooser);
        self
    }

    /// Resolve a reference to exactly one node.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] when no tier yields a candidate;
    /// [`Error::AmbiguousNode`] under [`ResolutionStrategy::Strict`] with
    /// more than one candidate.
    pub fn resolve(&self, reference: &str) -> Result<Resolution> {
        let candidates = self.collect_candidates(reference)?;
        debug!(
            reference,
            candidates = candidates.len(),
            strategy = ?self.strategy,
            "Resolved reference candidates"
        );

        if candidates.is_empty() {
            return Err(Error::NodeNotFound {
                reference: reference.to_string(),
            });
        }

        let chosen = match self.strategy {
            ResolutionStrategy::FirstMatch => 0,
            ResolutionStrategy::PreferSource => prefer_source(&candidates),
            ResolutionStrategy::Interactive => self
                .chooser
                .as_ref()
                .and_then(|choose| choose(&candidates))
                .filter(|&idx| idx < candidates.len())
                .unwrap_or_else(|| prefer_source(&candidates)),
            ResolutionStrategy::Strict => {
                if candidates.len() > 1 {
                    return Err(Error::AmbiguousNode {
                        reference: reference.to_string(),
                        candidates,
                    });
                }
                0
            }
        };

        let was_ambiguous = candidates.len() > 1;
        let mut candidates = candidates;
        let winner = candidates.remove(chosen);
        Ok(Resolution {
            node: winner.node,
            was_ambiguous,
            alternatives: candidates,
        })
    }

    /// Run the candidate tiers, stopping at the first one with a match.
    fn collect_candidates(&self, reference: &str) -> Result<Vec<Candidate>> {
        // Tier 1: explicit node id.
        if has_id_prefix(reference) {
            if let Some(node) = self.store.get_node(reference)? {
                return Ok(vec![scored(node, MatchKind::Id)]);
            }
        }

        // Tier 2: file path, exact then suffix.
        if looks_like_path(reference) {
            let exact = self.query(
                "WHERE file_path = ?1",
                reference,
                MatchKind::PathExact,
            )?;
            if !exact.is_empty() {
                return Ok(rank(exact));
            }
            let suffix = self.query(
                "WHERE file_path LIKE ?1 ESCAPE '\\'",
                &format!("%{}", like_escape(reference)),
                MatchKind::PathSuffix,
            )?;
            if !suffix.is_empty() {
                return Ok(rank(suffix));
            }
        }

        // Tiers 3-5: name exact, name suffix, fuzzy substring.
        for (clause, pattern, kind) in [
            ("WHERE name = ?1", reference.to_string(), MatchKind::NameExact),
            (
                "WHERE name LIKE ?1 ESCAPE '\\'",
                format!("%{}", like_escape(reference)),
                MatchKind::NameSuffix,
            ),
            (
                "WHERE name LIKE ?1 ESCAPE '\\'",
                format!("%{}%", like_escape(reference)),
                MatchKind::Fuzzy,
            ),
        ] {
            let matches = self.query(clause, &pattern, kind)?;
            if !matches.is_empty() {
                return Ok(rank(matches));
            }
        }

        Ok(Vec::new())
    }

    fn query(&self, clause: &str, param: &str, kind: MatchKind) -> Result<Vec<Candidate>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes {clause} ORDER BY id");
        let mut stmt = self.store.connection().prepare(&sql)?;
        let nodes = stmt
            .query_map([param], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes.into_iter().map(|n| scored(n, kind)).collect())
    }
}

/// Index of the best non-test candidate, falling back to the top rank.
fn prefer_source(candidates: &[Candidate]) -> usize {
    candidates
        .iter()
        .position(|c| !c.is_test)
        .unwrap_or(0)
}

fn scored(node: Node, kind: MatchKind) -> Candidate {
    let is_test = is_test_entity(&node);
    let score = base_score(kind, is_test);
    Candidate {
        node,
        score,
        match_kind: kind,
        is_test,
    }
}

fn base_score(kind: MatchKind, is_test: bool) -> i32 {
    let source_bonus = if is_test { 0 } else { 10 };
    match kind {
        MatchKind::Id => 100,
        MatchKind::PathExact => 95,
        MatchKind::PathSuffix => {
            if is_test {
                75
            } else {
                85
            }
        }
        MatchKind::NameExact => 80 + source_bonus,
        MatchKind::NameSuffix => 60 + source_bonus,
        MatchKind::Fuzzy => 40 + source_bonus,
    }
}

/// Apply the path-brevity bonus and sort into the total order.
fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let max_segments = candidates
        .iter()
        .filter_map(|c| c.node.file_path.as_deref())
        .map(segment_count)
        .max()
        .unwrap_or(0);

    for candidate in &mut candidates {
        if let Some(path) = candidate.node.file_path.as_deref() {
            let brevity = (max_segments.saturating_sub(segment_count(path)) * 2).min(10);
            candidate.score += i32::try_from(brevity).unwrap_or(10);
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    candidates
}

/// A reference is literal text, not a pattern: escape the `LIKE`
/// metacharacters so `_` and `%` in file or function names match
/// themselves only.
fn like_escape(reference: &str) -> String {
    reference
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

fn has_id_prefix(reference: &str) -> bool {
    ["mod:", "cls:", "fn:", "ext:"]
        .iter()
        .any(|p| reference.starts_with(p))
}

fn looks_like_path(reference: &str) -> bool {
    const EXTENSIONS: [&str; 7] = [".py", ".ts", ".tsx", ".js", ".go", ".rs", ".java"];
    reference.contains('/') || EXTENSIONS.iter().any(|ext| reference.ends_with(ext))
}

/// Language-agnostic test-entity heuristic over path and name.
fn is_test_entity(node: &Node) -> bool {
    if let Some(path) = node.file_path.as_deref() {
        if path_has_test_marker(path) {
            return true;
        }
    }
    name_has_test_marker(&node.name)
}

fn path_has_test_marker(path: &str) -> bool {
    const TEST_DIRS: [&str; 5] = ["test", "tests", "__tests__", "spec", "testing"];
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    let mut file_name = "";
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            file_name = segment;
        } else if TEST_DIRS.contains(&segment) {
            return true;
        }
    }
    file_name.starts_with("test_")
        || file_name == "conftest.py"
        || file_name.contains("_test.")
        || file_name.contains(".spec.")
        || file_name.contains(".test.")
}

/// Name markers with a capitalization guard: `TestCase` and `test_login`
/// match, `Contest` and `testimony` do not.
fn name_has_test_marker(name: &str) -> bool {
    const MARKERS: [&str; 6] = ["test", "tests", "mock", "fake", "stub", "fixture"];
    MARKERS.iter().any(|marker| {
        if let Some(rest) = name.strip_prefix(marker) {
            if marker_boundary(rest) {
                return true;
            }
        }
        let capitalized = capitalize(marker);
        name.strip_prefix(&capitalized).is_some_and(marker_boundary)
    })
}

/// A marker only counts when followed by a word boundary: end of name,
/// underscore, or an uppercase letter.
fn marker_boundary(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some('_') => true,
        Some(c) => c.is_uppercase(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeType, ids};
    use tempfile::TempDir;

    fn class_node(path: &str, name: &str) -> Node {
        let mut node = Node::new(ids::class_id(path, name), NodeType::Class, name);
        node.file_path = Some(path.to_string());
        node
    }

    fn store_with(nodes: &[Node]) -> (TempDir, GraphStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::open(&dir.path().join("graph.db")).unwrap();
        for node in nodes {
            store.add_node(node).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn id_reference_is_definitive() {
        let (_dir, store) = store_with(&[class_node("src/auth.py", "AuthService")]);
        let resolver = NodeResolver::new(&store);

        let resolution = resolver.resolve("cls:src/auth.py:AuthService").unwrap();
        assert_eq!(resolution.node.name, "AuthService");
        assert!(!resolution.was_ambiguous);
        assert!(resolution.alternatives.is_empty());
    }

    #[test]
    fn unknown_id_falls_through_to_name_tiers() {
        // A class literally named "fn:x" would be odd, but an id-shaped
        // reference that misses the id tier must still reach the others.
        let (_dir, store) = store_with(&[class_node("src/auth.py", "AuthService")]);
        let resolver = NodeResolver::new(&store);
        let err = resolver.resolve("cls:src/gone.py:Gone").unwrap_err();
        assert!(matches!(err, Error::NodeNotFound { .. }));
    }

    #[test]
    fn path_reference_matches_exact_then_suffix() {
        let (_dir, store) = store_with(&[
            class_node("src/auth.py", "AuthService"),
            class_node("vendor/src/auth.py", "AuthService"),
        ]);
        let resolver = NodeResolver::new(&store);

        let exact = resolver.resolve("src/auth.py").unwrap();
        assert_eq!(exact.node.file_path.as_deref(), Some("src/auth.py"));
        assert!(!exact.was_ambiguous);

        let suffix = resolver.resolve("auth.py").unwrap();
        // Brevity bonus ranks the shallower path first.
        assert_eq!(suffix.node.file_path.as_deref(), Some("src/auth.py"));
    }

    #[test]
    fn prefer_source_picks_non_test_with_one_alternative() {
        let (_dir, store) = store_with(&[
            class_node("src/auth.py", "AuthService"),
            class_node("tests/test_auth.py", "AuthService"),
        ]);
        let resolver = NodeResolver::new(&store);

        let resolution = resolver.resolve("AuthService").unwrap();
        assert_eq!(resolution.node.file_path.as_deref(), Some("src/auth.py"));
        assert!(resolution.was_ambiguous);
        assert_eq!(resolution.alternatives.len(), 1);
        assert!(resolution.alternatives[0].is_test);
    }

    #[test]
    fn prefer_source_falls_back_when_all_candidates_are_tests() {
        let (_dir, store) = store_with(&[
            class_node("tests/a/test_auth.py", "AuthService"),
            class_node("tests/test_auth.py", "AuthService"),
        ]);
        let resolver = NodeResolver::new(&store);

        let resolution = resolver.resolve("AuthService").unwrap();
        // Shallower test path wins on brevity.
        assert_eq!(
            resolution.node.file_path.as_deref(),
            Some("tests/test_auth.py")
        );
    }

    #[test]
    fn first_match_takes_top_rank_unconditionally() {
        let (_dir, store) = store_with(&[
            class_node("src/auth.py", "AuthService"),
            class_node("tests/test_auth.py", "AuthService"),
        ]);
        let resolver =
            NodeResolver::new(&store).with_strategy(ResolutionStrategy::FirstMatch);

        // The source candidate outranks the test one, so FirstMatch and
        // PreferSource agree here; the point is FirstMatch never skips.
        let resolution = resolver.resolve("AuthService").unwrap();
        assert_eq!(resolution.node.file_path.as_deref(), Some("src/auth.py"));
    }

    #[test]
    fn strict_fails_on_ambiguity_with_ranked_candidates() {
        let (_dir, store) = store_with(&[
            class_node("src/auth.py", "AuthService"),
            class_node("tests/test_auth.py", "AuthService"),
        ]);
        let resolver = NodeResolver::new(&store).with_strategy(ResolutionStrategy::Strict);

        let err = resolver.resolve("AuthService").unwrap_err();
        match err {
            Error::AmbiguousNode { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates[0].score > candidates[1].score);
            }
            other => panic!("expected AmbiguousNode, got {other}"),
        }
    }

    #[test]
    fn strict_accepts_a_unique_match() {
        let (_dir, store) = store_with(&[class_node("src/auth.py", "AuthService")]);
        let resolver = NodeResolver::new(&store).with_strategy(ResolutionStrategy::Strict);
        assert!(resolver.resolve("AuthService").is_ok());
    }

    #[test]
    fn interactive_uses_chooser_and_falls_back_without_one() {
        let (_dir, store) = store_with(&[
            class_node("src/auth.py", "AuthService"),
            class_node("tests/test_auth.py", "AuthService"),
        ]);

        // Chooser deliberately picks the test candidate.
        let resolver = NodeResolver::new(&store)
            .with_strategy(ResolutionStrategy::Interactive)
            .with_chooser(Box::new(|candidates| {
                candidates.iter().position(|c| c.is_test)
            }));
        let resolution = resolver.resolve("AuthService").unwrap();
        assert!(resolution.node.file_path.unwrap().starts_with("tests/"));

        // No chooser: PreferSource behavior.
        let resolver =
            NodeResolver::new(&store).with_strategy(ResolutionStrategy::Interactive);
        let resolution = resolver.resolve("AuthService").unwrap();
        assert_eq!(resolution.node.file_path.as_deref(), Some("src/auth.py"));
    }

    #[test]
    fn name_suffix_and_fuzzy_tiers_engage_in_order() {
        let (_dir, store) = store_with(&[class_node("src/auth.py", "AuthService")]);
        let resolver = NodeResolver::new(&store);

        let suffix = resolver.resolve("Service").unwrap();
        assert_eq!(suffix.node.name, "AuthService");

        let fuzzy = resolver.resolve("uthServ").unwrap();
        assert_eq!(fuzzy.node.name, "AuthService");
    }

    #[test]
    fn underscores_in_references_match_literally_not_as_wildcards() {
        let (_dir, store) = store_with(&[
            class_node("src/form_input.py", "FormInput"),
            class_node("src/formXinput.py", "FormInputVariant"),
        ]);
        let resolver = NodeResolver::new(&store);

        // Path-suffix tier: '_' must not act as a single-char wildcard.
        let resolution = resolver.resolve("form_input.py").unwrap();
        assert_eq!(
            resolution.node.file_path.as_deref(),
            Some("src/form_input.py")
        );
        assert!(!resolution.was_ambiguous);

        // Name-suffix tier, same rule.
        let (_dir, store) = store_with(&[
            class_node("src/a.py", "set_user"),
            class_node("src/b.py", "setXuser"),
        ]);
        let resolver = NodeResolver::new(&store);
        let resolution = resolver.resolve("t_user").unwrap();
        assert_eq!(resolution.node.name, "set_user");
        assert!(!resolution.was_ambiguous);
    }

    #[test]
    fn percent_in_a_name_is_searchable() {
        let (_dir, store) = store_with(&[class_node("src/a.py", "pct%done")]);
        let resolver = NodeResolver::new(&store);
        // Exact tier first, then fuzzy with the '%' escaped.
        assert!(resolver.resolve("pct%done").is_ok());
        assert!(resolver.resolve("ct%do").is_ok());
    }

    #[test]
    fn zero_candidates_is_node_not_found() {
        let (_dir, store) = store_with(&[]);
        let resolver = NodeResolver::new(&store);
        let err = resolver.resolve("Nothing").unwrap_err();
        assert!(matches!(err, Error::NodeNotFound { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let (_dir, store) = store_with(&[
            class_node("src/a/auth.py", "AuthService"),
            class_node("src/b/auth.py", "AuthService"),
            class_node("tests/test_auth.py", "AuthService"),
        ]);
        let resolver = NodeResolver::new(&store);

        let first = resolver.resolve("AuthService").unwrap();
        for _ in 0..5 {
            let again = resolver.resolve("AuthService").unwrap();
            assert_eq!(again.node.id, first.node.id);
            let ids: Vec<_> = again.alternatives.iter().map(|c| c.node.id.clone()).collect();
            let first_ids: Vec<_> =
                first.alternatives.iter().map(|c| c.node.id.clone()).collect();
            assert_eq!(ids, first_ids);
        }
    }

    #[test]
    fn test_entity_heuristic_has_a_capitalization_guard() {
        let make = |path: Option<&str>, name: &str| {
            let mut node = Node::new(format!("cls:x:{name}"), NodeType::Class, name);
            node.file_path = path.map(ToString::to_string);
            node
        };

        assert!(is_test_entity(&make(Some("tests/auth.py"), "AuthService")));
        assert!(is_test_entity(&make(Some("src/test_auth.py"), "AuthService")));
        assert!(is_test_entity(&make(Some("src/conftest.py"), "fixtures")));
        assert!(is_test_entity(&make(None, "TestCase")));
        assert!(is_test_entity(&make(None, "test_login")));
        assert!(is_test_entity(&make(None, "MockServer")));

        assert!(!is_test_entity(&make(None, "Contest")));
        assert!(!is_test_entity(&make(None, "testimony")));
        assert!(!is_test_entity(&make(Some("src/latest/auth.py"), "AuthService")));
        assert!(!is_test_entity(&make(Some("src/attestation.py"), "Attestation")));
    }
}
