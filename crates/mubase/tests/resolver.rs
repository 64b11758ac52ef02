//! Reference resolution against a populated store.

use std::path::PathBuf;

use rstest::rstest;
use tempfile::TempDir;

use mubase::{
    Error, GraphStore, Node, NodeResolver, NodeType, ResolutionStrategy, ids,
};

fn class(path: &str, name: &str) -> Node {
    let mut node = Node::new(ids::class_id(path, name), NodeType::Class, name);
    node.file_path = Some(path.to_string());
    node
}

/// A store holding `AuthService` in both a source and a test file.
fn auth_store() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    {
        let store = GraphStore::open(&path).unwrap();
        store.add_node(&class("src/auth.py", "AuthService")).unwrap();
        store
            .add_node(&class("tests/test_auth.py", "AuthService"))
            .unwrap();
        store.add_node(&class("src/token.py", "TokenService")).unwrap();
    }
    (dir, path)
}

#[test]
fn prefer_source_returns_source_node_with_one_alternative() {
    let (_dir, path) = auth_store();
    let store = GraphStore::open_read_only(&path).unwrap();
    let resolver = NodeResolver::new(&store);

    let resolution = resolver.resolve("AuthService").unwrap();
    assert_eq!(resolution.node.id, "cls:src/auth.py:AuthService");
    assert!(resolution.was_ambiguous);
    assert_eq!(resolution.alternatives.len(), 1);
    assert_eq!(
        resolution.alternatives[0].node.id,
        "cls:tests/test_auth.py:AuthService"
    );
}

#[rstest]
#[case::prefer_source(ResolutionStrategy::PreferSource, "cls:src/auth.py:AuthService")]
#[case::first_match(ResolutionStrategy::FirstMatch, "cls:src/auth.py:AuthService")]
#[case::interactive_without_chooser(
    ResolutionStrategy::Interactive,
    "cls:src/auth.py:AuthService"
)]
fn choosing_strategies_pick_the_source_candidate(
    #[case] strategy: ResolutionStrategy,
    #[case] expected: &str,
) {
    let (_dir, path) = auth_store();
    let store = GraphStore::open_read_only(&path).unwrap();
    let resolver = NodeResolver::new(&store).with_strategy(strategy);

    let resolution = resolver.resolve("AuthService").unwrap();
    assert_eq!(resolution.node.id, expected);
}

#[test]
fn strict_refuses_ambiguous_references() {
    let (_dir, path) = auth_store();
    let store = GraphStore::open_read_only(&path).unwrap();
    let resolver = NodeResolver::new(&store).with_strategy(ResolutionStrategy::Strict);

    let err = resolver.resolve("AuthService").unwrap_err();
    let Error::AmbiguousNode { candidates, .. } = err else {
        panic!("expected AmbiguousNode");
    };
    assert_eq!(candidates.len(), 2);
    // Ranked: source first.
    assert_eq!(candidates[0].node.id, "cls:src/auth.py:AuthService");
}

#[rstest]
#[case::by_id("cls:src/token.py:TokenService")]
#[case::by_path("src/token.py")]
#[case::by_name("TokenService")]
#[case::by_name_suffix("Service")]
fn every_reference_form_resolves(#[case] reference: &str) {
    let (_dir, path) = auth_store();
    let store = GraphStore::open_read_only(&path).unwrap();

    let resolver = NodeResolver::new(&store);
    let resolution = resolver.resolve(reference).unwrap();
    assert!(resolution.node.id.contains("Service"));
}

#[test]
fn repeated_resolution_is_deterministic() {
    let (_dir, path) = auth_store();
    let store = GraphStore::open_read_only(&path).unwrap();
    let resolver = NodeResolver::new(&store);

    let baseline = resolver.resolve("AuthService").unwrap();
    for _ in 0..10 {
        let again = resolver.resolve("AuthService").unwrap();
        assert_eq!(again.node.id, baseline.node.id);
        assert_eq!(again.was_ambiguous, baseline.was_ambiguous);
        assert_eq!(
            again
                .alternatives
                .iter()
                .map(|c| (c.node.id.clone(), c.score))
                .collect::<Vec<_>>(),
            baseline
                .alternatives
                .iter()
                .map(|c| (c.node.id.clone(), c.score))
                .collect::<Vec<_>>()
        );
    }
}

#[test]
fn missing_reference_is_node_not_found() {
    let (_dir, path) = auth_store();
    let store = GraphStore::open_read_only(&path).unwrap();
    let resolver = NodeResolver::new(&store);

    assert!(matches!(
        resolver.resolve("NoSuchThing"),
        Err(Error::NodeNotFound { .. })
    ));
}
