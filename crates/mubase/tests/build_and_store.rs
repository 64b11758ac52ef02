//! End-to-end: module models through the builder into a store.

use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;

use mubase::{
    CallSite, ClassModel, Edge, EdgeType, Error, FunctionModel, GraphBuilder, GraphStore,
    ImportModel, ModuleModel, Node, NodeType,
};

fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    (dir, path)
}

fn module(name: &str, path: &str) -> ModuleModel {
    ModuleModel {
        name: name.to_string(),
        path: path.to_string(),
        language: "python".to_string(),
        imports: vec![],
        classes: vec![],
        functions: vec![],
        total_lines: 1,
    }
}

fn import(module: &str) -> ImportModel {
    ImportModel {
        module: module.to_string(),
        names: vec![],
        alias: None,
        is_from: false,
        is_dynamic: false,
        dynamic_pattern: None,
    }
}

fn function(name: &str) -> FunctionModel {
    FunctionModel {
        name: name.to_string(),
        parameters: vec![],
        return_type: None,
        decorators: vec![],
        is_async: false,
        is_static: false,
        is_classmethod: false,
        is_property: false,
        complexity: 1,
        call_sites: vec![],
        line_start: Some(1),
        line_end: Some(5),
        docstring: None,
    }
}

/// Two modules: `a.py` imports the local `b` and the external `os`.
fn two_module_project() -> Vec<ModuleModel> {
    let mut a = module("a", "a.py");
    a.imports.push(import("b"));
    a.imports.push(import("os"));
    let b = module("b", "b.py");
    vec![a, b]
}

#[test]
fn local_import_becomes_edge_external_becomes_property() {
    let (nodes, edges) = GraphBuilder::new().build(&two_module_project());

    let (_dir, path) = temp_db();
    let mut store = GraphStore::open(&path).unwrap();
    store.replace(&nodes, &edges).unwrap();

    let deps = store.get_dependencies("mod:a.py", 1).unwrap();
    assert_eq!(
        deps.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        vec!["mod:b.py"]
    );

    let a = store.get_node("mod:a.py").unwrap().unwrap();
    assert_eq!(a.properties.get("external_deps"), Some(&json!(["os"])));

    // `os` never becomes a node or an edge.
    assert!(store.get_node("mod:os").unwrap().is_none());
    assert!(store.get_node("ext:os").unwrap().is_none());
    assert_eq!(store.stats().unwrap().edge_count, 1);
}

#[test]
fn single_module_build_yields_one_module_node_with_exact_id() {
    let (nodes, _) = GraphBuilder::new().build(&[module("pkg.mod", "pkg/mod.py")]);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, "mod:pkg/mod.py");
    assert_eq!(nodes[0].node_type, NodeType::Module);
}

#[test]
fn contains_edges_form_a_forest() {
    let mut m = module("app", "app.py");
    m.classes.push(ClassModel {
        name: "Service".to_string(),
        bases: vec![],
        decorators: vec![],
        attributes: vec![],
        methods: vec![function("start"), function("stop")],
        referenced_types: vec![],
        line_start: Some(1),
        line_end: Some(30),
        docstring: None,
    });
    m.functions.push(function("main"));

    let (nodes, edges) = GraphBuilder::new().build(&[m]);
    let (_dir, path) = temp_db();
    let mut store = GraphStore::open(&path).unwrap();
    store.replace(&nodes, &edges).unwrap();

    // Every non-module node has exactly one CONTAINS parent.
    for node in store.get_nodes(None).unwrap() {
        let parent = store.get_parent(&node.id).unwrap();
        if node.node_type == NodeType::Module {
            assert!(parent.is_none());
        } else {
            assert!(parent.is_some(), "orphan node {}", node.id);
        }
    }

    let incoming_contains = |id: &str| {
        edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::Contains && e.target_id == id)
            .count()
    };
    assert!(nodes.iter().all(|n| incoming_contains(&n.id) <= 1));
}

#[test]
fn depth_one_dependents_equal_direct_in_edges_and_rebuild_is_idempotent() {
    let mut a = module("a", "a.py");
    a.imports.push(import("c"));
    let mut b = module("b", "b.py");
    b.imports.push(import("c"));
    let c = module("c", "c.py");
    let project = vec![a, b, c];

    let (nodes, edges) = GraphBuilder::new().build(&project);
    let (_dir, path) = temp_db();
    let mut store = GraphStore::open(&path).unwrap();
    store.replace(&nodes, &edges).unwrap();

    let direct: Vec<String> = edges
        .iter()
        .filter(|e| e.target_id == "mod:c.py")
        .map(|e| e.source_id.clone())
        .collect();
    let dependents: Vec<String> = store
        .get_dependents("mod:c.py", 1)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    let mut direct_sorted = direct;
    direct_sorted.sort();
    assert_eq!(dependents, direct_sorted);

    // Rebuild from the same input and replace: identical answer.
    let (nodes2, edges2) = GraphBuilder::new().build(&project);
    assert_eq!(nodes2.len(), nodes.len());
    store.replace(&nodes2, &edges2).unwrap();
    let again: Vec<String> = store
        .get_dependents("mod:c.py", 1)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(again, dependents);
}

#[test]
fn call_edges_survive_storage_with_line_property() {
    let mut a = module("a", "a.py");
    let mut main = function("main");
    main.call_sites.push(CallSite {
        callee: "helper".to_string(),
        receiver: None,
        line: 9,
    });
    a.functions.push(main);
    a.functions.push(function("helper"));

    let (nodes, edges) = GraphBuilder::new().build(&[a]);
    let (_dir, path) = temp_db();
    let mut store = GraphStore::open(&path).unwrap();
    store.replace(&nodes, &edges).unwrap();

    let stored = store.get_edges().unwrap();
    let call = stored
        .iter()
        .find(|e| e.edge_type == EdgeType::Calls)
        .unwrap();
    assert_eq!(call.id, "edge:fn:a.py:main:calls:fn:a.py:helper:9");
    assert_eq!(call.properties.get("line"), Some(&json!(9)));
}

#[test]
fn second_writer_is_rejected_while_first_holds_the_lock() {
    let (_dir, path) = temp_db();
    let writer = GraphStore::open(&path).unwrap();

    match GraphStore::open(&path) {
        Err(Error::Locked { path: lock }) => {
            assert!(lock.to_string_lossy().ends_with("graph.db.lock"));
        }
        other => panic!("expected Locked, got {:?}", other.map(|s| s.path().to_owned())),
    }

    drop(writer);
    assert!(GraphStore::open(&path).is_ok());
}

#[test]
fn unknown_node_queries_return_empty_not_errors() {
    let (_dir, path) = temp_db();
    let store = GraphStore::open(&path).unwrap();

    assert!(store.get_node("mod:missing.py").unwrap().is_none());
    assert!(store.get_dependencies("mod:missing.py", 3).unwrap().is_empty());
    assert!(store.get_children("mod:missing.py").unwrap().is_empty());
}

#[test]
fn builder_output_upserts_over_previous_contents() {
    let (_dir, path) = temp_db();
    let mut store = GraphStore::open(&path).unwrap();

    let mut stale = Node::new("mod:gone.py", NodeType::Module, "gone");
    stale.file_path = Some("gone.py".to_string());
    store.add_node(&stale).unwrap();
    store
        .add_edge(&Edge::new("mod:gone.py", EdgeType::Imports, "mod:gone.py"))
        .unwrap();

    let (nodes, edges) = GraphBuilder::new().build(&two_module_project());
    store.replace(&nodes, &edges).unwrap();

    assert!(store.get_node("mod:gone.py").unwrap().is_none());
    assert_eq!(store.stats().unwrap().node_count, 2);
}
