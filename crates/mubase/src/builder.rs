//! Graph construction from the language-neutral module model.
//!
//! [`GraphBuilder::build`] is a pure function of its input: every scratch
//! index (import-alias tables, name/class/function registries) is owned by
//! the invocation and rebuilt on each call, so concurrent builds on
//! different inputs cannot interfere.
//!
//! Construction runs four ordered passes. Each pass may assume the nodes of
//! the previous passes exist:
//!
//! 1. Module nodes, import-alias tables, IMPORTS edges, `external_deps`
//! 2. Class and function declarations: nodes, CONTAINS, INHERITS
//! 3. Call resolution: CALLS edges through a strict priority ladder
//! 4. Type-use resolution: USES edges from annotation references
//!
//! The builder is a best-effort linker. Unresolved calls, imports, bases,
//! and type references are normal values: resolution helpers return
//! `Option` and absence means "skip", never an error.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use crate::model::{CallSite, ClassModel, FunctionModel, ModuleModel};
use crate::types::{Edge, EdgeType, Node, NodeType, ids};

/// Knobs for a build pass. Convention-based defaults; no config files.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Upper bound on the `external_deps` list recorded per module.
    pub max_external_deps: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_external_deps: 50,
        }
    }
}

/// Builds the node/edge set from module models.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    options: BuildOptions,
}

/// Scratch state for one `build()` invocation.
///
/// Owned by the call, never shared: dropped when the build returns.
#[derive(Default)]
struct Scratch {
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_ids: HashSet<String>,
    /// Known module paths in input order.
    module_paths: Vec<String>,
    /// Per-module alias table: local name → resolved module path.
    aliases: HashMap<String, HashMap<String, String>>,
    /// First-declared class per bare name → class node id.
    classes: HashMap<String, String>,
    /// Classes per module path: (class name, class node id).
    classes_by_module: HashMap<String, Vec<(String, String)>>,
    /// Module-scope functions: (module path, name) → function node id.
    module_functions: HashMap<(String, String), String>,
    /// Methods: (class node id, method name) → function node id.
    methods: HashMap<(String, String), String>,
}

impl Scratch {
    fn push_node(&mut self, node: Node) {
        if let Some(&idx) = self.node_index.get(&node.id) {
            self.nodes[idx] = node;
        } else {
            self.node_index.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
        }
    }

    fn ensure_node(&mut self, node: Node) {
        if !self.node_index.contains_key(&node.id) {
            self.push_node(node);
        }
    }

    fn push_edge(&mut self, edge: Edge) {
        if self.edge_ids.insert(edge.id.clone()) {
            self.edges.push(edge);
        }
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.node_index.get(id).copied().map(|idx| &mut self.nodes[idx])
    }
}

impl GraphBuilder {
    /// Create a builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with explicit options.
    #[must_use]
    pub fn with_options(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Build the node/edge set for a set of modules.
    ///
    /// Pure function of its input; two calls on the same input produce
    /// identical nodes and edges.
    #[must_use]
    pub fn build(&self, modules: &[ModuleModel]) -> (Vec<Node>, Vec<Edge>) {
        let mut scratch = Scratch::default();

        self.pass_modules(modules, &mut scratch);
        Self::pass_declarations(modules, &mut scratch);
        Self::pass_calls(modules, &mut scratch);
        Self::pass_type_uses(modules, &mut scratch);

        debug!(
            modules = modules.len(),
            nodes = scratch.nodes.len(),
            edges = scratch.edges.len(),
            "Graph build completed"
        );

        (scratch.nodes, scratch.edges)
    }

    // === Pass 1: modules, aliases, imports ===

    fn pass_modules(&self, modules: &[ModuleModel], scratch: &mut Scratch) {
        for module in modules {
            scratch.module_paths.push(module.path.clone());
        }

        for module in modules {
            let mut properties = Map::new();
            properties.insert("language".to_string(), json!(module.language));
            properties.insert("total_lines".to_string(), json!(module.total_lines));

            let mut node = Node::new(ids::module_id(&module.path), NodeType::Module, &module.name);
            node.qualified_name = Some(module.name.clone());
            node.file_path = Some(module.path.clone());
            node.properties = properties;
            scratch.push_node(node);
        }

        for module in modules {
            let module_id = ids::module_id(&module.path);
            let mut aliases: HashMap<String, String> = HashMap::new();
            let mut external: Vec<String> = Vec::new();

            for import in &module.imports {
                let target = resolve_import_path(
                    &import.module,
                    &module.path,
                    &scratch.module_paths,
                );

                if let Some(target_path) = target {
                    if import.is_from {
                        for name in &import.names {
                            let local = import.alias.clone().unwrap_or_else(|| name.clone());
                            aliases.insert(local, target_path.clone());
                        }
                    } else {
                        let local = import.alias.clone().unwrap_or_else(|| {
                            import
                                .module
                                .rsplit('.')
                                .next()
                                .unwrap_or(&import.module)
                                .to_string()
                        });
                        aliases.insert(local, target_path.clone());
                    }
                    scratch.push_edge(Edge::new(
                        &module_id,
                        EdgeType::Imports,
                        &ids::module_id(&target_path),
                    ));
                } else {
                    // Not a known module: record the root package instead of
                    // creating an edge, to avoid an edge explosion for
                    // stdlib/third-party imports.
                    let root = import
                        .module
                        .trim_start_matches('.')
                        .split('.')
                        .next()
                        .unwrap_or("")
                        .to_string();
                    if !root.is_empty() && !external.contains(&root) {
                        external.push(root);
                    }
                }
            }

            external.truncate(self.options.max_external_deps);
            if !external.is_empty() {
                if let Some(node) = scratch.node_mut(&module_id) {
                    node.properties
                        .insert("external_deps".to_string(), json!(external));
                }
            }

            scratch.aliases.insert(module.path.clone(), aliases);
        }
    }

    // === Pass 2: declarations ===

    fn pass_declarations(modules: &[ModuleModel], scratch: &mut Scratch) {
        // Declare every class and function first, then link INHERITS, so
        // bases can resolve to classes declared in later modules.
        for module in modules {
            for class in &module.classes {
                Self::declare_class(module, class, scratch);
            }
            for function in &module.functions {
                Self::declare_module_function(module, function, scratch);
            }
        }

        for module in modules {
            for class in &module.classes {
                let class_id = ids::class_id(&module.path, &class.name);
                for base in &class.bases {
                    let target = Self::resolve_base(base, &module.path, scratch)
                        .unwrap_or_else(|| {
                            let placeholder_id = ids::external_class_id(base);
                            scratch.ensure_node(Node::new(
                                placeholder_id.clone(),
                                NodeType::External,
                                base,
                            ));
                            placeholder_id
                        });
                    scratch.push_edge(Edge::new(&class_id, EdgeType::Inherits, &target));
                }
            }
        }
    }

    fn declare_class(module: &ModuleModel, class: &ClassModel, scratch: &mut Scratch) {
        let class_id = ids::class_id(&module.path, &class.name);
        let module_id = ids::module_id(&module.path);

        let mut properties = Map::new();
        if !class.bases.is_empty() {
            properties.insert("bases".to_string(), json!(class.bases));
        }
        if !class.decorators.is_empty() {
            properties.insert("decorators".to_string(), json!(class.decorators));
        }
        if !class.attributes.is_empty() {
            properties.insert("attributes".to_string(), json!(class.attributes));
        }
        if let Some(doc) = &class.docstring {
            properties.insert("docstring".to_string(), json!(doc));
        }

        let mut node = Node::new(class_id.clone(), NodeType::Class, &class.name);
        node.qualified_name = Some(format!("{}.{}", module.name, class.name));
        node.file_path = Some(module.path.clone());
        node.line_start = class.line_start;
        node.line_end = class.line_end;
        node.properties = properties;
        node.complexity = class.methods.iter().map(|m| m.complexity).sum();
        scratch.push_node(node);

        scratch.push_edge(Edge::new(&module_id, EdgeType::Contains, &class_id));

        scratch
            .classes
            .entry(class.name.clone())
            .or_insert_with(|| class_id.clone());
        scratch
            .classes_by_module
            .entry(module.path.clone())
            .or_default()
            .push((class.name.clone(), class_id.clone()));

        for method in &class.methods {
            let method_id = ids::method_id(&module.path, &class.name, &method.name);
            let mut node = Self::function_node(module, method, method_id.clone());
            node.qualified_name =
                Some(format!("{}.{}.{}", module.name, class.name, method.name));
            scratch.push_node(node);
            scratch.push_edge(Edge::new(&class_id, EdgeType::Contains, &method_id));
            scratch
                .methods
                .insert((class_id.clone(), method.name.clone()), method_id);
        }
    }

    fn declare_module_function(
        module: &ModuleModel,
        function: &FunctionModel,
        scratch: &mut Scratch,
    ) {
        let function_id = ids::function_id(&module.path, &function.name);
        let module_id = ids::module_id(&module.path);

        let mut node = Self::function_node(module, function, function_id.clone());
        node.qualified_name = Some(format!("{}.{}", module.name, function.name));
        scratch.push_node(node);
        scratch.push_edge(Edge::new(&module_id, EdgeType::Contains, &function_id));

        scratch.module_functions.insert(
            (module.path.clone(), function.name.clone()),
            function_id,
        );
    }

    fn function_node(module: &ModuleModel, function: &FunctionModel, id: String) -> Node {
        let mut properties = Map::new();
        if !function.parameters.is_empty() {
            let params: Vec<Value> = function
                .parameters
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "annotation": p.annotation,
                        "default": p.default,
                    })
                })
                .collect();
            properties.insert("parameters".to_string(), json!(params));
        }
        if let Some(rt) = &function.return_type {
            properties.insert("return_type".to_string(), json!(rt));
        }
        if !function.decorators.is_empty() {
            properties.insert("decorators".to_string(), json!(function.decorators));
        }
        if function.is_async {
            properties.insert("is_async".to_string(), json!(true));
        }
        if function.is_static {
            properties.insert("is_static".to_string(), json!(true));
        }
        if function.is_classmethod {
            properties.insert("is_classmethod".to_string(), json!(true));
        }
        if function.is_property {
            properties.insert("is_property".to_string(), json!(true));
        }
        if let Some(doc) = &function.docstring {
            properties.insert("docstring".to_string(), json!(doc));
        }

        let mut node = Node::new(id, NodeType::Function, &function.name);
        node.file_path = Some(module.path.clone());
        node.line_start = function.line_start;
        node.line_end = function.line_end;
        node.properties = properties;
        node.complexity = function.complexity;
        node
    }

    fn resolve_base(base: &str, module_path: &str, scratch: &Scratch) -> Option<String> {
        // Same-module class first, then the global class table, then an
        // imported name that points at a class in the target module.
        if let Some(classes) = scratch.classes_by_module.get(module_path) {
            if let Some((_, id)) = classes.iter().find(|(name, _)| name == base) {
                return Some(id.clone());
            }
        }
        if let Some(id) = scratch.classes.get(base) {
            return Some(id.clone());
        }
        let target_path = scratch.aliases.get(module_path)?.get(base)?;
        let classes = scratch.classes_by_module.get(target_path)?;
        classes
            .iter()
            .find(|(name, _)| name == base)
            .map(|(_, id)| id.clone())
    }

    // === Pass 3: calls ===

    fn pass_calls(modules: &[ModuleModel], scratch: &mut Scratch) {
        let mut resolved = 0_usize;
        let mut dropped = 0_usize;

        for module in modules {
            for function in &module.functions {
                let caller_id = ids::function_id(&module.path, &function.name);
                for site in &function.call_sites {
                    match Self::resolve_call(site, &module.path, None, scratch) {
                        Some(target) => {
                            scratch.push_edge(Edge::call(&caller_id, &target, site.line));
                            resolved += 1;
                        }
                        None => {
                            trace!(
                                caller = %caller_id,
                                callee = %site.callee,
                                line = site.line,
                                "Call site unresolved, skipping"
                            );
                            dropped += 1;
                        }
                    }
                }
            }
            for class in &module.classes {
                let class_id = ids::class_id(&module.path, &class.name);
                for method in &class.methods {
                    let caller_id = ids::method_id(&module.path, &class.name, &method.name);
                    for site in &method.call_sites {
                        match Self::resolve_call(site, &module.path, Some(&class_id), scratch) {
                            Some(target) => {
                                scratch.push_edge(Edge::call(&caller_id, &target, site.line));
                                resolved += 1;
                            }
                            None => {
                                trace!(
                                    caller = %caller_id,
                                    callee = %site.callee,
                                    line = site.line,
                                    "Call site unresolved, skipping"
                                );
                                dropped += 1;
                            }
                        }
                    }
                }
            }
        }

        debug!(resolved, dropped, "Call resolution pass completed");
    }

    /// Resolve one call site through the priority ladder; first match wins.
    fn resolve_call(
        site: &CallSite,
        module_path: &str,
        enclosing_class: Option<&str>,
        scratch: &Scratch,
    ) -> Option<String> {
        // Extractors may hand a dotted callee instead of a split receiver.
        let (receiver, callee) = match (&site.receiver, site.callee.split_once('.')) {
            (Some(r), _) => (Some(r.as_str()), site.callee.as_str()),
            (None, Some((r, c))) => (Some(r), c),
            (None, None) => (None, site.callee.as_str()),
        };

        // (a) self.method() inside the same class.
        if receiver == Some("self") {
            let class_id = enclosing_class?;
            return scratch
                .methods
                .get(&(class_id.to_string(), callee.to_string()))
                .cloned();
        }

        if let Some(receiver) = receiver {
            // (d) Receiver.method where Receiver is a local class or an
            // imported module alias.
            if let Some(classes) = scratch.classes_by_module.get(module_path) {
                if let Some((_, class_id)) = classes.iter().find(|(name, _)| name == receiver) {
                    return scratch
                        .methods
                        .get(&(class_id.clone(), callee.to_string()))
                        .cloned();
                }
            }
            if let Some(class_id) = scratch.classes.get(receiver) {
                if let Some(target) = scratch
                    .methods
                    .get(&(class_id.clone(), callee.to_string()))
                {
                    return Some(target.clone());
                }
            }
            let target_path = scratch.aliases.get(module_path)?.get(receiver)?;
            return scratch
                .module_functions
                .get(&(target_path.clone(), callee.to_string()))
                .cloned();
        }

        // (b) Module-scope function in the same module.
        if let Some(target) = scratch
            .module_functions
            .get(&(module_path.to_string(), callee.to_string()))
        {
            return Some(target.clone());
        }

        // (c) A name imported into this module: resolve to the function of
        // the same name in the target module.
        let target_path = scratch.aliases.get(module_path)?.get(callee)?;
        scratch
            .module_functions
            .get(&(target_path.clone(), callee.to_string()))
            .cloned()
    }

    // === Pass 4: type uses ===

    fn pass_type_uses(modules: &[ModuleModel], scratch: &mut Scratch) {
        for module in modules {
            for class in &module.classes {
                let class_id = ids::class_id(&module.path, &class.name);
                for type_name in &class.referenced_types {
                    if is_builtin_type(type_name) {
                        continue;
                    }
                    if let Some(target) =
                        Self::resolve_type_use(type_name, &module.path, scratch)
                    {
                        if target != class_id {
                            scratch.push_edge(Edge::new(&class_id, EdgeType::Uses, &target));
                        }
                    }
                }
            }
        }
    }

    fn resolve_type_use(
        type_name: &str,
        module_path: &str,
        scratch: &Scratch,
    ) -> Option<String> {
        // (a) Direct class-name table.
        if let Some(id) = scratch.classes.get(type_name) {
            return Some(id.clone());
        }
        // (b) Import alias → target module → class of the same name.
        if let Some(aliases) = scratch.aliases.get(module_path) {
            if let Some(target_path) = aliases.get(type_name) {
                if let Some(classes) = scratch.classes_by_module.get(target_path) {
                    if let Some((_, id)) = classes.iter().find(|(name, _)| name == type_name) {
                        return Some(id.clone());
                    }
                }
            }
        }
        // (c) Same-module class scan.
        scratch
            .classes_by_module
            .get(module_path)?
            .iter()
            .find(|(name, _)| name == type_name)
            .map(|(_, id)| id.clone())
    }
}

/// Built-in / typing names excluded from USES resolution.
fn is_builtin_type(name: &str) -> bool {
    matches!(
        name,
        "str" | "int" | "float" | "bool" | "bytes" | "list" | "dict" | "set" | "tuple"
            | "object" | "None" | "Any" | "Optional" | "List" | "Dict" | "Set" | "Tuple"
            | "Union" | "Callable" | "Iterable" | "Iterator"
    )
}

/// Match an import string against the known module paths.
///
/// Tiers, in order: exact dotted-path equivalence, dotted suffix match,
/// path-suffix match with a `/`-or-equality boundary. Relative imports are
/// rebased onto the importing module's own path before matching.
///
/// Returns the matched module path, or `None` for stdlib/third-party
/// imports (absence is normal, not an error).
pub(crate) fn resolve_import_path(
    import: &str,
    importer_path: &str,
    module_paths: &[String],
) -> Option<String> {
    let dots = import.chars().take_while(|&c| c == '.').count();
    let absolute = if dots > 0 {
        let rest = &import[dots..];
        let segments: Vec<&str> = importer_path.split('/').collect();
        if dots > segments.len() {
            return None;
        }
        let base = &segments[..segments.len() - dots];
        if rest.is_empty() {
            base.join(".")
        } else if base.is_empty() {
            rest.to_string()
        } else {
            format!("{}.{rest}", base.join("."))
        }
    } else {
        import.to_string()
    };

    if absolute.is_empty() {
        return None;
    }

    // (i) Exact dotted-path equivalence.
    for path in module_paths {
        if dotted_form(path) == absolute {
            return Some(path.clone());
        }
    }

    // (ii) Dotted suffix match.
    let dotted_suffix = format!(".{absolute}");
    for path in module_paths {
        if dotted_form(path).ends_with(&dotted_suffix) {
            return Some(path.clone());
        }
    }

    // (iii) Path-suffix match with a boundary: `logging` must not match
    // `error_logging.py`.
    let slashed = absolute.replace('.', "/");
    let path_suffix = format!("/{slashed}");
    for path in module_paths {
        let trimmed = trim_module_path(path);
        if trimmed == slashed || trimmed.ends_with(&path_suffix) {
            return Some(path.clone());
        }
    }

    None
}

/// Strip `.py` and `__init__` suffixes from a module path.
fn trim_module_path(path: &str) -> String {
    let path = path.strip_suffix(".py").unwrap_or(path);
    let path = path.strip_suffix("/__init__").unwrap_or(path);
    path.to_string()
}

/// Convert a module path to its dotted equivalent.
fn dotted_form(path: &str) -> String {
    trim_module_path(path).replace('/', ".")
}
