//! Language-neutral module model: the input contract for graph builds.
//!
//! Language-specific front ends (Python, TypeScript, Go, ...) extract source
//! into this standardized shape; the kernel never sees an AST. All fields
//! deserialize with serde, so structurally invalid input is rejected at the
//! deserialization boundary rather than inside the builder.

use serde::{Deserialize, Serialize};

/// One extracted source module, the unit of graph construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleModel {
    /// Dotted module name (e.g. `app.services.auth`).
    pub name: String,
    /// Source file path, used to derive node ids.
    pub path: String,
    /// Source language tag (informational, carried into node properties).
    pub language: String,
    /// Import statements in source order.
    #[serde(default)]
    pub imports: Vec<ImportModel>,
    /// Classes declared at module scope.
    #[serde(default)]
    pub classes: Vec<ClassModel>,
    /// Functions declared at module scope.
    #[serde(default)]
    pub functions: Vec<FunctionModel>,
    /// Total line count of the source file.
    #[serde(default)]
    pub total_lines: u32,
}

/// One import statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportModel {
    /// The imported module path as written (dotted; may lead with dots
    /// for relative imports).
    pub module: String,
    /// Names imported by a `from` import.
    #[serde(default)]
    pub names: Vec<String>,
    /// Local alias, if the import was aliased.
    #[serde(default)]
    pub alias: Option<String>,
    /// Whether this is a `from <module> import <names>` form.
    #[serde(default)]
    pub is_from: bool,
    /// Whether the import is computed at runtime.
    #[serde(default)]
    pub is_dynamic: bool,
    /// The pattern observed for a dynamic import, when one was recognized.
    #[serde(default)]
    pub dynamic_pattern: Option<String>,
}

/// One class declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassModel {
    /// Class name.
    pub name: String,
    /// Base class names as written in source.
    #[serde(default)]
    pub bases: Vec<String>,
    /// Decorator names.
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Attribute names declared on the class.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Methods declared in the class body.
    #[serde(default)]
    pub methods: Vec<FunctionModel>,
    /// Type names referenced in parameter and return annotations,
    /// collected by the extractor.
    #[serde(default)]
    pub referenced_types: Vec<String>,
    /// First source line, when known.
    #[serde(default)]
    pub line_start: Option<u32>,
    /// Last source line, when known.
    #[serde(default)]
    pub line_end: Option<u32>,
    /// Docstring, when present.
    #[serde(default)]
    pub docstring: Option<String>,
}

/// One function or method declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionModel {
    /// Function name.
    pub name: String,
    /// Declared parameters in order.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Return type annotation, when present.
    #[serde(default)]
    pub return_type: Option<String>,
    /// Decorator names.
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Whether the function is `async`.
    #[serde(default)]
    pub is_async: bool,
    /// Whether the method is static.
    #[serde(default)]
    pub is_static: bool,
    /// Whether the method is a classmethod.
    #[serde(default)]
    pub is_classmethod: bool,
    /// Whether the method is a property accessor.
    #[serde(default)]
    pub is_property: bool,
    /// Cyclomatic complexity measured by the extractor.
    #[serde(default)]
    pub complexity: u32,
    /// Call sites observed in the function body.
    #[serde(default)]
    pub call_sites: Vec<CallSite>,
    /// First source line, when known.
    #[serde(default)]
    pub line_start: Option<u32>,
    /// Last source line, when known.
    #[serde(default)]
    pub line_end: Option<u32>,
    /// Docstring, when present.
    #[serde(default)]
    pub docstring: Option<String>,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Type annotation, when present.
    #[serde(default)]
    pub annotation: Option<String>,
    /// Default value expression, when present.
    #[serde(default)]
    pub default: Option<String>,
}

/// One observed call site inside a function body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    /// The called name (`login`, not `self.login`).
    pub callee: String,
    /// The receiver for dotted calls (`self`, a class name, or an
    /// imported module alias). `None` for bare calls.
    #[serde(default)]
    pub receiver: Option<String>,
    /// Source line of the call.
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_model_deserializes_with_defaults() {
        let json = r#"{"name": "app.auth", "path": "app/auth.py", "language": "python"}"#;
        let module: ModuleModel = serde_json::from_str(json).unwrap();

        assert_eq!(module.name, "app.auth");
        assert!(module.imports.is_empty());
        assert!(module.classes.is_empty());
        assert_eq!(module.total_lines, 0);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        // No `path` - a contract violation surfaced by serde, not the builder.
        let json = r#"{"name": "app.auth", "language": "python"}"#;
        let result: serde_json::Result<ModuleModel> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn call_site_carries_receiver_and_line() {
        let json = r#"{"callee": "save", "receiver": "self", "line": 12}"#;
        let site: CallSite = serde_json::from_str(json).unwrap();
        assert_eq!(site.receiver.as_deref(), Some("self"));
        assert_eq!(site.line, 12);
    }
}
