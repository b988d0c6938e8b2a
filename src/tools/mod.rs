//! Tool catalogue and dispatch
//!
//! A [`ToolRegistry`] maps tool names to an argument schema and a typed
//! handler. Dispatch validates the raw JSON arguments, deserializes them
//! once into the handler's argument struct and runs the handler. Only
//! router-level problems (unknown tool, malformed arguments) come back as
//! [`DispatchError`]; database failures are already folded into an error
//! [`ToolResult`] by the handler.

mod catalog;
mod handlers;
pub mod schema;

pub use schema::{ArgSchema, FieldKind};

use crate::db::Database;
use crate::error::{DispatchError, FieldIssue, IssueKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// One block of tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Result envelope shared by every tool: text content, plus `isError`
/// when the call failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub content: Vec<TextContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent {
                kind: "text",
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// All text blocks joined together
    pub fn body(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type Handler = Box<dyn Fn(&Database, Value) -> Result<ToolResult, DispatchError> + Send + Sync>;

/// Name, description and schema of a registered tool
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ArgSchema,
}

impl ToolSpec {
    /// MCP `tools/list` entry
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.schema.to_json_schema(),
        })
    }
}

struct Entry {
    spec: ToolSpec,
    handler: Handler,
}

/// Registered tools in registration order
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full project-knowledge catalogue
    pub fn standard() -> Self {
        catalog::standard()
    }

    /// Add a tool. Names are unique; registering one twice is a
    /// programming error.
    pub fn register<A, F>(
        &mut self,
        name: &'static str,
        description: &'static str,
        schema: ArgSchema,
        handler: F,
    ) where
        A: DeserializeOwned,
        F: Fn(&Database, A) -> ToolResult + Send + Sync + 'static,
    {
        assert!(
            !self.index.contains_key(name),
            "tool `{name}` registered twice"
        );

        let handler: Handler = Box::new(move |db: &Database, args: Value| {
            let parsed: A = serde_json::from_value(args).map_err(|e| {
                DispatchError::InvalidArguments {
                    tool: name.to_string(),
                    issues: vec![FieldIssue {
                        field: String::new(),
                        problem: IssueKind::Invalid {
                            reason: e.to_string(),
                        },
                    }],
                }
            })?;
            Ok(handler(db, parsed))
        });

        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            spec: ToolSpec {
                name,
                description,
                schema,
            },
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.entries[i].spec)
    }

    /// Catalogue in registration order
    pub fn list(&self) -> impl Iterator<Item = &ToolSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    /// `tools/list` payload
    pub fn descriptors(&self) -> Vec<Value> {
        self.list().map(ToolSpec::descriptor).collect()
    }

    /// Validate `args` against the tool's schema and run its handler
    pub fn dispatch(
        &self,
        db: &Database,
        name: &str,
        args: Value,
    ) -> Result<ToolResult, DispatchError> {
        let Some(&i) = self.index.get(name) else {
            return Err(DispatchError::UnknownTool(name.to_string()));
        };
        let entry = &self.entries[i];

        let normalized = entry
            .spec
            .schema
            .validate(&args)
            .map_err(|issues| DispatchError::InvalidArguments {
                tool: name.to_string(),
                issues,
            })?;

        (entry.handler)(db, Value::Object(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;
    use crate::db::{ContextFilter, StoreContext};

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            "store_context",
            "Store project context information",
            ArgSchema::new()
                .required("projectName", FieldKind::Key)
                .required("contextType", FieldKind::Key)
                .required("content", FieldKind::String)
                .optional("metadata", FieldKind::Object),
            |db: &Database, args: StoreContext| match db.store_context(&args) {
                Ok(record) => ToolResult::text(format!("stored {}", record.id)),
                Err(e) => ToolResult::error(e.to_string()),
            },
        );
        registry.register(
            "get_context",
            "Retrieve project context information",
            ArgSchema::new().required("projectName", FieldKind::Key),
            |db: &Database, args: ContextFilter| match db.get_context(&args) {
                Ok(rows) => ToolResult::text(format!("{} rows", rows.len())),
                Err(e) => ToolResult::error(e.to_string()),
            },
        );
        registry
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = echo_registry();
        let names: Vec<&str> = registry.list().map(|t| t.name).collect();
        assert_eq!(names, vec!["store_context", "get_context"]);
        assert_eq!(registry.descriptors()[1]["inputSchema"]["required"], json!(["projectName"]));
    }

    #[test]
    fn test_dispatch_routes_to_handler() {
        let (db, _dir) = temp_db();
        let registry = echo_registry();
        let result = registry
            .dispatch(
                &db,
                "store_context",
                json!({"projectName": "p", "contextType": "t", "content": "c"}),
            )
            .unwrap();
        assert!(!result.is_error);
        assert!(result.body().starts_with("stored "));

        let read = registry
            .dispatch(&db, "get_context", json!({"projectName": "p"}))
            .unwrap();
        assert_eq!(read.body(), "1 rows");
    }

    #[test]
    fn test_unknown_tool() {
        let (db, _dir) = temp_db();
        let err = echo_registry()
            .dispatch(&db, "drop_everything", json!({}))
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTool(name) if name == "drop_everything"));
    }

    #[test]
    fn test_invalid_arguments_name_every_field() {
        let (db, _dir) = temp_db();
        let err = echo_registry()
            .dispatch(&db, "store_context", json!({"projectName": "p", "content": 5}))
            .unwrap_err();
        match err {
            DispatchError::InvalidArguments { tool, issues } => {
                assert_eq!(tool, "store_context");
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, vec!["contextType", "content"]);
            }
            other => panic!("expected InvalidArguments, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_value_is_invalid_arguments() {
        let (db, _dir) = temp_db();
        let mut registry = ToolRegistry::new();
        registry.register(
            "get_context",
            "",
            ArgSchema::new()
                .required("projectName", FieldKind::Key)
                .optional("limit", FieldKind::Count),
            |_: &Database, _: ContextFilter| ToolResult::text("unreachable"),
        );
        let err = registry
            .dispatch(&db, "get_context", json!({"projectName": "p", "limit": 5_000_000_000u64}))
            .unwrap_err();
        let DispatchError::InvalidArguments { issues, .. } = err else {
            panic!("expected InvalidArguments, got {err:?}");
        };
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "limit");
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let mut registry = echo_registry();
        registry.register(
            "get_context",
            "",
            ArgSchema::new(),
            |_: &Database, _: Value| ToolResult::text(""),
        );
    }

    #[test]
    fn test_envelope_serialization() {
        let ok = serde_json::to_value(ToolResult::text("done")).unwrap();
        assert_eq!(ok, json!({"content": [{"type": "text", "text": "done"}]}));

        let err = serde_json::to_value(ToolResult::error("Error storing context: boom")).unwrap();
        assert_eq!(err["isError"], json!(true));
        assert_eq!(err["content"][0]["text"], "Error storing context: boom");
    }
}
