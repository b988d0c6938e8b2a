//! Declared argument shapes for tools
//!
//! An [`ArgSchema`] is checked before any handler runs. Checking reports
//! every problem at once so a caller can fix all of them in one retry.

use crate::error::{FieldIssue, IssueKind};
use serde_json::{json, Map, Value};

/// Primitive or structural type of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty string; used for project names and natural-key parts
    Key,
    String,
    Number,
    /// Non-negative integer that fits `i32` (limits, line counts, durations)
    Count,
    /// Non-negative integer that fits `i64` (byte sizes)
    Size,
    Boolean,
    Object,
    StringArray,
}

impl FieldKind {
    fn expected(self) -> &'static str {
        match self {
            FieldKind::Key => "a non-empty string",
            FieldKind::String => "a string",
            FieldKind::Number => "a number",
            FieldKind::Count => "a non-negative integer up to 2147483647",
            FieldKind::Size => "a non-negative integer up to 9223372036854775807",
            FieldKind::Boolean => "a boolean",
            FieldKind::Object => "an object",
            FieldKind::StringArray => "an array of strings",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Key | FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Count => value.as_u64().is_some_and(|n| n <= i32::MAX as u64),
            FieldKind::Size => value.as_u64().is_some_and(|n| n <= i64::MAX as u64),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn json_schema(self) -> Value {
        match self {
            FieldKind::Key => json!({"type": "string", "minLength": 1}),
            FieldKind::String => json!({"type": "string"}),
            FieldKind::Number => json!({"type": "number"}),
            FieldKind::Count => json!({"type": "integer", "minimum": 0, "maximum": i32::MAX}),
            FieldKind::Size => json!({"type": "integer", "minimum": 0, "maximum": i64::MAX}),
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Object => json!({"type": "object"}),
            FieldKind::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_u64() => "an integer",
        Value::Number(n) if n.is_i64() => "a negative integer",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(items) if items.iter().all(Value::is_string) => "an array of strings",
        Value::Array(_) => "an array with non-string items",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

/// Declared fields of one tool, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ArgSchema {
    fields: Vec<Field>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }

    /// Check `args` and return them with `null` optionals removed.
    ///
    /// Fields the schema does not declare are passed through untouched.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, Vec<FieldIssue>> {
        let Some(object) = args.as_object() else {
            return Err(vec![FieldIssue {
                field: String::new(),
                problem: IssueKind::NotAnObject,
            }]);
        };

        let mut issues = Vec::new();
        let mut normalized = object.clone();

        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    normalized.remove(field.name);
                    if field.required {
                        issues.push(FieldIssue {
                            field: field.name.to_string(),
                            problem: IssueKind::Missing,
                        });
                    }
                }
                Some(value) if !field.kind.accepts(value) => issues.push(FieldIssue {
                    field: field.name.to_string(),
                    problem: IssueKind::WrongType {
                        expected: field.kind.expected(),
                        found: describe(value),
                    },
                }),
                Some(Value::String(s)) if field.kind == FieldKind::Key && s.trim().is_empty() => {
                    issues.push(FieldIssue {
                        field: field.name.to_string(),
                        problem: IssueKind::Empty,
                    })
                }
                Some(_) => {}
            }
        }

        if issues.is_empty() {
            Ok(normalized)
        } else {
            Err(issues)
        }
    }

    /// JSON Schema advertised in `tools/list`
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.name.to_string(), field.kind.json_schema());
        }
        let required: Vec<&str> = self.required_fields().collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
