//! The standard tool catalogue, in advertised order

use super::handlers;
use super::{ArgSchema, FieldKind as F, ToolRegistry};

fn scoped() -> ArgSchema {
    ArgSchema::new().required("projectName", F::Key)
}

pub(super) fn standard() -> ToolRegistry {
    let mut tools = ToolRegistry::new();

    tools.register(
        "store_context",
        "Store project context information",
        scoped()
            .required("contextType", F::Key)
            .required("content", F::String)
            .optional("metadata", F::Object),
        handlers::store_context,
    );
    tools.register(
        "get_context",
        "Retrieve project context information",
        scoped()
            .optional("contextType", F::String)
            .optional("limit", F::Count),
        handlers::get_context,
    );

    tools.register(
        "store_conversation",
        "Store conversation history",
        scoped()
            .required("conversationId", F::Key)
            .required("messageType", F::Key)
            .required("content", F::String)
            .optional("metadata", F::Object),
        handlers::store_conversation,
    );
    tools.register(
        "get_conversation_history",
        "Retrieve conversation history",
        scoped()
            .optional("conversationId", F::String)
            .optional("limit", F::Count),
        handlers::get_conversation_history,
    );

    tools.register(
        "store_file_history",
        "Store file version history with changes tracking",
        scoped()
            .required("filePath", F::Key)
            .required("content", F::String)
            .required("author", F::Key)
            .optional("commitHash", F::String)
            .optional("changeDescription", F::String)
            .optional("metadata", F::Object),
        handlers::store_file_history,
    );
    tools.register(
        "get_file_history",
        "Retrieve file version history",
        scoped()
            .optional("filePath", F::String)
            .optional("limit", F::Count),
        handlers::get_file_history,
    );

    tools.register(
        "store_project_user",
        "Add or update project user with role and permissions",
        scoped()
            .required("username", F::Key)
            .required("email", F::Key)
            .optional("role", F::String)
            .optional("permissions", F::Object)
            .optional("isActive", F::Boolean)
            .optional("metadata", F::Object),
        handlers::store_project_user,
    );
    tools.register(
        "get_project_users",
        "Retrieve project users and their roles",
        scoped()
            .optional("role", F::String)
            .optional("activeOnly", F::Boolean)
            .optional("limit", F::Count),
        handlers::get_project_users,
    );

    tools.register(
        "store_project_task",
        "Store or update project tasks, issues, and tickets",
        scoped()
            .required("taskId", F::Key)
            .required("title", F::String)
            .optional("description", F::String)
            .optional("status", F::String)
            .optional("priority", F::String)
            .optional("taskType", F::String)
            .optional("assignee", F::String)
            .optional("reporter", F::String)
            .optional("metadata", F::Object),
        handlers::store_project_task,
    );
    tools.register(
        "get_project_tasks",
        "Retrieve project tasks with filtering options",
        scoped()
            .optional("status", F::String)
            .optional("assignee", F::String)
            .optional("priority", F::String)
            .optional("taskType", F::String)
            .optional("limit", F::Count),
        handlers::get_project_tasks,
    );

    tools.register(
        "store_project_dependency",
        "Store project dependencies and package versions",
        scoped()
            .required("packageName", F::Key)
            .required("version", F::Key)
            .required("packageManager", F::Key)
            .optional("dependencyType", F::String)
            .optional("license", F::String)
            .optional("description", F::String)
            .optional("isActive", F::Boolean)
            .optional("metadata", F::Object),
        handlers::store_project_dependency,
    );
    tools.register(
        "get_project_dependencies",
        "Retrieve project dependencies with filtering",
        scoped()
            .optional("packageManager", F::String)
            .optional("dependencyType", F::String)
            .optional("activeOnly", F::Boolean)
            .optional("limit", F::Count),
        handlers::get_project_dependencies,
    );

    tools.register(
        "store_environment_config",
        "Store environment variables and configurations",
        scoped()
            .required("environmentName", F::Key)
            .required("configKey", F::Key)
            .required("configValue", F::String)
            .optional("isSensitive", F::Boolean)
            .optional("description", F::String)
            .optional("metadata", F::Object),
        handlers::store_environment_config,
    );
    tools.register(
        "get_environment_configs",
        "Retrieve environment configurations",
        scoped()
            .optional("environmentName", F::String)
            .optional("includeSensitive", F::Boolean)
            .optional("limit", F::Count),
        handlers::get_environment_configs,
    );

    tools.register(
        "log_activity",
        "Log project activities and audit trail",
        scoped()
            .required("activityType", F::Key)
            .required("actor", F::Key)
            .required("target", F::Key)
            .required("action", F::Key)
            .optional("details", F::String)
            .optional("ipAddress", F::String)
            .optional("userAgent", F::String)
            .optional("metadata", F::Object),
        handlers::log_activity,
    );
    tools.register(
        "get_activity_logs",
        "Retrieve project activity logs",
        scoped()
            .optional("activityType", F::String)
            .optional("actor", F::String)
            .optional("target", F::String)
            .optional("limit", F::Count),
        handlers::get_activity_logs,
    );

    tools.register(
        "store_build",
        "Store build information and test results",
        scoped()
            .required("buildNumber", F::Key)
            .required("buildType", F::Key)
            .required("status", F::Key)
            .optional("branchName", F::String)
            .optional("commitHash", F::String)
            .optional("triggeredBy", F::String)
            .optional("testResults", F::Object)
            .optional("metadata", F::Object),
        handlers::store_build,
    );
    tools.register(
        "update_build_status",
        "Update build status and completion information",
        scoped()
            .required("buildNumber", F::Key)
            .required("status", F::Key)
            .optional("endTime", F::String)
            .optional("durationSeconds", F::Count)
            .optional("logs", F::String),
        handlers::update_build_status,
    );
    tools.register(
        "get_build_history",
        "Retrieve build history with filtering options",
        scoped()
            .optional("status", F::String)
            .optional("branchName", F::String)
            .optional("limit", F::Count),
        handlers::get_build_history,
    );

    tools.register(
        "store_documentation",
        "Store project documentation and resources",
        scoped()
            .required("docType", F::Key)
            .required("title", F::Key)
            .required("content", F::String)
            .optional("format", F::String)
            .optional("version", F::String)
            .optional("author", F::String)
            .optional("tags", F::StringArray)
            .optional("isPublished", F::Boolean)
            .optional("externalUrl", F::String)
            .optional("metadata", F::Object),
        handlers::store_documentation,
    );
    tools.register(
        "get_documentation",
        "Retrieve project documentation",
        scoped()
            .optional("docType", F::String)
            .optional("publishedOnly", F::Boolean)
            .optional("limit", F::Count),
        handlers::get_documentation,
    );

    tools.register(
        "store_project_component",
        "Store project components and modules",
        scoped()
            .required("componentName", F::Key)
            .required("componentType", F::Key)
            .optional("filePath", F::String)
            .optional("description", F::String)
            .optional("version", F::String)
            .optional("isActive", F::Boolean)
            .optional("metadata", F::Object),
        handlers::store_project_component,
    );
    tools.register(
        "store_component_relationship",
        "Store relationships between components",
        scoped()
            .required("sourceComponent", F::Key)
            .required("targetComponent", F::Key)
            .required("relationshipType", F::Key)
            .optional("strength", F::Number)
            .optional("description", F::String)
            .optional("isDirected", F::Boolean)
            .optional("metadata", F::Object),
        handlers::store_component_relationship,
    );
    tools.register(
        "get_project_components",
        "Retrieve project components",
        scoped()
            .optional("componentType", F::String)
            .optional("activeOnly", F::Boolean)
            .optional("limit", F::Count),
        handlers::get_project_components,
    );
    tools.register(
        "get_component_relationships",
        "Retrieve component relationships",
        scoped()
            .optional("sourceComponent", F::String)
            .optional("targetComponent", F::String)
            .optional("relationshipType", F::String)
            .optional("limit", F::Count),
        handlers::get_component_relationships,
    );

    tools.register(
        "store_file_metadata",
        "Store file metadata and properties",
        scoped()
            .required("filePath", F::Key)
            .required("fileName", F::Key)
            .optional("fileExtension", F::String)
            .optional("fileSize", F::Size)
            .optional("fileType", F::String)
            .optional("language", F::String)
            .optional("lineCount", F::Count)
            .optional("lastAuthor", F::String)
            .optional("checksum", F::String)
            .optional("isBinary", F::Boolean)
            .optional("isGenerated", F::Boolean)
            .optional("metadata", F::Object),
        handlers::store_file_metadata,
    );
    tools.register(
        "get_file_metadata",
        "Retrieve file metadata with filtering",
        scoped()
            .optional("fileType", F::String)
            .optional("language", F::String)
            .optional("includeBinary", F::Boolean)
            .optional("limit", F::Count),
        handlers::get_file_metadata,
    );

    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;
    use crate::error::DispatchError;
    use serde_json::{json, Value};
    use std::collections::HashSet;

    const ORDER: [&str; 27] = [
        "store_context",
        "get_context",
        "store_conversation",
        "get_conversation_history",
        "store_file_history",
        "get_file_history",
        "store_project_user",
        "get_project_users",
        "store_project_task",
        "get_project_tasks",
        "store_project_dependency",
        "get_project_dependencies",
        "store_environment_config",
        "get_environment_configs",
        "log_activity",
        "get_activity_logs",
        "store_build",
        "update_build_status",
        "get_build_history",
        "store_documentation",
        "get_documentation",
        "store_project_component",
        "store_component_relationship",
        "get_project_components",
        "get_component_relationships",
        "store_file_metadata",
        "get_file_metadata",
    ];

    #[test]
    fn test_catalogue_order_and_uniqueness() {
        let tools = standard();
        let names: Vec<&str> = tools.list().map(|t| t.name).collect();
        assert_eq!(names, ORDER);
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), names.len());
    }

    #[test]
    fn test_every_tool_is_project_scoped() {
        for tool in standard().list() {
            let schema = tool.schema.to_json_schema();
            assert_eq!(schema["required"][0], "projectName", "{}", tool.name);
            let properties = schema["properties"].as_object().unwrap();
            for field in tool.schema.required_fields() {
                assert!(properties.contains_key(field), "{}: {}", tool.name, field);
            }
            if tool.name.starts_with("get_") {
                assert!(properties.contains_key("limit"), "{} has no limit", tool.name);
            }
            assert!(!tool.description.is_empty());
        }
    }

    /// One minimal write and a read that should see it, per entity kind
    fn pairs() -> Vec<(&'static str, Value, &'static str, &'static str)> {
        vec![
            ("store_context", json!({"contextType": "arch", "content": "hexagonal"}), "get_context", "hexagonal"),
            ("store_conversation", json!({"conversationId": "c1", "messageType": "user", "content": "hello"}), "get_conversation_history", "user: hello"),
            ("store_file_history", json!({"filePath": "src/a.rs", "content": "fn a() {}", "author": "ana"}), "get_file_history", "Version 1 - src/a.rs"),
            ("store_project_user", json!({"username": "ana", "email": "ana@example.com"}), "get_project_users", "Role: developer"),
            ("store_project_task", json!({"taskId": "T1", "title": "Ship"}), "get_project_tasks", "Assignee: Unassigned"),
            ("store_project_dependency", json!({"packageName": "serde", "version": "1.0", "packageManager": "cargo"}), "get_project_dependencies", "Package: serde@1.0"),
            ("store_environment_config", json!({"environmentName": "dev", "configKey": "PORT", "configValue": "8080"}), "get_environment_configs", "Value: 8080"),
            ("log_activity", json!({"activityType": "deploy", "actor": "ci", "target": "prod", "action": "released"}), "get_activity_logs", "deploy: ci released prod"),
            ("store_build", json!({"buildNumber": "42", "buildType": "ci", "status": "running"}), "get_build_history", "Build: 42"),
            ("store_documentation", json!({"docType": "guide", "title": "Setup", "content": "cargo build"}), "get_documentation", "Format: markdown"),
            ("store_project_component", json!({"componentName": "api", "componentType": "service"}), "get_project_components", "Name: api"),
            ("store_component_relationship", json!({"sourceComponent": "api", "targetComponent": "db", "relationshipType": "uses"}), "get_component_relationships", "api uses db"),
            ("store_file_metadata", json!({"filePath": "src/a.rs", "fileName": "a.rs", "language": "rust"}), "get_file_metadata", "Language: rust"),
        ]
    }

    #[test]
    fn test_every_entity_round_trips_through_dispatch() {
        let (db, _dir) = temp_db();
        let tools = standard();

        for (write, mut args, read, expected) in pairs() {
            args["projectName"] = json!("demo");
            let stored = tools.dispatch(&db, write, args).unwrap();
            assert!(!stored.is_error, "{}: {}", write, stored.body());
            assert!(stored.body().starts_with("Success"), "{}", stored.body());

            let listed = tools.dispatch(&db, read, json!({"projectName": "demo"})).unwrap();
            assert!(
                listed.body().contains(expected),
                "{} did not contain {:?}:\n{}",
                read,
                expected,
                listed.body()
            );

            let other = tools.dispatch(&db, read, json!({"projectName": "other"})).unwrap();
            assert!(other.body().starts_with("No "), "{}", other.body());
        }
    }

    #[test]
    fn test_task_upsert_through_dispatch() {
        let (db, _dir) = temp_db();
        let tools = standard();
        for title in ["Title", "Title2"] {
            tools
                .dispatch(&db, "store_project_task", json!({"projectName": "p", "taskId": "T1", "title": title}))
                .unwrap();
        }
        let body = tools
            .dispatch(&db, "get_project_tasks", json!({"projectName": "p"}))
            .unwrap()
            .body();
        assert_eq!(body.matches("ID: T1").count(), 1);
        assert!(body.contains("Title: Title2"));
    }

    #[test]
    fn test_build_lifecycle_through_dispatch() {
        let (db, _dir) = temp_db();
        let tools = standard();
        tools
            .dispatch(
                &db,
                "store_build",
                json!({"projectName": "p", "buildNumber": "7", "buildType": "ci", "status": "running", "branchName": "main"}),
            )
            .unwrap();
        let updated = tools
            .dispatch(
                &db,
                "update_build_status",
                json!({"projectName": "p", "buildNumber": "7", "status": "success", "durationSeconds": 90}),
            )
            .unwrap();
        assert_eq!(
            updated.body(),
            "Successfully updated build \"7\" status to \"success\" in project \"p\""
        );

        let history = tools
            .dispatch(&db, "get_build_history", json!({"projectName": "p", "branchName": "main"}))
            .unwrap()
            .body();
        assert!(history.contains("Status: success"));
        assert!(history.contains("Duration: 90s"));
    }

    #[test]
    fn test_schema_rejects_before_handler_runs() {
        let (db, _dir) = temp_db();
        let err = standard()
            .dispatch(&db, "store_project_task", json!({"projectName": "p", "taskId": ""}))
            .unwrap_err();
        match err {
            DispatchError::InvalidArguments { issues, .. } => {
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, vec!["taskId", "title"]);
            }
            other => panic!("expected InvalidArguments, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_counts_name_their_field() {
        let (db, _dir) = temp_db();
        let args = json!({
            "projectName": "p",
            "filePath": "src/big.rs",
            "fileName": "big.rs",
            "lineCount": 3_000_000_000u64,
            "fileSize": 3_000_000_000u64,
        });
        let err = standard().dispatch(&db, "store_file_metadata", args).unwrap_err();
        match err {
            DispatchError::InvalidArguments { issues, .. } => {
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, vec!["lineCount"]);
            }
            other => panic!("expected InvalidArguments, got {other:?}"),
        }
    }
}
