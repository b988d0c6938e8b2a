//! ctxstore - persistent project knowledge for AI coding assistants
//!
//! Keeps what an assistant learns about a project across sessions: context
//! notes, conversations, file versions, people, tasks, dependencies,
//! environment settings, activity, builds, documentation, components and
//! file metadata. Everything is scoped by a project name and exposed as MCP
//! tools over stdio.
//!
//! # Entity Kinds
//!
//! | Kind | Write semantics | Natural key |
//! |------|-----------------|-------------|
//! | context | upsert | project, context type |
//! | conversation message | append | - |
//! | file history | append, versioned | project, path, version |
//! | user | upsert | project, username |
//! | task | upsert | project, task id |
//! | dependency | upsert | project, package |
//! | environment config | upsert | project, environment, key |
//! | activity log | append | - |
//! | build | upsert + status update | project, build number |
//! | documentation | upsert | project, doc type, title |
//! | component | upsert | project, component name |
//! | component relationship | upsert | project, source, target, type |
//! | file metadata | upsert | project, path |
//!
//! # Quick Start
//!
//! ```no_run
//! use ctxstore::{Database, StoreTask, TaskFilter};
//!
//! let db = Database::open_at(".ctxstore/ctxstore.db").unwrap();
//!
//! let task: StoreTask = serde_json::from_value(serde_json::json!({
//!     "projectName": "demo",
//!     "taskId": "T1",
//!     "title": "Write the parser"
//! }))
//! .unwrap();
//! db.store_task(&task).unwrap();
//!
//! let open = db
//!     .get_tasks(&TaskFilter {
//!         project_name: "demo".into(),
//!         status: Some("open".into()),
//!         ..TaskFilter::default()
//!     })
//!     .unwrap();
//! println!("{} open tasks", open.len());
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod init;
pub mod pool;
pub mod schema;
pub mod server;
pub mod tools;

pub use config::Config;
pub use db::{Database, CURRENT_SCHEMA};
pub use db::{
    ActivityFilter, ActivityLogEntry, BuildFilter, BuildRecord, ComponentFilter, ComponentRecord,
    ContextFilter, ContextRecord, ConversationFilter, ConversationMessage, DependencyFilter,
    DocumentationFilter, DocumentationRecord, EnvironmentConfig, EnvironmentFilter,
    FileHistoryEntry, FileHistoryFilter, FileMetadataFilter, FileMetadataRecord, LogActivity,
    ProjectDependency, ProjectTask, ProjectUser, RelationshipEdge, RelationshipFilter,
    StoreBuild, StoreComponent, StoreContext, StoreConversation, StoreDependency,
    StoreDocumentation, StoreEnvironmentConfig, StoreFileHistory, StoreFileMetadata,
    StoreRelationship, StoreTask, StoreUser, TaskFilter, UpdateBuildStatus, UserFilter,
};
pub use error::{ConfigError, DbError, DispatchError, FieldIssue, IssueKind};
pub use pool::{ConnectionPool, DrainReport, HealthReport, PoolState};
pub use server::McpServer;
pub use tools::{ToolRegistry, ToolResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        assert_eq!(CURRENT_SCHEMA.features.len(), 13);
        assert_eq!(ToolRegistry::standard().len(), 27);
    }
}
