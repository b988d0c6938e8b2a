//! SQLite database with Diesel ORM
//!
//! Persists project knowledge: context snippets, conversations, file
//! history, team and task records, dependencies, environment config,
//! activity logs, builds, documentation, components and file metadata.
//!
//! Every entity is scoped by a free-text project name. Entities with a
//! natural key are written with `INSERT .. ON CONFLICT DO UPDATE`, so racing
//! writers always leave exactly one row per key. Append-only entities are
//! plain inserts. Reads accumulate optional equality filters on a boxed
//! query; every value is bound as a parameter.

mod codebase;
mod knowledge;
mod operations;
mod team;

pub use codebase::{
    ComponentFilter, ComponentRecord, FileMetadataFilter, FileMetadataRecord, RelationshipEdge,
    RelationshipFilter, StoreComponent, StoreFileMetadata, StoreRelationship,
};
pub use knowledge::{
    ContextFilter, ContextRecord, ConversationFilter, ConversationMessage, DocumentationFilter,
    DocumentationRecord, FileHistoryEntry, FileHistoryFilter, StoreContext, StoreConversation,
    StoreDocumentation, StoreFileHistory,
};
pub use operations::{
    BuildFilter, BuildRecord, DependencyFilter, EnvironmentConfig, EnvironmentFilter,
    ProjectDependency, StoreBuild, StoreDependency, StoreEnvironmentConfig, UpdateBuildStatus,
};
pub use team::{
    ActivityFilter, ActivityLogEntry, LogActivity, ProjectTask, ProjectUser, StoreTask, StoreUser,
    TaskFilter, UserFilter,
};

use crate::config::{Config, PoolConfig};
use crate::error::Result;
use crate::pool::{ConnectionPool, DrainReport, HealthReport, Lease};
use crate::schema::schema_versions;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// Current schema version for ctxstore
pub const CURRENT_SCHEMA: KnowledgeSchema = KnowledgeSchema {
    major: 1,
    minor: 0,
    patch: 0,
    name: "project-knowledge",
    features: &[
        "project_contexts",
        "conversation_history",
        "file_history",
        "project_users",
        "project_tasks",
        "project_dependencies",
        "project_environments",
        "project_activity_logs",
        "project_builds",
        "project_documentation",
        "project_components",
        "component_relationships",
        "file_metadata",
    ],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct KnowledgeSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl KnowledgeSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for KnowledgeSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

/// Upper bound applied to every caller-supplied read limit
pub const MAX_LIMIT: u32 = 1000;

/// SQL schema, applied idempotently at open
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    version TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    features TEXT NOT NULL,
    introduced_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    context_type TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, context_type)
);

CREATE TABLE IF NOT EXISTS conversation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    message_type TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    sent_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversation_lookup ON conversation_history(project_name, conversation_id, sent_at);

CREATE TABLE IF NOT EXISTS file_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    checksum TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    author TEXT NOT NULL,
    commit_hash TEXT,
    change_description TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(project_name, file_path, version_number)
);

CREATE TABLE IF NOT EXISTS project_documentation (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    format TEXT NOT NULL DEFAULT 'markdown',
    version TEXT,
    author TEXT,
    tags_json TEXT NOT NULL DEFAULT '[]',
    is_published INTEGER NOT NULL DEFAULT 0,
    external_url TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, doc_type, title)
);

CREATE TABLE IF NOT EXISTS project_users (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    username TEXT NOT NULL,
    email TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'developer',
    permissions_json TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_active TEXT NOT NULL,
    UNIQUE(project_name, username)
);

CREATE TABLE IF NOT EXISTS project_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    task_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    priority TEXT NOT NULL DEFAULT 'medium',
    task_type TEXT NOT NULL DEFAULT 'feature',
    assignee TEXT,
    reporter TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, task_id)
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON project_tasks(project_name, status);

CREATE TABLE IF NOT EXISTS project_activity_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    activity_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    target TEXT NOT NULL,
    action TEXT NOT NULL,
    details TEXT,
    ip_address TEXT,
    user_agent TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    occurred_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_occurred ON project_activity_logs(project_name, occurred_at);

CREATE TABLE IF NOT EXISTS project_dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    package_name TEXT NOT NULL,
    version TEXT NOT NULL,
    package_manager TEXT NOT NULL,
    dependency_type TEXT NOT NULL DEFAULT 'production',
    license TEXT,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    installed_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, package_name)
);

CREATE TABLE IF NOT EXISTS project_environments (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    environment_name TEXT NOT NULL,
    config_key TEXT NOT NULL,
    config_value TEXT NOT NULL,
    is_sensitive INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, environment_name, config_key)
);

CREATE TABLE IF NOT EXISTS project_builds (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    build_number TEXT NOT NULL,
    build_type TEXT NOT NULL,
    status TEXT NOT NULL,
    branch_name TEXT,
    commit_hash TEXT,
    triggered_by TEXT,
    test_results_json TEXT NOT NULL DEFAULT '{}',
    metadata_json TEXT NOT NULL DEFAULT '{}',
    start_time TEXT NOT NULL,
    end_time TEXT,
    duration_seconds INTEGER,
    logs TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, build_number)
);
CREATE INDEX IF NOT EXISTS idx_builds_start ON project_builds(project_name, start_time);

CREATE TABLE IF NOT EXISTS project_components (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    component_name TEXT NOT NULL,
    component_type TEXT NOT NULL,
    file_path TEXT,
    description TEXT,
    version TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, component_name)
);

CREATE TABLE IF NOT EXISTS component_relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    source_component TEXT NOT NULL,
    target_component TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 1.0,
    description TEXT,
    is_directed INTEGER NOT NULL DEFAULT 1,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, source_component, target_component, relationship_type)
);

CREATE TABLE IF NOT EXISTS file_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    project_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_extension TEXT,
    file_size INTEGER,
    file_type TEXT,
    language TEXT,
    line_count INTEGER,
    last_author TEXT,
    checksum TEXT,
    is_binary INTEGER NOT NULL DEFAULT 0,
    is_generated INTEGER NOT NULL DEFAULT 0,
    last_modified TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_name, file_path)
);
"#;

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
struct NewSchemaVersion<'a> {
    version: &'a str,
    name: &'a str,
    features: &'a str,
    introduced_at: &'a str,
}

/// Queryable schema version
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = schema_versions)]
pub struct StoredSchema {
    pub id: i32,
    pub version: String,
    pub name: String,
    pub features: String,
    pub introduced_at: String,
}

// ============================================================================
// Database Connection
// ============================================================================

/// Persistence manager: one write and one read per entity kind, over a
/// shared connection pool.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open the database described by `config`: build the pool, wait for
    /// the database to become reachable and create the schema.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with(&config.db_path(), &config.pool)
    }

    /// Open database at specified path with default pool settings
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path.as_ref(), &PoolConfig::default())
    }

    pub fn open_with(path: &Path, pool_config: &PoolConfig) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!(
                        path = %parent.display(),
                        error = %e,
                        "could not create database directory"
                    );
                }
            }
        }

        let url = path.to_string_lossy().to_string();
        tracing::info!(path = %url, max_size = pool_config.max_size, "opening database");
        let pool = ConnectionPool::new(&url, pool_config)?;
        pool.verify(pool_config.connect_retries, pool_config.retry_backoff())?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<Lease<'_>> {
        self.pool.acquire()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn health(&self) -> HealthReport {
        self.pool.health()
    }

    /// Drain and close the pool. Later calls fail with `PoolClosed`.
    pub fn shutdown(&self, timeout: Duration) -> DrainReport {
        self.pool.shutdown(timeout)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.conn()?;
        conn.batch_execute(SCHEMA)?;
        drop(conn);

        // Register current schema
        self.register_schema(&CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, schema: &KnowledgeSchema) -> Result<()> {
        let mut conn = self.conn()?;
        let now = now_timestamp();
        let features_json = serde_json::to_string(&schema.features)?;

        let new_schema = NewSchemaVersion {
            version: &schema.version_string(),
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(&mut *conn)?;

        Ok(())
    }

    /// Schema versions recorded in this database, oldest first
    pub fn schema_versions(&self) -> Result<Vec<StoredSchema>> {
        let mut conn = self.conn()?;
        let rows = schema_versions::table
            .order(schema_versions::id.asc())
            .select(StoredSchema::as_select())
            .load(&mut *conn)?;
        Ok(rows)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// UTC timestamp with microsecond precision; sorts lexically in time order
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// SHA-256 of the exact bytes stored, as lowercase hex
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serialize an opaque document for storage without interpreting it
pub(crate) fn to_document(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Parse a stored document; corrupt text comes back as a JSON string
pub fn from_document(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub(crate) fn empty_document() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Resolve a caller-supplied limit against the entity default
pub(crate) fn effective_limit(requested: Option<u32>, default: u32) -> i64 {
    i64::from(requested.unwrap_or(default).clamp(1, MAX_LIMIT))
}

/// An optional equality filter; blank values filter nothing
pub(crate) fn given(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().filter(|v| !v.trim().is_empty())
}

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Fresh database in a temp dir; keep the dir alive for the test
    pub fn temp_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("test.db")).unwrap();
        (db, dir)
    }
}
