//! One write and one read handler per entity kind.
//!
//! Handlers never fail the call: a database error becomes an error
//! [`ToolResult`] reading `Error <verb>: <message>`, and an empty read is a
//! normal result that says which filters matched nothing.

use super::ToolResult;
use crate::db::*;
use crate::error::DbError;
use std::fmt::Write as _;

const BLOCK_SEPARATOR: &str = "\n---\n\n";
const DOC_PREVIEW_CHARS: usize = 500;

fn failed(verb: &str, err: &DbError) -> ToolResult {
    tracing::warn!(error = %err, "error {}", verb);
    ToolResult::error(format!("Error {}: {}", verb, err))
}

fn or<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value.as_deref().unwrap_or(fallback)
}

/// ` with type "x"` style suffix for an applied filter
fn filter_note(label: &str, value: &Option<String>) -> String {
    match crate::db::given(value) {
        Some(v) => format!(" {} \"{}\"", label, v),
        None => String::new(),
    }
}

fn blocks<T>(rows: &[T], render: impl Fn(&T) -> String) -> String {
    rows.iter().map(render).collect::<Vec<_>>().join(BLOCK_SEPARATOR)
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(DOC_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

// ============================================================================
// Context and conversations
// ============================================================================

pub(super) fn store_context(db: &Database, args: StoreContext) -> ToolResult {
    match db.store_context(&args) {
        Ok(record) => ToolResult::text(format!(
            "Successfully stored context for project \"{}\" with type \"{}\" (id {})",
            record.project_name, record.context_type, record.id
        )),
        Err(e) => failed("storing context", &e),
    }
}

pub(super) fn get_context(db: &Database, args: ContextFilter) -> ToolResult {
    let rows = match db.get_context(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving context", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No context found for project \"{}\"{}",
            args.project_name,
            filter_note("with type", &args.context_type)
        ));
    }
    ToolResult::text(blocks(&rows, |ctx| {
        format!(
            "Type: {}\nContent: {}\nUpdated: {}",
            ctx.context_type, ctx.content, ctx.updated_at
        )
    }))
}

pub(super) fn store_conversation(db: &Database, args: StoreConversation) -> ToolResult {
    match db.store_conversation(&args) {
        Ok(msg) => ToolResult::text(format!(
            "Successfully stored {} message for conversation \"{}\" in project \"{}\" (id {})",
            msg.message_type, msg.conversation_id, msg.project_name, msg.id
        )),
        Err(e) => failed("storing conversation", &e),
    }
}

/// Fetched newest first so the limit keeps the latest turns, then printed
/// in the order they happened
pub(super) fn get_conversation_history(db: &Database, args: ConversationFilter) -> ToolResult {
    let mut rows = match db.get_conversation_history(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving conversation history", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No conversation history found for project \"{}\"{}",
            args.project_name,
            filter_note("and conversation", &args.conversation_id)
        ));
    }
    rows.reverse();

    let mut text = String::new();
    for (i, msg) in rows.iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        let _ = write!(text, "[{}] {}: {}", msg.sent_at, msg.message_type, msg.content);
    }
    ToolResult::text(text)
}

// ============================================================================
// File history
// ============================================================================

pub(super) fn store_file_history(db: &Database, args: StoreFileHistory) -> ToolResult {
    match db.store_file_history(&args) {
        Ok(entry) => ToolResult::text(format!(
            "Successfully stored file history for \"{}\" in project \"{}\" (version {}, checksum {})",
            entry.file_path, entry.project_name, entry.version_number, entry.checksum
        )),
        Err(e) => failed("storing file history", &e),
    }
}

pub(super) fn get_file_history(db: &Database, args: FileHistoryFilter) -> ToolResult {
    let rows = match db.get_file_history(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving file history", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No file history found for project \"{}\"{}",
            args.project_name,
            filter_note("and file", &args.file_path)
        ));
    }
    ToolResult::text(blocks(&rows, |entry| {
        format!(
            "Version {} - {}\nAuthor: {}\nDate: {}\nSize: {} bytes\nChecksum: {}\nChanges: {}\nCommit: {}\n",
            entry.version_number,
            entry.file_path,
            entry.author,
            entry.created_at,
            entry.file_size,
            entry.checksum,
            or(&entry.change_description, "No description"),
            or(&entry.commit_hash, "N/A"),
        )
    }))
}

// ============================================================================
// Users, tasks, activity
// ============================================================================

pub(super) fn store_project_user(db: &Database, args: StoreUser) -> ToolResult {
    match db.store_user(&args) {
        Ok(user) => ToolResult::text(format!(
            "Successfully stored user \"{}\" with role \"{}\" in project \"{}\" (id {})",
            user.username, user.role, user.project_name, user.id
        )),
        Err(e) => failed("storing project user", &e),
    }
}

pub(super) fn get_project_users(db: &Database, args: UserFilter) -> ToolResult {
    let rows = match db.get_users(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving project users", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No users found for project \"{}\"{}{}",
            args.project_name,
            filter_note("with role", &args.role),
            if args.active_only { " (active only)" } else { "" }
        ));
    }
    ToolResult::text(blocks(&rows, |user| {
        format!(
            "Username: {}\nEmail: {}\nRole: {}\nActive: {}\nLast Active: {}\n",
            user.username, user.email, user.role, user.is_active, user.last_active
        )
    }))
}

pub(super) fn store_project_task(db: &Database, args: StoreTask) -> ToolResult {
    match db.store_task(&args) {
        Ok(task) => ToolResult::text(format!(
            "Successfully stored task \"{}\" ({}) in project \"{}\" (id {})",
            task.task_id, task.title, task.project_name, task.id
        )),
        Err(e) => failed("storing project task", &e),
    }
}

pub(super) fn get_project_tasks(db: &Database, args: TaskFilter) -> ToolResult {
    let rows = match db.get_tasks(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving project tasks", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No tasks found for project \"{}\"{}{}{}{}",
            args.project_name,
            filter_note("with status", &args.status),
            filter_note("assigned to", &args.assignee),
            filter_note("with priority", &args.priority),
            filter_note("of type", &args.task_type),
        ));
    }
    ToolResult::text(blocks(&rows, |task| {
        format!(
            "ID: {}\nTitle: {}\nStatus: {}\nPriority: {}\nType: {}\nAssignee: {}\nReporter: {}\nCreated: {}\n",
            task.task_id,
            task.title,
            task.status,
            task.priority,
            task.task_type,
            or(&task.assignee, "Unassigned"),
            or(&task.reporter, "N/A"),
            task.created_at,
        )
    }))
}

pub(super) fn log_activity(db: &Database, args: LogActivity) -> ToolResult {
    match db.log_activity(&args) {
        Ok(entry) => ToolResult::text(format!(
            "Successfully logged activity: {} {} {} ({}) in project \"{}\" (id {})",
            entry.actor,
            entry.action,
            entry.target,
            entry.activity_type,
            entry.project_name,
            entry.id
        )),
        Err(e) => failed("logging activity", &e),
    }
}

pub(super) fn get_activity_logs(db: &Database, args: ActivityFilter) -> ToolResult {
    let rows = match db.get_activity_logs(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving activity logs", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No activity logs found for project \"{}\"{}{}{}",
            args.project_name,
            filter_note("of type", &args.activity_type),
            filter_note("by actor", &args.actor),
            filter_note("on target", &args.target),
        ));
    }
    ToolResult::text(blocks(&rows, |log| {
        format!(
            "[{}] {}: {} {} {}\nDetails: {}\nIP: {}\n",
            log.occurred_at,
            log.activity_type,
            log.actor,
            log.action,
            log.target,
            or(&log.details, "N/A"),
            or(&log.ip_address, "N/A"),
        )
    }))
}

// ============================================================================
// Dependencies, environments, builds
// ============================================================================

pub(super) fn store_project_dependency(db: &Database, args: StoreDependency) -> ToolResult {
    match db.store_dependency(&args) {
        Ok(dep) => ToolResult::text(format!(
            "Successfully stored dependency \"{}@{}\" ({}) in project \"{}\" (id {})",
            dep.package_name, dep.version, dep.package_manager, dep.project_name, dep.id
        )),
        Err(e) => failed("storing project dependency", &e),
    }
}

pub(super) fn get_project_dependencies(db: &Database, args: DependencyFilter) -> ToolResult {
    let rows = match db.get_dependencies(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving project dependencies", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No dependencies found for project \"{}\"{}{}",
            args.project_name,
            filter_note("with package manager", &args.package_manager),
            filter_note("of type", &args.dependency_type),
        ));
    }
    ToolResult::text(blocks(&rows, |dep| {
        format!(
            "Package: {}@{}\nManager: {}\nType: {}\nLicense: {}\nInstalled: {}\n",
            dep.package_name,
            dep.version,
            dep.package_manager,
            dep.dependency_type,
            or(&dep.license, "Unknown"),
            dep.installed_at,
        )
    }))
}

pub(super) fn store_environment_config(db: &Database, args: StoreEnvironmentConfig) -> ToolResult {
    match db.store_environment_config(&args) {
        Ok(config) => ToolResult::text(format!(
            "Successfully stored config \"{}\" for environment \"{}\" in project \"{}\" (id {})",
            config.config_key, config.environment_name, config.project_name, config.id
        )),
        Err(e) => failed("storing environment config", &e),
    }
}

/// Sensitive values stay masked even when sensitive rows are requested
pub(super) fn get_environment_configs(db: &Database, args: EnvironmentFilter) -> ToolResult {
    let rows = match db.get_environment_configs(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving environment configs", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No environment configs found for project \"{}\"{}",
            args.project_name,
            filter_note("in environment", &args.environment_name),
        ));
    }
    ToolResult::text(blocks(&rows, |config| {
        let value = if config.is_sensitive {
            "[SENSITIVE]"
        } else {
            config.config_value.as_str()
        };
        format!(
            "Environment: {}\nKey: {}\nValue: {}\nSensitive: {}\nDescription: {}\n",
            config.environment_name,
            config.config_key,
            value,
            config.is_sensitive,
            or(&config.description, "N/A"),
        )
    }))
}

pub(super) fn store_build(db: &Database, args: StoreBuild) -> ToolResult {
    match db.store_build(&args) {
        Ok(build) => ToolResult::text(format!(
            "Successfully stored build \"{}\" ({}) with status \"{}\" in project \"{}\" (id {})",
            build.build_number, build.build_type, build.status, build.project_name, build.id
        )),
        Err(e) => failed("storing build", &e),
    }
}

pub(super) fn update_build_status(db: &Database, args: UpdateBuildStatus) -> ToolResult {
    match db.update_build_status(&args) {
        Ok(build) => ToolResult::text(format!(
            "Successfully updated build \"{}\" status to \"{}\" in project \"{}\"",
            build.build_number, build.status, build.project_name
        )),
        Err(e) => failed("updating build status", &e),
    }
}

pub(super) fn get_build_history(db: &Database, args: BuildFilter) -> ToolResult {
    let rows = match db.get_build_history(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving build history", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No build history found for project \"{}\"{}{}",
            args.project_name,
            filter_note("with status", &args.status),
            filter_note("on branch", &args.branch_name),
        ));
    }
    ToolResult::text(blocks(&rows, |build| {
        let duration = match build.duration_seconds {
            Some(secs) => format!("{}s", secs),
            None => "N/A".to_string(),
        };
        format!(
            "Build: {}\nType: {}\nStatus: {}\nBranch: {}\nCommit: {}\nTriggered by: {}\nStarted: {}\nFinished: {}\nDuration: {}\n",
            build.build_number,
            build.build_type,
            build.status,
            or(&build.branch_name, "N/A"),
            or(&build.commit_hash, "N/A"),
            or(&build.triggered_by, "Unknown"),
            build.start_time,
            or(&build.end_time, "N/A"),
            duration,
        )
    }))
}

// ============================================================================
// Documentation
// ============================================================================

pub(super) fn store_documentation(db: &Database, args: StoreDocumentation) -> ToolResult {
    match db.store_documentation(&args) {
        Ok(doc) => ToolResult::text(format!(
            "Successfully stored documentation \"{}\" ({}) in project \"{}\" (id {})",
            doc.title, doc.doc_type, doc.project_name, doc.id
        )),
        Err(e) => failed("storing documentation", &e),
    }
}

pub(super) fn get_documentation(db: &Database, args: DocumentationFilter) -> ToolResult {
    let rows = match db.get_documentation(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving documentation", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No documentation found for project \"{}\"{}{}",
            args.project_name,
            filter_note("of type", &args.doc_type),
            if args.published_only { " (published only)" } else { "" }
        ));
    }
    ToolResult::text(blocks(&rows, |doc| {
        let tags = doc.tags();
        format!(
            "Title: {}\nType: {}\nFormat: {}\nAuthor: {}\nVersion: {}\nPublished: {}\nTags: {}\nURL: {}\nUpdated: {}\n\nContent:\n{}\n",
            doc.title,
            doc.doc_type,
            doc.format,
            or(&doc.author, "Unknown"),
            or(&doc.version, "N/A"),
            doc.is_published,
            if tags.is_empty() { "None".to_string() } else { tags.join(", ") },
            or(&doc.external_url, "N/A"),
            doc.updated_at,
            preview(&doc.content),
        )
    }))
}

// ============================================================================
// Components, relationships, file metadata
// ============================================================================

pub(super) fn store_project_component(db: &Database, args: StoreComponent) -> ToolResult {
    match db.store_component(&args) {
        Ok(component) => ToolResult::text(format!(
            "Successfully stored component \"{}\" ({}) in project \"{}\" (id {})",
            component.component_name, component.component_type, component.project_name, component.id
        )),
        Err(e) => failed("storing project component", &e),
    }
}

pub(super) fn store_component_relationship(db: &Database, args: StoreRelationship) -> ToolResult {
    match db.store_relationship(&args) {
        Ok(edge) => ToolResult::text(format!(
            "Successfully stored relationship: {} {} {} in project \"{}\" (id {})",
            edge.source_component,
            edge.relationship_type,
            edge.target_component,
            edge.project_name,
            edge.id
        )),
        Err(e) => failed("storing component relationship", &e),
    }
}

pub(super) fn get_project_components(db: &Database, args: ComponentFilter) -> ToolResult {
    let rows = match db.get_components(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving project components", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No components found for project \"{}\"{}{}",
            args.project_name,
            filter_note("of type", &args.component_type),
            if args.active_only { " (active only)" } else { "" }
        ));
    }
    ToolResult::text(blocks(&rows, |comp| {
        format!(
            "Name: {}\nType: {}\nFile: {}\nVersion: {}\nDescription: {}\nActive: {}\nUpdated: {}\n",
            comp.component_name,
            comp.component_type,
            or(&comp.file_path, "N/A"),
            or(&comp.version, "N/A"),
            or(&comp.description, "N/A"),
            comp.is_active,
            comp.updated_at,
        )
    }))
}

pub(super) fn get_component_relationships(db: &Database, args: RelationshipFilter) -> ToolResult {
    let rows = match db.get_relationships(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving component relationships", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No component relationships found for project \"{}\"{}{}{}",
            args.project_name,
            filter_note("from", &args.source_component),
            filter_note("to", &args.target_component),
            filter_note("of type", &args.relationship_type),
        ));
    }
    ToolResult::text(blocks(&rows, |rel| {
        let arrow = if rel.is_directed { "->" } else { "<->" };
        format!(
            "{} {} {} ({} {} {})\nStrength: {}\nDescription: {}\nCreated: {}\n",
            rel.source_component,
            rel.relationship_type,
            rel.target_component,
            rel.source_component,
            arrow,
            rel.target_component,
            rel.strength,
            or(&rel.description, "N/A"),
            rel.created_at,
        )
    }))
}

pub(super) fn store_file_metadata(db: &Database, args: StoreFileMetadata) -> ToolResult {
    match db.store_file_metadata(&args) {
        Ok(file) => ToolResult::text(format!(
            "Successfully stored metadata for file \"{}\" in project \"{}\" (id {})",
            file.file_name, file.project_name, file.id
        )),
        Err(e) => failed("storing file metadata", &e),
    }
}

pub(super) fn get_file_metadata(db: &Database, args: FileMetadataFilter) -> ToolResult {
    let rows = match db.get_file_metadata(&args) {
        Ok(rows) => rows,
        Err(e) => return failed("retrieving file metadata", &e),
    };
    if rows.is_empty() {
        return ToolResult::text(format!(
            "No file metadata found for project \"{}\"{}{}{}",
            args.project_name,
            filter_note("of type", &args.file_type),
            filter_note("in language", &args.language),
            if args.include_binary { "" } else { " (excluding binary files)" }
        ));
    }
    ToolResult::text(blocks(&rows, |file| {
        let size = match file.file_size {
            Some(bytes) => format!("{} bytes", bytes),
            None => "Unknown".to_string(),
        };
        let lines = match file.line_count {
            Some(n) => n.to_string(),
            None => "Unknown".to_string(),
        };
        format!(
            "File: {}\nPath: {}\nType: {}\nLanguage: {}\nSize: {}\nLines: {}\nAuthor: {}\nBinary: {}\nGenerated: {}\nModified: {}\n",
            file.file_name,
            file.file_path,
            or(&file.file_type, "Unknown"),
            or(&file.language, "Unknown"),
            size,
            lines,
            or(&file.last_author, "Unknown"),
            file.is_binary,
            file.is_generated,
            file.last_modified,
        )
    }))
}
