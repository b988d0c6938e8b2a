//! Context snippets, conversation turns, file version history and
//! documentation

use super::{content_checksum, effective_limit, given, now_timestamp, to_document, Database};
use crate::error::Result;
use crate::schema::{conversation_history, file_history, project_contexts, project_documentation};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel::upsert::excluded;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Project Context
// ============================================================================

/// Write input for `store_context`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreContext {
    pub project_name: String,
    pub context_type: String,
    pub content: String,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFilter {
    pub project_name: String,
    pub context_type: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = project_contexts)]
struct NewContext<'a> {
    project_name: &'a str,
    context_type: &'a str,
    content: &'a str,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

/// One context snippet per (project, context type)
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_contexts)]
pub struct ContextRecord {
    pub id: i32,
    pub project_name: String,
    pub context_type: String,
    pub content: String,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Conversation History
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConversation {
    pub project_name: String,
    pub conversation_id: String,
    /// Usually "user" or "assistant"; not constrained
    pub message_type: String,
    pub content: String,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationFilter {
    pub project_name: String,
    pub conversation_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = conversation_history)]
struct NewConversationMessage<'a> {
    project_name: &'a str,
    conversation_id: &'a str,
    message_type: &'a str,
    content: &'a str,
    metadata_json: &'a str,
    sent_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = conversation_history)]
pub struct ConversationMessage {
    pub id: i32,
    pub project_name: String,
    pub conversation_id: String,
    pub message_type: String,
    pub content: String,
    pub metadata_json: String,
    pub sent_at: String,
}

// ============================================================================
// File History
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFileHistory {
    pub project_name: String,
    pub file_path: String,
    pub content: String,
    pub author: String,
    pub commit_hash: Option<String>,
    pub change_description: Option<String>,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistoryFilter {
    pub project_name: String,
    pub file_path: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = file_history)]
struct NewFileHistoryEntry<'a> {
    project_name: &'a str,
    file_path: &'a str,
    version_number: i32,
    content: &'a str,
    checksum: &'a str,
    file_size: i64,
    author: &'a str,
    commit_hash: Option<&'a str>,
    change_description: Option<&'a str>,
    metadata_json: &'a str,
    created_at: &'a str,
}

/// One stored revision of a file. Versions count up from 1 per
/// (project, path).
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = file_history)]
pub struct FileHistoryEntry {
    pub id: i32,
    pub project_name: String,
    pub file_path: String,
    pub version_number: i32,
    pub content: String,
    pub checksum: String,
    pub file_size: i64,
    pub author: String,
    pub commit_hash: Option<String>,
    pub change_description: Option<String>,
    pub metadata_json: String,
    pub created_at: String,
}

// ============================================================================
// Documentation
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocumentation {
    pub project_name: String,
    pub doc_type: String,
    pub title: String,
    pub content: String,
    #[serde(default = "default_doc_format")]
    pub format: String,
    pub version: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    pub external_url: Option<String>,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

fn default_doc_format() -> String {
    "markdown".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationFilter {
    pub project_name: String,
    pub doc_type: Option<String>,
    #[serde(default)]
    pub published_only: bool,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = project_documentation)]
struct NewDocumentation<'a> {
    project_name: &'a str,
    doc_type: &'a str,
    title: &'a str,
    content: &'a str,
    format: &'a str,
    version: Option<&'a str>,
    author: Option<&'a str>,
    tags_json: &'a str,
    is_published: bool,
    external_url: Option<&'a str>,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_documentation)]
pub struct DocumentationRecord {
    pub id: i32,
    pub project_name: String,
    pub doc_type: String,
    pub title: String,
    pub content: String,
    pub format: String,
    pub version: Option<String>,
    pub author: Option<String>,
    pub tags_json: String,
    pub is_published: bool,
    pub external_url: Option<String>,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentationRecord {
    pub fn tags(&self) -> Vec<String> {
        serde_json::from_str(&self.tags_json).unwrap_or_default()
    }
}

// ============================================================================
// Operations
// ============================================================================

impl Database {
    /// Upsert a context snippet on (project, context type)
    pub fn store_context(&self, input: &StoreContext) -> Result<ContextRecord> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewContext {
            project_name: &input.project_name,
            context_type: &input.context_type,
            content: &input.content,
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let record = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_contexts::table)
                .values(&row)
                .on_conflict((project_contexts::project_name, project_contexts::context_type))
                .do_update()
                .set((
                    project_contexts::content.eq(excluded(project_contexts::content)),
                    project_contexts::metadata_json.eq(excluded(project_contexts::metadata_json)),
                    project_contexts::updated_at.eq(excluded(project_contexts::updated_at)),
                ))
                .execute(conn)?;

            project_contexts::table
                .filter(project_contexts::project_name.eq(&input.project_name))
                .filter(project_contexts::context_type.eq(&input.context_type))
                .select(ContextRecord::as_select())
                .first(conn)
        })?;

        tracing::debug!(project = %record.project_name, id = record.id, "stored context");
        Ok(record)
    }

    /// Context snippets, most recently updated first
    pub fn get_context(&self, filter: &ContextFilter) -> Result<Vec<ContextRecord>> {
        let mut query = project_contexts::table
            .select(ContextRecord::as_select())
            .filter(project_contexts::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(context_type) = given(&filter.context_type) {
            query = query.filter(project_contexts::context_type.eq(context_type.to_owned()));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((project_contexts::updated_at.desc(), project_contexts::id.desc()))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Append one conversation message
    pub fn store_conversation(&self, input: &StoreConversation) -> Result<ConversationMessage> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewConversationMessage {
            project_name: &input.project_name,
            conversation_id: &input.conversation_id,
            message_type: &input.message_type,
            content: &input.content,
            metadata_json: &metadata,
            sent_at: &now,
        };

        let mut conn = self.conn()?;
        let message = conn.immediate_transaction(|conn| {
            diesel::insert_into(conversation_history::table)
                .values(&row)
                .execute(conn)?;

            let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
                "last_insert_rowid()",
            ))
            .first(conn)?;

            conversation_history::table
                .filter(conversation_history::id.eq(id))
                .select(ConversationMessage::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %message.project_name,
            id = message.id,
            "stored conversation message"
        );
        Ok(message)
    }

    /// Conversation messages, newest first, limited (default 50)
    pub fn get_conversation_history(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<ConversationMessage>> {
        let mut query = conversation_history::table
            .select(ConversationMessage::as_select())
            .filter(conversation_history::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(conversation_id) = given(&filter.conversation_id) {
            query = query.filter(
                conversation_history::conversation_id.eq(conversation_id.to_owned()),
            );
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((conversation_history::sent_at.desc(), conversation_history::id.desc()))
            .limit(effective_limit(filter.limit, 50))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Append a file revision. The version number and checksum are
    /// computed here, inside a write transaction, so concurrent writers for
    /// the same path get consecutive versions.
    pub fn store_file_history(&self, input: &StoreFileHistory) -> Result<FileHistoryEntry> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let checksum = content_checksum(&input.content);
        let file_size = i64::try_from(input.content.len()).unwrap_or(i64::MAX);

        let mut conn = self.conn()?;
        let entry = conn.immediate_transaction(|conn| {
            let latest: Option<i32> = file_history::table
                .filter(file_history::project_name.eq(&input.project_name))
                .filter(file_history::file_path.eq(&input.file_path))
                .select(diesel::dsl::max(file_history::version_number))
                .first(conn)?;

            let row = NewFileHistoryEntry {
                project_name: &input.project_name,
                file_path: &input.file_path,
                version_number: latest.unwrap_or(0) + 1,
                content: &input.content,
                checksum: &checksum,
                file_size,
                author: &input.author,
                commit_hash: input.commit_hash.as_deref(),
                change_description: input.change_description.as_deref(),
                metadata_json: &metadata,
                created_at: &now,
            };

            diesel::insert_into(file_history::table)
                .values(&row)
                .execute(conn)?;

            let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
                "last_insert_rowid()",
            ))
            .first(conn)?;

            file_history::table
                .filter(file_history::id.eq(id))
                .select(FileHistoryEntry::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %entry.project_name,
            path = %entry.file_path,
            version = entry.version_number,
            "stored file history"
        );
        Ok(entry)
    }

    /// File revisions, newest first (default limit 50)
    pub fn get_file_history(&self, filter: &FileHistoryFilter) -> Result<Vec<FileHistoryEntry>> {
        let mut query = file_history::table
            .select(FileHistoryEntry::as_select())
            .filter(file_history::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(path) = given(&filter.file_path) {
            query = query.filter(file_history::file_path.eq(path.to_owned()));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((file_history::created_at.desc(), file_history::id.desc()))
            .limit(effective_limit(filter.limit, 50))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Upsert a document on (project, doc type, title)
    pub fn store_documentation(&self, input: &StoreDocumentation) -> Result<DocumentationRecord> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let tags = serde_json::to_string(&input.tags)?;
        let row = NewDocumentation {
            project_name: &input.project_name,
            doc_type: &input.doc_type,
            title: &input.title,
            content: &input.content,
            format: &input.format,
            version: input.version.as_deref(),
            author: input.author.as_deref(),
            tags_json: &tags,
            is_published: input.is_published,
            external_url: input.external_url.as_deref(),
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let record = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_documentation::table)
                .values(&row)
                .on_conflict((
                    project_documentation::project_name,
                    project_documentation::doc_type,
                    project_documentation::title,
                ))
                .do_update()
                .set((
                    project_documentation::content.eq(excluded(project_documentation::content)),
                    project_documentation::format.eq(excluded(project_documentation::format)),
                    project_documentation::version.eq(excluded(project_documentation::version)),
                    project_documentation::author.eq(excluded(project_documentation::author)),
                    project_documentation::tags_json.eq(excluded(project_documentation::tags_json)),
                    project_documentation::is_published
                        .eq(excluded(project_documentation::is_published)),
                    project_documentation::external_url
                        .eq(excluded(project_documentation::external_url)),
                    project_documentation::metadata_json
                        .eq(excluded(project_documentation::metadata_json)),
                    project_documentation::updated_at
                        .eq(excluded(project_documentation::updated_at)),
                ))
                .execute(conn)?;

            project_documentation::table
                .filter(project_documentation::project_name.eq(&input.project_name))
                .filter(project_documentation::doc_type.eq(&input.doc_type))
                .filter(project_documentation::title.eq(&input.title))
                .select(DocumentationRecord::as_select())
                .first(conn)
        })?;

        tracing::debug!(project = %record.project_name, id = record.id, "stored documentation");
        Ok(record)
    }

    /// Documentation ordered by type, then title
    pub fn get_documentation(
        &self,
        filter: &DocumentationFilter,
    ) -> Result<Vec<DocumentationRecord>> {
        let mut query = project_documentation::table
            .select(DocumentationRecord::as_select())
            .filter(project_documentation::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(doc_type) = given(&filter.doc_type) {
            query = query.filter(project_documentation::doc_type.eq(doc_type.to_owned()));
        }
        if filter.published_only {
            query = query.filter(project_documentation::is_published.eq(true));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((project_documentation::doc_type.asc(), project_documentation::title.asc()))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }
}
