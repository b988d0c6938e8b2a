//! Codebase structure: components, the relationship graph between them and
//! per-file metadata

use super::{default_true, effective_limit, given, now_timestamp, to_document, Database};
use crate::error::Result;
use crate::schema::{component_relationships, file_metadata, project_components};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel::upsert::excluded;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Components
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreComponent {
    pub project_name: String,
    pub component_name: String,
    pub component_type: String,
    pub file_path: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFilter {
    pub project_name: String,
    pub component_type: Option<String>,
    #[serde(default = "default_true")]
    pub active_only: bool,
    pub limit: Option<u32>,
}

impl ComponentFilter {
    pub fn project(project: &str) -> Self {
        Self {
            project_name: project.to_string(),
            component_type: None,
            active_only: true,
            limit: None,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = project_components)]
struct NewComponent<'a> {
    project_name: &'a str,
    component_name: &'a str,
    component_type: &'a str,
    file_path: Option<&'a str>,
    description: Option<&'a str>,
    version: Option<&'a str>,
    is_active: bool,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_components)]
pub struct ComponentRecord {
    pub id: i32,
    pub project_name: String,
    pub component_name: String,
    pub component_type: String,
    pub file_path: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub is_active: bool,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Relationships
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRelationship {
    pub project_name: String,
    pub source_component: String,
    pub target_component: String,
    pub relationship_type: String,
    /// Edge weight
    #[serde(default = "default_strength")]
    pub strength: f64,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_directed: bool,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

fn default_strength() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipFilter {
    pub project_name: String,
    pub source_component: Option<String>,
    pub target_component: Option<String>,
    pub relationship_type: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = component_relationships)]
struct NewRelationship<'a> {
    project_name: &'a str,
    source_component: &'a str,
    target_component: &'a str,
    relationship_type: &'a str,
    strength: f64,
    description: Option<&'a str>,
    is_directed: bool,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

/// A typed, weighted edge between two components
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = component_relationships)]
pub struct RelationshipEdge {
    pub id: i32,
    pub project_name: String,
    pub source_component: String,
    pub target_component: String,
    pub relationship_type: String,
    pub strength: f64,
    pub description: Option<String>,
    pub is_directed: bool,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// File Metadata
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFileMetadata {
    pub project_name: String,
    pub file_path: String,
    pub file_name: String,
    pub file_extension: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub language: Option<String>,
    pub line_count: Option<i32>,
    pub last_author: Option<String>,
    pub checksum: Option<String>,
    #[serde(default)]
    pub is_binary: bool,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataFilter {
    pub project_name: String,
    pub file_type: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub include_binary: bool,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = file_metadata)]
struct NewFileMetadata<'a> {
    project_name: &'a str,
    file_path: &'a str,
    file_name: &'a str,
    file_extension: Option<&'a str>,
    file_size: Option<i64>,
    file_type: Option<&'a str>,
    language: Option<&'a str>,
    line_count: Option<i32>,
    last_author: Option<&'a str>,
    checksum: Option<&'a str>,
    is_binary: bool,
    is_generated: bool,
    last_modified: &'a str,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = file_metadata)]
pub struct FileMetadataRecord {
    pub id: i32,
    pub project_name: String,
    pub file_path: String,
    pub file_name: String,
    pub file_extension: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub language: Option<String>,
    pub line_count: Option<i32>,
    pub last_author: Option<String>,
    pub checksum: Option<String>,
    pub is_binary: bool,
    pub is_generated: bool,
    pub last_modified: String,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Database {
    pub fn store_component(&self, input: &StoreComponent) -> Result<ComponentRecord> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewComponent {
            project_name: &input.project_name,
            component_name: &input.component_name,
            component_type: &input.component_type,
            file_path: input.file_path.as_deref(),
            description: input.description.as_deref(),
            version: input.version.as_deref(),
            is_active: input.is_active,
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let component = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_components::table)
                .values(&row)
                .on_conflict((project_components::project_name, project_components::component_name))
                .do_update()
                .set((
                    project_components::component_type
                        .eq(excluded(project_components::component_type)),
                    project_components::file_path.eq(excluded(project_components::file_path)),
                    project_components::description.eq(excluded(project_components::description)),
                    project_components::version.eq(excluded(project_components::version)),
                    project_components::is_active.eq(excluded(project_components::is_active)),
                    project_components::metadata_json
                        .eq(excluded(project_components::metadata_json)),
                    project_components::updated_at.eq(excluded(project_components::updated_at)),
                ))
                .execute(conn)?;

            project_components::table
                .filter(project_components::project_name.eq(&input.project_name))
                .filter(project_components::component_name.eq(&input.component_name))
                .select(ComponentRecord::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %component.project_name,
            component = %component.component_name,
            id = component.id,
            "stored component"
        );
        Ok(component)
    }

    pub fn get_components(&self, filter: &ComponentFilter) -> Result<Vec<ComponentRecord>> {
        let mut query = project_components::table
            .select(ComponentRecord::as_select())
            .filter(project_components::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(kind) = given(&filter.component_type) {
            query = query.filter(project_components::component_type.eq(kind.to_owned()));
        }
        if filter.active_only {
            query = query.filter(project_components::is_active.eq(true));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((
                project_components::component_type.asc(),
                project_components::component_name.asc(),
            ))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Upsert an edge on (project, source, target, relationship type).
    /// Components are referenced by name and need not exist.
    pub fn store_relationship(&self, input: &StoreRelationship) -> Result<RelationshipEdge> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewRelationship {
            project_name: &input.project_name,
            source_component: &input.source_component,
            target_component: &input.target_component,
            relationship_type: &input.relationship_type,
            strength: input.strength,
            description: input.description.as_deref(),
            is_directed: input.is_directed,
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let edge = conn.immediate_transaction(|conn| {
            diesel::insert_into(component_relationships::table)
                .values(&row)
                .on_conflict((
                    component_relationships::project_name,
                    component_relationships::source_component,
                    component_relationships::target_component,
                    component_relationships::relationship_type,
                ))
                .do_update()
                .set((
                    component_relationships::strength
                        .eq(excluded(component_relationships::strength)),
                    component_relationships::description
                        .eq(excluded(component_relationships::description)),
                    component_relationships::is_directed
                        .eq(excluded(component_relationships::is_directed)),
                    component_relationships::metadata_json
                        .eq(excluded(component_relationships::metadata_json)),
                    component_relationships::updated_at
                        .eq(excluded(component_relationships::updated_at)),
                ))
                .execute(conn)?;

            component_relationships::table
                .filter(component_relationships::project_name.eq(&input.project_name))
                .filter(component_relationships::source_component.eq(&input.source_component))
                .filter(component_relationships::target_component.eq(&input.target_component))
                .filter(component_relationships::relationship_type.eq(&input.relationship_type))
                .select(RelationshipEdge::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %edge.project_name,
            source = %edge.source_component,
            target = %edge.target_component,
            id = edge.id,
            "stored relationship"
        );
        Ok(edge)
    }

    pub fn get_relationships(&self, filter: &RelationshipFilter) -> Result<Vec<RelationshipEdge>> {
        let mut query = component_relationships::table
            .select(RelationshipEdge::as_select())
            .filter(component_relationships::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(source) = given(&filter.source_component) {
            query = query.filter(component_relationships::source_component.eq(source.to_owned()));
        }
        if let Some(target) = given(&filter.target_component) {
            query = query.filter(component_relationships::target_component.eq(target.to_owned()));
        }
        if let Some(kind) = given(&filter.relationship_type) {
            query = query.filter(component_relationships::relationship_type.eq(kind.to_owned()));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((
                component_relationships::relationship_type.asc(),
                component_relationships::source_component.asc(),
                component_relationships::target_component.asc(),
            ))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Upsert metadata for one path; `last_modified` is the write time
    pub fn store_file_metadata(&self, input: &StoreFileMetadata) -> Result<FileMetadataRecord> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewFileMetadata {
            project_name: &input.project_name,
            file_path: &input.file_path,
            file_name: &input.file_name,
            file_extension: input.file_extension.as_deref(),
            file_size: input.file_size,
            file_type: input.file_type.as_deref(),
            language: input.language.as_deref(),
            line_count: input.line_count,
            last_author: input.last_author.as_deref(),
            checksum: input.checksum.as_deref(),
            is_binary: input.is_binary,
            is_generated: input.is_generated,
            last_modified: &now,
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let record = conn.immediate_transaction(|conn| {
            diesel::insert_into(file_metadata::table)
                .values(&row)
                .on_conflict((file_metadata::project_name, file_metadata::file_path))
                .do_update()
                .set((
                    file_metadata::file_name.eq(excluded(file_metadata::file_name)),
                    file_metadata::file_extension.eq(excluded(file_metadata::file_extension)),
                    file_metadata::file_size.eq(excluded(file_metadata::file_size)),
                    file_metadata::file_type.eq(excluded(file_metadata::file_type)),
                    file_metadata::language.eq(excluded(file_metadata::language)),
                    file_metadata::line_count.eq(excluded(file_metadata::line_count)),
                    file_metadata::last_author.eq(excluded(file_metadata::last_author)),
                    file_metadata::checksum.eq(excluded(file_metadata::checksum)),
                    file_metadata::is_binary.eq(excluded(file_metadata::is_binary)),
                    file_metadata::is_generated.eq(excluded(file_metadata::is_generated)),
                    file_metadata::last_modified.eq(excluded(file_metadata::last_modified)),
                    file_metadata::metadata_json.eq(excluded(file_metadata::metadata_json)),
                    file_metadata::updated_at.eq(excluded(file_metadata::updated_at)),
                ))
                .execute(conn)?;

            file_metadata::table
                .filter(file_metadata::project_name.eq(&input.project_name))
                .filter(file_metadata::file_path.eq(&input.file_path))
                .select(FileMetadataRecord::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %record.project_name,
            path = %record.file_path,
            id = record.id,
            "stored file metadata"
        );
        Ok(record)
    }

    pub fn get_file_metadata(
        &self,
        filter: &FileMetadataFilter,
    ) -> Result<Vec<FileMetadataRecord>> {
        let mut query = file_metadata::table
            .select(FileMetadataRecord::as_select())
            .filter(file_metadata::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(file_type) = given(&filter.file_type) {
            query = query.filter(file_metadata::file_type.eq(file_type.to_owned()));
        }
        if let Some(language) = given(&filter.language) {
            query = query.filter(file_metadata::language.eq(language.to_owned()));
        }
        if !filter.include_binary {
            query = query.filter(file_metadata::is_binary.eq(false));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order(file_metadata::file_path.asc())
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }
}
