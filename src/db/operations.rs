//! Dependencies, environment configuration and builds

use super::{default_true, effective_limit, given, now_timestamp, to_document, Database};
use crate::error::{DbError, Result};
use crate::schema::{project_builds, project_dependencies, project_environments};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel::upsert::excluded;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Dependencies
// ============================================================================

/// Write input for `store_dependency`.
///
/// The conflict key is (project, package name): storing the same package
/// under a second package manager overwrites the first row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDependency {
    pub project_name: String,
    pub package_name: String,
    pub version: String,
    pub package_manager: String,
    #[serde(default = "default_dependency_type")]
    pub dependency_type: String,
    pub license: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

fn default_dependency_type() -> String {
    "production".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyFilter {
    pub project_name: String,
    pub package_manager: Option<String>,
    pub dependency_type: Option<String>,
    #[serde(default = "default_true")]
    pub active_only: bool,
    pub limit: Option<u32>,
}

impl DependencyFilter {
    pub fn project(project: &str) -> Self {
        Self {
            project_name: project.to_string(),
            package_manager: None,
            dependency_type: None,
            active_only: true,
            limit: None,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = project_dependencies)]
struct NewDependency<'a> {
    project_name: &'a str,
    package_name: &'a str,
    version: &'a str,
    package_manager: &'a str,
    dependency_type: &'a str,
    license: Option<&'a str>,
    description: Option<&'a str>,
    is_active: bool,
    metadata_json: &'a str,
    installed_at: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_dependencies)]
pub struct ProjectDependency {
    pub id: i32,
    pub project_name: String,
    pub package_name: String,
    pub version: String,
    pub package_manager: String,
    pub dependency_type: String,
    pub license: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub metadata_json: String,
    pub installed_at: String,
    pub updated_at: String,
}

// ============================================================================
// Environment Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEnvironmentConfig {
    pub project_name: String,
    pub environment_name: String,
    pub config_key: String,
    pub config_value: String,
    #[serde(default)]
    pub is_sensitive: bool,
    pub description: Option<String>,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentFilter {
    pub project_name: String,
    pub environment_name: Option<String>,
    /// Sensitive rows are left out unless this is set
    #[serde(default)]
    pub include_sensitive: bool,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = project_environments)]
struct NewEnvironmentConfig<'a> {
    project_name: &'a str,
    environment_name: &'a str,
    config_key: &'a str,
    config_value: &'a str,
    is_sensitive: bool,
    description: Option<&'a str>,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_environments)]
pub struct EnvironmentConfig {
    pub id: i32,
    pub project_name: String,
    pub environment_name: String,
    pub config_key: String,
    pub config_value: String,
    pub is_sensitive: bool,
    pub description: Option<String>,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Builds
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreBuild {
    pub project_name: String,
    pub build_number: String,
    pub build_type: String,
    pub status: String,
    pub branch_name: Option<String>,
    pub commit_hash: Option<String>,
    pub triggered_by: Option<String>,
    #[serde(default = "crate::db::empty_document")]
    pub test_results: Value,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

/// Status transition for an existing build. Only status, end time,
/// duration and logs change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBuildStatus {
    pub project_name: String,
    pub build_number: String,
    pub status: String,
    /// Defaults to the time of the update
    pub end_time: Option<String>,
    pub duration_seconds: Option<i32>,
    pub logs: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFilter {
    pub project_name: String,
    pub status: Option<String>,
    pub branch_name: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = project_builds)]
struct NewBuild<'a> {
    project_name: &'a str,
    build_number: &'a str,
    build_type: &'a str,
    status: &'a str,
    branch_name: Option<&'a str>,
    commit_hash: Option<&'a str>,
    triggered_by: Option<&'a str>,
    test_results_json: &'a str,
    metadata_json: &'a str,
    start_time: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_builds)]
pub struct BuildRecord {
    pub id: i32,
    pub project_name: String,
    pub build_number: String,
    pub build_type: String,
    pub status: String,
    pub branch_name: Option<String>,
    pub commit_hash: Option<String>,
    pub triggered_by: Option<String>,
    pub test_results_json: String,
    pub metadata_json: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_seconds: Option<i32>,
    pub logs: Option<String>,
    pub updated_at: String,
}

impl Database {
    pub fn store_dependency(&self, input: &StoreDependency) -> Result<ProjectDependency> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewDependency {
            project_name: &input.project_name,
            package_name: &input.package_name,
            version: &input.version,
            package_manager: &input.package_manager,
            dependency_type: &input.dependency_type,
            license: input.license.as_deref(),
            description: input.description.as_deref(),
            is_active: input.is_active,
            metadata_json: &metadata,
            installed_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let dependency = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_dependencies::table)
                .values(&row)
                .on_conflict((
                    project_dependencies::project_name,
                    project_dependencies::package_name,
                ))
                .do_update()
                .set((
                    project_dependencies::version.eq(excluded(project_dependencies::version)),
                    project_dependencies::package_manager
                        .eq(excluded(project_dependencies::package_manager)),
                    project_dependencies::dependency_type
                        .eq(excluded(project_dependencies::dependency_type)),
                    project_dependencies::license.eq(excluded(project_dependencies::license)),
                    project_dependencies::description
                        .eq(excluded(project_dependencies::description)),
                    project_dependencies::is_active.eq(excluded(project_dependencies::is_active)),
                    project_dependencies::metadata_json
                        .eq(excluded(project_dependencies::metadata_json)),
                    project_dependencies::updated_at.eq(excluded(project_dependencies::updated_at)),
                ))
                .execute(conn)?;

            project_dependencies::table
                .filter(project_dependencies::project_name.eq(&input.project_name))
                .filter(project_dependencies::package_name.eq(&input.package_name))
                .select(ProjectDependency::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %dependency.project_name,
            package = %dependency.package_name,
            id = dependency.id,
            "stored dependency"
        );
        Ok(dependency)
    }

    pub fn get_dependencies(&self, filter: &DependencyFilter) -> Result<Vec<ProjectDependency>> {
        let mut query = project_dependencies::table
            .select(ProjectDependency::as_select())
            .filter(project_dependencies::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(manager) = given(&filter.package_manager) {
            query = query.filter(project_dependencies::package_manager.eq(manager.to_owned()));
        }
        if let Some(kind) = given(&filter.dependency_type) {
            query = query.filter(project_dependencies::dependency_type.eq(kind.to_owned()));
        }
        if filter.active_only {
            query = query.filter(project_dependencies::is_active.eq(true));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order(project_dependencies::package_name.asc())
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Upsert one key on (project, environment, key)
    pub fn store_environment_config(
        &self,
        input: &StoreEnvironmentConfig,
    ) -> Result<EnvironmentConfig> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewEnvironmentConfig {
            project_name: &input.project_name,
            environment_name: &input.environment_name,
            config_key: &input.config_key,
            config_value: &input.config_value,
            is_sensitive: input.is_sensitive,
            description: input.description.as_deref(),
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let config = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_environments::table)
                .values(&row)
                .on_conflict((
                    project_environments::project_name,
                    project_environments::environment_name,
                    project_environments::config_key,
                ))
                .do_update()
                .set((
                    project_environments::config_value
                        .eq(excluded(project_environments::config_value)),
                    project_environments::is_sensitive
                        .eq(excluded(project_environments::is_sensitive)),
                    project_environments::description
                        .eq(excluded(project_environments::description)),
                    project_environments::metadata_json
                        .eq(excluded(project_environments::metadata_json)),
                    project_environments::updated_at.eq(excluded(project_environments::updated_at)),
                ))
                .execute(conn)?;

            project_environments::table
                .filter(project_environments::project_name.eq(&input.project_name))
                .filter(project_environments::environment_name.eq(&input.environment_name))
                .filter(project_environments::config_key.eq(&input.config_key))
                .select(EnvironmentConfig::as_select())
                .first(conn)
        })?;

        // never log the value itself
        tracing::debug!(
            project = %config.project_name,
            environment = %config.environment_name,
            key = %config.config_key,
            id = config.id,
            "stored environment config"
        );
        Ok(config)
    }

    pub fn get_environment_configs(
        &self,
        filter: &EnvironmentFilter,
    ) -> Result<Vec<EnvironmentConfig>> {
        let mut query = project_environments::table
            .select(EnvironmentConfig::as_select())
            .filter(project_environments::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(env) = given(&filter.environment_name) {
            query = query.filter(project_environments::environment_name.eq(env.to_owned()));
        }
        if !filter.include_sensitive {
            query = query.filter(project_environments::is_sensitive.eq(false));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((
                project_environments::environment_name.asc(),
                project_environments::config_key.asc(),
            ))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Upsert a build on (project, build number). The start time is set
    /// by the first write and kept afterwards.
    pub fn store_build(&self, input: &StoreBuild) -> Result<BuildRecord> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let test_results = to_document(&input.test_results)?;
        let row = NewBuild {
            project_name: &input.project_name,
            build_number: &input.build_number,
            build_type: &input.build_type,
            status: &input.status,
            branch_name: input.branch_name.as_deref(),
            commit_hash: input.commit_hash.as_deref(),
            triggered_by: input.triggered_by.as_deref(),
            test_results_json: &test_results,
            metadata_json: &metadata,
            start_time: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let build = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_builds::table)
                .values(&row)
                .on_conflict((project_builds::project_name, project_builds::build_number))
                .do_update()
                .set((
                    project_builds::build_type.eq(excluded(project_builds::build_type)),
                    project_builds::status.eq(excluded(project_builds::status)),
                    project_builds::branch_name.eq(excluded(project_builds::branch_name)),
                    project_builds::commit_hash.eq(excluded(project_builds::commit_hash)),
                    project_builds::triggered_by.eq(excluded(project_builds::triggered_by)),
                    project_builds::test_results_json
                        .eq(excluded(project_builds::test_results_json)),
                    project_builds::metadata_json.eq(excluded(project_builds::metadata_json)),
                    project_builds::updated_at.eq(excluded(project_builds::updated_at)),
                ))
                .execute(conn)?;

            project_builds::table
                .filter(project_builds::project_name.eq(&input.project_name))
                .filter(project_builds::build_number.eq(&input.build_number))
                .select(BuildRecord::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %build.project_name,
            build = %build.build_number,
            id = build.id,
            "stored build"
        );
        Ok(build)
    }

    /// Move an existing build to a new status.
    ///
    /// Fails with [`DbError::NotFound`] when no build has this number.
    pub fn update_build_status(&self, input: &UpdateBuildStatus) -> Result<BuildRecord> {
        let now = now_timestamp();
        let end_time = input.end_time.clone().unwrap_or_else(|| now.clone());

        let mut conn = self.conn()?;
        let build = conn.immediate_transaction::<_, DbError, _>(|conn| {
            let updated = diesel::update(
                project_builds::table
                    .filter(project_builds::project_name.eq(&input.project_name))
                    .filter(project_builds::build_number.eq(&input.build_number)),
            )
            .set((
                project_builds::status.eq(&input.status),
                project_builds::end_time.eq(Some(&end_time)),
                project_builds::duration_seconds.eq(input.duration_seconds),
                project_builds::logs.eq(input.logs.as_deref()),
                project_builds::updated_at.eq(&now),
            ))
            .execute(conn)?;

            if updated == 0 {
                return Err(DbError::NotFound(format!(
                    "Build \"{}\" not found in project \"{}\"",
                    input.build_number, input.project_name
                )));
            }

            let build = project_builds::table
                .filter(project_builds::project_name.eq(&input.project_name))
                .filter(project_builds::build_number.eq(&input.build_number))
                .select(BuildRecord::as_select())
                .first(conn)?;
            Ok(build)
        })?;

        tracing::debug!(
            project = %build.project_name,
            build = %build.build_number,
            status = %build.status,
            "updated build status"
        );
        Ok(build)
    }

    /// Builds, most recently started first (default limit 50)
    pub fn get_build_history(&self, filter: &BuildFilter) -> Result<Vec<BuildRecord>> {
        let mut query = project_builds::table
            .select(BuildRecord::as_select())
            .filter(project_builds::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(status) = given(&filter.status) {
            query = query.filter(project_builds::status.eq(status.to_owned()));
        }
        if let Some(branch) = given(&filter.branch_name) {
            query = query.filter(project_builds::branch_name.eq(branch.to_owned()));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((project_builds::start_time.desc(), project_builds::id.desc()))
            .limit(effective_limit(filter.limit, 50))
            .load(&mut *conn)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;
    use serde_json::json;

    fn env_entry(key: &str, value: &str, sensitive: bool) -> StoreEnvironmentConfig {
        StoreEnvironmentConfig {
            project_name: "p".to_string(),
            environment_name: "production".to_string(),
            config_key: key.to_string(),
            config_value: value.to_string(),
            is_sensitive: sensitive,
            description: None,
            metadata: json!({}),
        }
    }

    fn build(number: &str, status: &str) -> StoreBuild {
        StoreBuild {
            project_name: "p".to_string(),
            build_number: number.to_string(),
            build_type: "ci".to_string(),
            status: status.to_string(),
            branch_name: Some("main".to_string()),
            commit_hash: None,
            triggered_by: None,
            test_results: json!({}),
            metadata: json!({}),
        }
    }

    #[test]
    fn test_sensitive_configs_excluded_by_default() {
        let (db, _dir) = temp_db();
        db.store_environment_config(&env_entry("API_URL", "https://api", false))
            .unwrap();
        db.store_environment_config(&env_entry("API_KEY", "hunter2", true))
            .unwrap();

        let visible = db
            .get_environment_configs(&EnvironmentFilter {
                project_name: "p".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].config_key, "API_URL");

        let all = db
            .get_environment_configs(&EnvironmentFilter {
                project_name: "p".to_string(),
                include_sensitive: true,
                ..Default::default()
            })
            .unwrap();
        let keys: Vec<&str> = all.iter().map(|c| c.config_key.as_str()).collect();
        assert_eq!(keys, vec!["API_KEY", "API_URL"]);
    }

    #[test]
    fn test_dependency_key_collapses_package_managers() {
        let (db, _dir) = temp_db();
        let mut dep = StoreDependency {
            project_name: "p".to_string(),
            package_name: "serde".to_string(),
            version: "1.0.0".to_string(),
            package_manager: "cargo".to_string(),
            dependency_type: default_dependency_type(),
            license: Some("MIT".to_string()),
            description: None,
            is_active: true,
            metadata: json!({}),
        };
        db.store_dependency(&dep).unwrap();
        dep.package_manager = "npm".to_string();
        dep.version = "2.0.0".to_string();
        db.store_dependency(&dep).unwrap();

        let rows = db.get_dependencies(&DependencyFilter::project("p")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].package_manager, "npm");
        assert_eq!(rows[0].version, "2.0.0");
    }

    #[test]
    fn test_dependencies_sorted_and_filtered() {
        let (db, _dir) = temp_db();
        for (name, kind, active) in [
            ("tokio", "production", true),
            ("proptest", "development", true),
            ("anyhow", "production", false),
        ] {
            db.store_dependency(&StoreDependency {
                project_name: "p".to_string(),
                package_name: name.to_string(),
                version: "1".to_string(),
                package_manager: "cargo".to_string(),
                dependency_type: kind.to_string(),
                license: None,
                description: None,
                is_active: active,
                metadata: json!({}),
            })
            .unwrap();
        }

        let active: Vec<String> = db
            .get_dependencies(&DependencyFilter::project("p"))
            .unwrap()
            .into_iter()
            .map(|d| d.package_name)
            .collect();
        assert_eq!(active, vec!["proptest", "tokio"]);

        let production = db
            .get_dependencies(&DependencyFilter {
                dependency_type: Some("production".to_string()),
                active_only: false,
                ..DependencyFilter::project("p")
            })
            .unwrap();
        assert_eq!(production.len(), 2);
    }

    #[test]
    fn test_build_status_transition_touches_declared_columns() {
        let (db, _dir) = temp_db();
        let mut input = build("42", "running");
        input.commit_hash = Some("abc123".to_string());
        let stored = db.store_build(&input).unwrap();
        assert!(stored.end_time.is_none());

        let updated = db
            .update_build_status(&UpdateBuildStatus {
                project_name: "p".to_string(),
                build_number: "42".to_string(),
                status: "success".to_string(),
                end_time: None,
                duration_seconds: Some(93),
                logs: Some("ok".to_string()),
            })
            .unwrap();

        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.status, "success");
        assert_eq!(updated.duration_seconds, Some(93));
        assert!(updated.end_time.is_some());
        // untouched columns survive
        assert_eq!(updated.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(updated.start_time, stored.start_time);
        assert_eq!(updated.build_type, "ci");
    }

    #[test]
    fn test_update_missing_build_is_not_found() {
        let (db, _dir) = temp_db();
        let err = db
            .update_build_status(&UpdateBuildStatus {
                project_name: "p".to_string(),
                build_number: "nope".to_string(),
                status: "failed".to_string(),
                end_time: None,
                duration_seconds: None,
                logs: None,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        assert!(db
            .get_build_history(&BuildFilter {
                project_name: "p".to_string(),
                ..Default::default()
            })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_build_upsert_keeps_start_time() {
        let (db, _dir) = temp_db();
        let first = db.store_build(&build("7", "queued")).unwrap();
        let second = db.store_build(&build("7", "running")).unwrap();
        assert_eq!(first.start_time, second.start_time);
        assert_eq!(second.status, "running");

        db.store_build(&build("8", "failed")).unwrap();
        let failed = db
            .get_build_history(&BuildFilter {
                project_name: "p".to_string(),
                status: Some("failed".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].build_number, "8");

        let history = db
            .get_build_history(&BuildFilter {
                project_name: "p".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(history[0].build_number, "8");
    }
}
