//! Project members, tasks and the activity ledger

use super::{default_true, effective_limit, given, now_timestamp, to_document, Database};
use crate::error::Result;
use crate::schema::{project_activity_logs, project_tasks, project_users};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::Sqlite;
use diesel::upsert::excluded;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort key for task priorities; unknown priorities sort last
const PRIORITY_RANK: &str =
    "CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 WHEN 'low' THEN 3 ELSE 4 END";

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreUser {
    pub project_name: String,
    pub username: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "crate::db::empty_document")]
    pub permissions: Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

fn default_role() -> String {
    "developer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub project_name: String,
    pub role: Option<String>,
    #[serde(default = "default_true")]
    pub active_only: bool,
    pub limit: Option<u32>,
}

impl UserFilter {
    /// Active users of `project`, no other constraint
    pub fn project(project: &str) -> Self {
        Self {
            project_name: project.to_string(),
            role: None,
            active_only: true,
            limit: None,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = project_users)]
struct NewUser<'a> {
    project_name: &'a str,
    username: &'a str,
    email: &'a str,
    role: &'a str,
    permissions_json: &'a str,
    is_active: bool,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
    last_active: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_users)]
pub struct ProjectUser {
    pub id: i32,
    pub project_name: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub permissions_json: String,
    pub is_active: bool,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_active: String,
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTask {
    pub project_name: String,
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_task_status")]
    pub status: String,
    #[serde(default = "default_task_priority")]
    pub priority: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

fn default_task_status() -> String {
    "open".to_string()
}

fn default_task_priority() -> String {
    "medium".to_string()
}

fn default_task_type() -> String {
    "feature".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub project_name: String,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub task_type: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = project_tasks)]
struct NewTask<'a> {
    project_name: &'a str,
    task_id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    status: &'a str,
    priority: &'a str,
    task_type: &'a str,
    assignee: Option<&'a str>,
    reporter: Option<&'a str>,
    metadata_json: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_tasks)]
pub struct ProjectTask {
    pub id: i32,
    pub project_name: String,
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub task_type: String,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub metadata_json: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Activity Log
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivity {
    pub project_name: String,
    pub activity_type: String,
    pub actor: String,
    pub target: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default = "crate::db::empty_document")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub project_name: String,
    pub activity_type: Option<String>,
    pub actor: Option<String>,
    pub target: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Insertable)]
#[diesel(table_name = project_activity_logs)]
struct NewActivity<'a> {
    project_name: &'a str,
    activity_type: &'a str,
    actor: &'a str,
    target: &'a str,
    action: &'a str,
    details: Option<&'a str>,
    ip_address: Option<&'a str>,
    user_agent: Option<&'a str>,
    metadata_json: &'a str,
    occurred_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = project_activity_logs)]
pub struct ActivityLogEntry {
    pub id: i32,
    pub project_name: String,
    pub activity_type: String,
    pub actor: String,
    pub target: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata_json: String,
    pub occurred_at: String,
}

impl Database {
    /// Upsert a member on (project, username); refreshes `last_active`
    pub fn store_user(&self, input: &StoreUser) -> Result<ProjectUser> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let permissions = to_document(&input.permissions)?;
        let row = NewUser {
            project_name: &input.project_name,
            username: &input.username,
            email: &input.email,
            role: &input.role,
            permissions_json: &permissions,
            is_active: input.is_active,
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
            last_active: &now,
        };

        let mut conn = self.conn()?;
        let user = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_users::table)
                .values(&row)
                .on_conflict((project_users::project_name, project_users::username))
                .do_update()
                .set((
                    project_users::email.eq(excluded(project_users::email)),
                    project_users::role.eq(excluded(project_users::role)),
                    project_users::permissions_json.eq(excluded(project_users::permissions_json)),
                    project_users::is_active.eq(excluded(project_users::is_active)),
                    project_users::metadata_json.eq(excluded(project_users::metadata_json)),
                    project_users::updated_at.eq(excluded(project_users::updated_at)),
                    project_users::last_active.eq(excluded(project_users::last_active)),
                ))
                .execute(conn)?;

            project_users::table
                .filter(project_users::project_name.eq(&input.project_name))
                .filter(project_users::username.eq(&input.username))
                .select(ProjectUser::as_select())
                .first(conn)
        })?;

        tracing::debug!(project = %user.project_name, id = user.id, "stored user");
        Ok(user)
    }

    pub fn get_users(&self, filter: &UserFilter) -> Result<Vec<ProjectUser>> {
        let mut query = project_users::table
            .select(ProjectUser::as_select())
            .filter(project_users::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(role) = given(&filter.role) {
            query = query.filter(project_users::role.eq(role.to_owned()));
        }
        if filter.active_only {
            query = query.filter(project_users::is_active.eq(true));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((project_users::role.asc(), project_users::username.asc()))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Upsert a task on (project, task id)
    pub fn store_task(&self, input: &StoreTask) -> Result<ProjectTask> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewTask {
            project_name: &input.project_name,
            task_id: &input.task_id,
            title: &input.title,
            description: input.description.as_deref(),
            status: &input.status,
            priority: &input.priority,
            task_type: &input.task_type,
            assignee: input.assignee.as_deref(),
            reporter: input.reporter.as_deref(),
            metadata_json: &metadata,
            created_at: &now,
            updated_at: &now,
        };

        let mut conn = self.conn()?;
        let task = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_tasks::table)
                .values(&row)
                .on_conflict((project_tasks::project_name, project_tasks::task_id))
                .do_update()
                .set((
                    project_tasks::title.eq(excluded(project_tasks::title)),
                    project_tasks::description.eq(excluded(project_tasks::description)),
                    project_tasks::status.eq(excluded(project_tasks::status)),
                    project_tasks::priority.eq(excluded(project_tasks::priority)),
                    project_tasks::task_type.eq(excluded(project_tasks::task_type)),
                    project_tasks::assignee.eq(excluded(project_tasks::assignee)),
                    project_tasks::reporter.eq(excluded(project_tasks::reporter)),
                    project_tasks::metadata_json.eq(excluded(project_tasks::metadata_json)),
                    project_tasks::updated_at.eq(excluded(project_tasks::updated_at)),
                ))
                .execute(conn)?;

            project_tasks::table
                .filter(project_tasks::project_name.eq(&input.project_name))
                .filter(project_tasks::task_id.eq(&input.task_id))
                .select(ProjectTask::as_select())
                .first(conn)
        })?;

        tracing::debug!(
            project = %task.project_name,
            task = %task.task_id,
            id = task.id,
            "stored task"
        );
        Ok(task)
    }

    /// Tasks by priority (critical first), then newest first
    pub fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<ProjectTask>> {
        let mut query = project_tasks::table
            .select(ProjectTask::as_select())
            .filter(project_tasks::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(status) = given(&filter.status) {
            query = query.filter(project_tasks::status.eq(status.to_owned()));
        }
        if let Some(assignee) = given(&filter.assignee) {
            query = query.filter(project_tasks::assignee.eq(assignee.to_owned()));
        }
        if let Some(priority) = given(&filter.priority) {
            query = query.filter(project_tasks::priority.eq(priority.to_owned()));
        }
        if let Some(task_type) = given(&filter.task_type) {
            query = query.filter(project_tasks::task_type.eq(task_type.to_owned()));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((
                sql::<Integer>(PRIORITY_RANK).asc(),
                project_tasks::created_at.desc(),
                project_tasks::id.desc(),
            ))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }

    /// Append one activity entry
    pub fn log_activity(&self, input: &LogActivity) -> Result<ActivityLogEntry> {
        let now = now_timestamp();
        let metadata = to_document(&input.metadata)?;
        let row = NewActivity {
            project_name: &input.project_name,
            activity_type: &input.activity_type,
            actor: &input.actor,
            target: &input.target,
            action: &input.action,
            details: input.details.as_deref(),
            ip_address: input.ip_address.as_deref(),
            user_agent: input.user_agent.as_deref(),
            metadata_json: &metadata,
            occurred_at: &now,
        };

        let mut conn = self.conn()?;
        let entry = conn.immediate_transaction(|conn| {
            diesel::insert_into(project_activity_logs::table)
                .values(&row)
                .execute(conn)?;

            let id: i32 = diesel::select(sql::<Integer>("last_insert_rowid()")).first(conn)?;

            project_activity_logs::table
                .filter(project_activity_logs::id.eq(id))
                .select(ActivityLogEntry::as_select())
                .first(conn)
        })?;

        tracing::debug!(project = %entry.project_name, id = entry.id, "logged activity");
        Ok(entry)
    }

    pub fn get_activity_logs(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLogEntry>> {
        let mut query = project_activity_logs::table
            .select(ActivityLogEntry::as_select())
            .filter(project_activity_logs::project_name.eq(filter.project_name.clone()))
            .into_boxed::<Sqlite>();

        if let Some(activity_type) = given(&filter.activity_type) {
            query = query.filter(project_activity_logs::activity_type.eq(activity_type.to_owned()));
        }
        if let Some(actor) = given(&filter.actor) {
            query = query.filter(project_activity_logs::actor.eq(actor.to_owned()));
        }
        if let Some(target) = given(&filter.target) {
            query = query.filter(project_activity_logs::target.eq(target.to_owned()));
        }

        let mut conn = self.conn()?;
        let rows = query
            .order((
                project_activity_logs::occurred_at.desc(),
                project_activity_logs::id.desc(),
            ))
            .limit(effective_limit(filter.limit, 100))
            .load(&mut *conn)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;
    use serde_json::json;
    use std::sync::Arc;

    fn task(id: &str, title: &str) -> StoreTask {
        StoreTask {
            project_name: "p".to_string(),
            task_id: id.to_string(),
            title: title.to_string(),
            description: None,
            status: default_task_status(),
            priority: default_task_priority(),
            task_type: default_task_type(),
            assignee: None,
            reporter: None,
            metadata: json!({}),
        }
    }

    fn all_tasks(db: &Database) -> Vec<ProjectTask> {
        db.get_tasks(&TaskFilter {
            project_name: "p".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_task_upsert_replaces_title() {
        let (db, _dir) = temp_db();
        db.store_task(&task("T1", "Title")).unwrap();
        db.store_task(&task("T1", "Title2")).unwrap();

        let tasks = all_tasks(&db);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Title2");
    }

    #[test]
    fn test_task_defaults_from_json() {
        let input: StoreTask =
            serde_json::from_value(json!({"projectName": "p", "taskId": "T9", "title": "x"})).unwrap();
        assert_eq!(input.status, "open");
        assert_eq!(input.priority, "medium");
        assert_eq!(input.task_type, "feature");
        assert_eq!(input.metadata, json!({}));
    }

    #[test]
    fn test_task_filters_are_conjunctive() {
        let (db, _dir) = temp_db();
        let mut a = task("A", "open for bob");
        a.assignee = Some("bob".to_string());
        let mut b = task("B", "closed for bob");
        b.assignee = Some("bob".to_string());
        b.status = "done".to_string();
        let mut c = task("C", "open for carol");
        c.assignee = Some("carol".to_string());
        for t in [&a, &b, &c] {
            db.store_task(t).unwrap();
        }

        let rows = db
            .get_tasks(&TaskFilter {
                project_name: "p".to_string(),
                status: Some("open".to_string()),
                assignee: Some("bob".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].task_id, "A");
    }

    #[test]
    fn test_blank_filter_matches_everything() {
        let (db, _dir) = temp_db();
        db.store_task(&task("A", "first")).unwrap();
        db.store_task(&task("B", "second")).unwrap();

        let rows = db
            .get_tasks(&TaskFilter {
                project_name: "p".to_string(),
                status: Some(String::new()),
                assignee: Some("  ".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_tasks_sorted_by_priority_rank() {
        let (db, _dir) = temp_db();
        for (id, priority) in [("1", "low"), ("2", "critical"), ("3", "someday"), ("4", "high")] {
            let mut t = task(id, id);
            t.priority = priority.to_string();
            db.store_task(&t).unwrap();
        }
        let order: Vec<String> = all_tasks(&db).into_iter().map(|t| t.priority).collect();
        assert_eq!(order, vec!["critical", "high", "low", "someday"]);
    }

    #[test]
    fn test_filter_value_is_not_sql() {
        let (db, _dir) = temp_db();
        db.store_task(&task("T1", "x")).unwrap();
        let rows = db
            .get_tasks(&TaskFilter {
                project_name: "p' OR '1'='1".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(all_tasks(&db).len(), 1);
    }

    #[test]
    fn test_concurrent_task_upserts() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.store_task(&task("RACE", &format!("title-{i}"))).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let tasks = all_tasks(&db);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].title.starts_with("title-"));
    }

    #[test]
    fn test_users_active_only_by_default() {
        let (db, _dir) = temp_db();
        let mut user = StoreUser {
            project_name: "p".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: default_role(),
            permissions: json!({"deploy": true}),
            is_active: true,
            metadata: json!({}),
        };
        db.store_user(&user).unwrap();
        user.username = "bob".to_string();
        user.is_active = false;
        db.store_user(&user).unwrap();

        let active = db.get_users(&UserFilter::project("p")).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username, "alice");
        assert_eq!(active[0].permissions_json, r#"{"deploy":true}"#);

        let everyone = db
            .get_users(&UserFilter {
                active_only: false,
                ..UserFilter::project("p")
            })
            .unwrap();
        assert_eq!(everyone.len(), 2);
    }

    #[test]
    fn test_user_upsert_keeps_created_at() {
        let (db, _dir) = temp_db();
        let mut user = StoreUser {
            project_name: "p".to_string(),
            username: "alice".to_string(),
            email: "old@example.com".to_string(),
            role: "developer".to_string(),
            permissions: json!({}),
            is_active: true,
            metadata: json!({}),
        };
        let first = db.store_user(&user).unwrap();
        user.email = "new@example.com".to_string();
        user.role = "admin".to_string();
        let second = db.store_user(&user).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.email, "new@example.com");
        assert_eq!(second.role, "admin");
    }

    #[test]
    fn test_activity_log_appends_and_filters() {
        let (db, _dir) = temp_db();
        for (actor, action) in [("alice", "opened"), ("bob", "closed"), ("alice", "merged")] {
            db.log_activity(&LogActivity {
                project_name: "p".to_string(),
                activity_type: "pull_request".to_string(),
                actor: actor.to_string(),
                target: "PR-1".to_string(),
                action: action.to_string(),
                details: None,
                ip_address: None,
                user_agent: None,
                metadata: json!({}),
            })
            .unwrap();
        }

        let alice = db
            .get_activity_logs(&ActivityFilter {
                project_name: "p".to_string(),
                actor: Some("alice".to_string()),
                ..Default::default()
            })
            .unwrap();
        let actions: Vec<&str> = alice.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["merged", "opened"]);
    }
}
