//! Error types shared by the store, the tool layer and configuration loading

use crate::pool::PoolState;
use std::fmt;
use std::time::Duration;

/// Error type for persistence and pool operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The pool had no free connection within the configured timeout
    #[error(
        "Timed out after {}ms waiting for a database connection{}",
        waited.as_millis(),
        cause_suffix(cause)
    )]
    AcquisitionTimeout {
        waited: Duration,
        cause: Option<String>,
    },
    /// The pool is draining or closed and hands out no more connections
    #[error("Connection pool is {0}; no new connections are handed out")]
    PoolClosed(PoolState),
    /// The database could not be reached at all within the retry budget
    #[error("Database unreachable after {attempts} attempts: {message}")]
    PoolFatal { attempts: u32, message: String },
    /// The connection was lost while a statement was running
    #[error("Connection error: {0}")]
    Connection(String),
    /// A unique, foreign-key, not-null or check constraint rejected the statement
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Query error: {0}")]
    Query(diesel::result::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid JSON document: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(c) => format!(" (last error: {})", c),
        None => String::new(),
    }
}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match e {
            Error::DatabaseError(
                kind @ (DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation),
                info,
            ) => DbError::Constraint(format!("{:?}: {}", kind, info.message())),
            Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                DbError::Connection(info.message().to_string())
            }
            Error::BrokenTransactionManager => {
                DbError::Connection("transaction state of the connection is broken".to_string())
            }
            other => DbError::Query(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// One problem found while checking tool arguments against a schema
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    Empty,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// The arguments value itself was not a JSON object
    NotAnObject,
    Invalid { reason: String },
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            IssueKind::Missing => write!(f, "missing required field `{}`", self.field),
            IssueKind::Empty => write!(f, "field `{}` must not be empty", self.field),
            IssueKind::WrongType { expected, found } => write!(
                f,
                "field `{}` must be {} (got {})",
                self.field, expected, found
            ),
            IssueKind::NotAnObject => write!(f, "arguments must be a JSON object"),
            IssueKind::Invalid { reason } => {
                write!(f, "field `{}` is invalid: {}", self.field, reason)
            }
        }
    }
}

/// Router-level failures, reported as protocol errors rather than tool results
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {}", join_issues(issues))]
    InvalidArguments {
        tool: String,
        issues: Vec<FieldIssue>,
    },
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_maps_to_constraint() {
        struct Info;
        impl diesel::result::DatabaseErrorInformation for Info {
            fn message(&self) -> &str {
                "UNIQUE constraint failed: project_tasks.task_id"
            }
            fn details(&self) -> Option<&str> {
                None
            }
            fn hint(&self) -> Option<&str> {
                None
            }
            fn table_name(&self) -> Option<&str> {
                None
            }
            fn column_name(&self) -> Option<&str> {
                None
            }
            fn constraint_name(&self) -> Option<&str> {
                None
            }
            fn statement_position(&self) -> Option<i32> {
                None
            }
        }

        let err: DbError = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new(Info),
        )
        .into();
        assert!(matches!(err, DbError::Constraint(_)));
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn test_lost_connection_maps_to_connection_error() {
        let err: DbError = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ClosedConnection,
            Box::new("disk I/O error".to_string()),
        )
        .into();
        assert!(matches!(err, DbError::Connection(_)));
        assert_eq!(err.to_string(), "Connection error: disk I/O error");

        let err: DbError = diesel::result::Error::BrokenTransactionManager.into();
        assert!(matches!(err, DbError::Connection(_)));
    }

    #[test]
    fn test_not_found_passes_through_as_query() {
        let err: DbError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, DbError::Query(_)));
    }

    #[test]
    fn test_invalid_arguments_lists_every_issue() {
        let err = DispatchError::InvalidArguments {
            tool: "store_project_task".to_string(),
            issues: vec![
                FieldIssue {
                    field: "taskId".to_string(),
                    problem: IssueKind::Missing,
                },
                FieldIssue {
                    field: "limit".to_string(),
                    problem: IssueKind::WrongType {
                        expected: "an integer",
                        found: "string",
                    },
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing required field `taskId`"));
        assert!(msg.contains("field `limit` must be an integer (got string)"));
    }

    #[test]
    fn test_acquisition_timeout_message() {
        let err = DbError::AcquisitionTimeout {
            waited: Duration::from_millis(2000),
            cause: Some("database is locked".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 2000ms waiting for a database connection (last error: database is locked)"
        );
    }
}
