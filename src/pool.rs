//! Bounded SQLite connection pool
//!
//! Wraps an r2d2 pool with an explicit lifecycle (open, draining, closed),
//! a lease guard that always hands its connection back, startup
//! reachability checks with backoff and a health report.

use crate::config::PoolConfig;
use crate::error::{DbError, Result};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, HandleError, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqlitePooled = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Lifecycle of the pool. There is no way back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    Open,
    Draining,
    Closed,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolState::Open => write!(f, "open"),
            PoolState::Draining => write!(f, "draining"),
            PoolState::Closed => write!(f, "closed"),
        }
    }
}

/// Background failure counters fed by r2d2's error handler
#[derive(Debug, Default)]
struct FailureLog {
    consecutive: AtomicU32,
    total: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl FailureLog {
    fn record_failure(&self, message: String) {
        self.consecutive.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        *self
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(message);
    }

    fn record_success(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Receives connection errors r2d2 hits outside of any request
#[derive(Debug)]
struct ErrorSink(Arc<FailureLog>);

impl HandleError<diesel::r2d2::Error> for ErrorSink {
    fn handle_error(&self, error: diesel::r2d2::Error) {
        tracing::warn!(error = %error, "background database connection failure");
        self.0.record_failure(error.to_string());
    }
}

/// Per-connection SQLite settings, applied once when r2d2 opens a connection
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u64,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

struct Inner {
    state: PoolState,
    in_flight: usize,
    pool: Option<SqlitePool>,
}

/// Connection pool with an explicit open/drain/close contract
pub struct ConnectionPool {
    inner: Mutex<Inner>,
    released: Condvar,
    failures: Arc<FailureLog>,
    connection_timeout: Duration,
    max_size: u32,
}

/// Snapshot returned by [`ConnectionPool::health`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: PoolState,
    pub reachable: bool,
    pub connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
    pub in_flight: usize,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.state == PoolState::Open && self.reachable
    }
}

/// Outcome of [`ConnectionPool::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Leases still checked out when the drain timeout expired
    pub abandoned: usize,
    pub elapsed_ms: u128,
}

impl ConnectionPool {
    /// Build a pool for the SQLite database at `url`.
    ///
    /// No connection is opened here; call [`ConnectionPool::verify`] to
    /// check reachability.
    pub fn new(url: &str, config: &PoolConfig) -> Result<Self> {
        let failures = Arc::new(FailureLog::default());
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let options = ConnectionOptions {
            busy_timeout_ms: config.busy_timeout_ms,
            wal: url != ":memory:",
        };

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout())
            .idle_timeout(Some(config.idle_timeout()).filter(|t| !t.is_zero()))
            .test_on_check_out(true)
            .error_handler(Box::new(ErrorSink(Arc::clone(&failures))))
            .connection_customizer(Box::new(options))
            .build_unchecked(manager);

        Ok(Self {
            inner: Mutex::new(Inner {
                state: PoolState::Open,
                in_flight: 0,
                pool: Some(pool),
            }),
            released: Condvar::new(),
            failures,
            connection_timeout: config.connection_timeout(),
            max_size: config.max_size,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PoolState {
        self.lock().state
    }

    /// Borrow a connection, blocking up to the configured timeout.
    ///
    /// The returned lease gives the connection back when dropped, whether
    /// the caller's statement succeeded or not.
    pub fn acquire(&self) -> Result<Lease<'_>> {
        let pool = {
            let mut inner = self.lock();
            if inner.state != PoolState::Open {
                return Err(DbError::PoolClosed(inner.state));
            }
            let Some(pool) = inner.pool.clone() else {
                return Err(DbError::PoolClosed(PoolState::Closed));
            };
            inner.in_flight += 1;
            pool
        };
        let guard = InFlight { pool: self };

        match pool.get() {
            Ok(conn) => {
                self.failures.record_success();
                Ok(Lease {
                    conn,
                    _guard: guard,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "connection acquisition timed out");
                self.failures.record_failure(e.to_string());
                Err(DbError::AcquisitionTimeout {
                    waited: self.connection_timeout,
                    cause: Some(e.to_string()),
                })
            }
        }
    }

    /// One round-trip through a pooled connection
    pub fn ping(&self) -> Result<()> {
        let mut conn = self.acquire()?;
        diesel::sql_query("SELECT 1").execute(&mut *conn)?;
        Ok(())
    }

    /// Check reachability, retrying with exponential backoff.
    ///
    /// Exhausting every attempt yields [`DbError::PoolFatal`].
    pub fn verify(&self, attempts: u32, initial_backoff: Duration) -> Result<()> {
        let mut delay = initial_backoff;
        let mut last = String::from("no attempt made");

        for attempt in 1..=attempts {
            match self.ping() {
                Ok(()) => {
                    tracing::info!(attempt, "database reachable");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "database not reachable");
                    last = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        Err(DbError::PoolFatal {
            attempts,
            message: last,
        })
    }

    pub fn health(&self) -> HealthReport {
        let reachable = self.ping().is_ok();
        let inner = self.lock();
        let (connections, idle_connections) = match &inner.pool {
            Some(pool) => {
                let state = pool.state();
                (state.connections, state.idle_connections)
            }
            None => (0, 0),
        };

        HealthReport {
            state: inner.state,
            reachable,
            connections,
            idle_connections,
            max_size: self.max_size,
            in_flight: inner.in_flight,
            consecutive_failures: self.failures.consecutive.load(Ordering::Relaxed),
            total_failures: self.failures.total.load(Ordering::Relaxed),
            last_error: self.failures.last_error(),
        }
    }

    /// Stop handing out connections, wait for outstanding leases and close.
    ///
    /// Leases still out after `timeout` are abandoned; their connections
    /// close when they are eventually dropped.
    pub fn shutdown(&self, timeout: Duration) -> DrainReport {
        let started = Instant::now();
        let mut inner = self.lock();
        if inner.state == PoolState::Closed {
            return DrainReport {
                abandoned: 0,
                elapsed_ms: 0,
            };
        }

        inner.state = PoolState::Draining;
        tracing::info!(in_flight = inner.in_flight, "connection pool draining");

        let deadline = started + timeout;
        while inner.in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    in_flight = inner.in_flight,
                    "drain timeout reached with connections still checked out"
                );
                break;
            }
            let (guard, _) = self
                .released
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }

        let abandoned = inner.in_flight;
        // dropping the last pool handle closes the idle connections
        inner.pool = None;
        inner.state = PoolState::Closed;
        tracing::info!(abandoned, "connection pool closed");

        DrainReport {
            abandoned,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

struct InFlight<'a> {
    pool: &'a ConnectionPool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.pool.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        self.pool.released.notify_all();
    }
}

/// A borrowed connection. Dropping it returns the connection to the pool.
pub struct Lease<'a> {
    // declared before the guard so the connection is back in the pool
    // before the drain counter moves
    conn: SqlitePooled,
    _guard: InFlight<'a>,
}

impl Deref for Lease<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.conn
    }
}

impl DerefMut for Lease<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}
