//! Unit-of-work coordinator.
//!
//! `within_transaction` acquires a dedicated connection from the pool, opens a
//! transaction and runs the supplied closure against a [`Session`] handle.
//! Stores derive transaction-scoped copies of themselves by binding to that
//! session; every operation performed through a bound store shares the one
//! connection and commits or rolls back together.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;

use crate::error::AppError;

/// Cheap-clone handle over an open transaction's connection. Becomes inactive
/// once the unit of work commits or rolls back; binding a store to an
/// inactive session fails.
#[derive(Clone, Debug)]
pub struct Session {
    pub(crate) conn: Arc<Mutex<PoolConnection<Postgres>>>,
    active: Arc<AtomicBool>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Where a store executes its queries: the shared pool, or the single
/// connection of an open unit of work. The explicit tag is what lets `bind`
/// reject double-binding instead of silently nesting transactions.
#[derive(Clone, Debug)]
pub(crate) enum Backend {
    Pool(PgPool),
    Bound(Session),
}

impl Backend {
    /// Derive a transaction-scoped backend. A pool-backed store may bind to
    /// an active session exactly once; anything else is a bug in the caller.
    pub fn bind(&self, session: &Session) -> Result<Backend, AppError> {
        if !session.is_active() {
            return Err(AppError::NoTransaction);
        }
        match self {
            Backend::Bound(_) => Err(AppError::AlreadyInTransaction),
            Backend::Pool(_) => Ok(Backend::Bound(session.clone())),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Backend::Bound(_))
    }
}

/// Run a query expression against whatever executor the backend holds. Each
/// arm type-checks the body separately, so the same expression works for both
/// the pool and a locked transaction connection.
macro_rules! on_executor {
    ($backend:expr, $ex:ident => $body:expr) => {
        match $backend {
            $crate::db::session::Backend::Pool(pool) => {
                let $ex = pool;
                $body
            }
            $crate::db::session::Backend::Bound(session) => {
                let mut conn = session.conn.lock().await;
                let $ex = &mut **conn;
                $body
            }
        }
    };
}

pub(crate) use on_executor;

/// Run `op` inside a single database transaction. Commits on `Ok`, rolls back
/// on `Err` and propagates the error unchanged. The unit of work always gets
/// its own pooled connection; it is never shared with another concurrently
/// active transaction.
pub async fn within_transaction<T, F, Fut>(pool: &PgPool, op: F) -> Result<T, AppError>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| AppError::db("Begin", "session", e))?;
    sqlx::query("BEGIN")
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::db("Begin", "session", e))?;

    let session = Session {
        conn: Arc::new(Mutex::new(conn)),
        active: Arc::new(AtomicBool::new(true)),
    };

    let result = op(session.clone()).await;
    session.active.store(false, Ordering::SeqCst);

    let mut conn = session.conn.lock().await;
    match result {
        Ok(value) => {
            sqlx::query("COMMIT")
                .execute(&mut **conn)
                .await
                .map_err(|e| AppError::db("Commit", "session", e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut **conn).await {
                tracing::error!("rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}
