//! Pooled relational client.
//!
//! Parameterized queries only; a statement timeout is applied to every
//! connection at acquisition. The transaction helper guarantees
//! commit-or-rollback even when the closure errors.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::StoreError;

/// Pooled Postgres client.
#[derive(Clone)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    /// Connect with a bounded pool and per-connection statement timeout.
    pub async fn connect(
        dsn: &str,
        max_connections: u32,
        statement_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let timeout_ms = statement_timeout.as_millis();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    let sql = format!("SET statement_timeout = {timeout_ms}");
                    sqlx::Executor::execute(&mut *conn, sql.as_str()).await?;
                    Ok(())
                })
            })
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` inside a transaction. Commit on `Ok`, roll back on `Err` or
    /// panic-unwind (rollback on drop is sqlx's guarantee).
    pub async fn with_tx<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'t> FnOnce(
            &'t mut Transaction<'static, Postgres>,
        ) -> Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 't>>,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(v) => {
                tx.commit().await?;
                Ok(v)
            }
            Err(e) => {
                // Explicit rollback so the error path is visible in traces.
                if let Err(rb) = tx.rollback().await {
                    tracing::error!(error = %rb, "rollback failed after transaction error");
                }
                Err(e)
            }
        }
    }

    /// Execute a statement returning affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        let done = sqlx::query(sql).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}
