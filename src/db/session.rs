//! Session handling.
//!
//! A [`SessionFactory`] binds an engine to a transaction policy and hands out
//! short-lived [`Session`] unit-of-work objects, one per request. Sessions
//! queue writes until `flush`, run reads immediately, and track the rows they
//! have loaded. Query and flush are the two places driver errors cross into
//! the application: both translate every `sqlx::Error` into
//! [`DbError::Database`].

use crate::db::engine::{DbPool, Engine};
use crate::db::rows::{SqlParam, bind_postgres, bind_sqlite, pg_row_to_json, sqlite_row_to_json};
use crate::error::{DbError, DbResult};
use serde_json::Value as JsonValue;
use sqlx::{Postgres, Sqlite, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "mysql")]
use crate::db::rows::{bind_mysql, mysql_row_to_json};
#[cfg(feature = "mysql")]
use sqlx::MySql;

/// Transaction and expiration policy for sessions produced by a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// When true, flushed writes commit immediately; when false, the session
    /// opens a transaction on first use and holds writes until `commit`.
    pub autocommit: bool,
    /// When true, rows loaded by the session are discarded at commit.
    pub expire_on_commit: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autocommit: true,
            expire_on_commit: false,
        }
    }
}

/// A configured constructor for per-request sessions, bound to one engine.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    engine: Arc<Engine>,
    options: SessionOptions,
}

impl SessionFactory {
    /// Create a factory bound to the given engine and policy.
    pub fn new(engine: Arc<Engine>, options: SessionOptions) -> Self {
        Self { engine, options }
    }

    /// Get the engine this factory is bound to.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Get the policy sessions are produced with.
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Produce a new session. Each call returns a fresh unit of work.
    pub fn session(&self) -> Session {
        Session {
            engine: Arc::clone(&self.engine),
            options: self.options,
            pending: Vec::new(),
            tx: None,
            loaded: HashMap::new(),
        }
    }
}

/// Open transaction held by a non-autocommit session.
enum SessionTx {
    #[cfg(feature = "mysql")]
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl std::fmt::Debug for SessionTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let driver = match self {
            #[cfg(feature = "mysql")]
            SessionTx::MySql(_) => "mysql",
            SessionTx::Postgres(_) => "postgres",
            SessionTx::Sqlite(_) => "sqlite",
        };
        f.debug_tuple("SessionTx").field(&driver).finish()
    }
}

/// A write queued for the next flush.
#[derive(Debug)]
struct Staged {
    sql: String,
    params: Vec<SqlParam>,
}

/// A unit-of-work object used to issue queries and flush pending changes.
///
/// Dropping a session with an open transaction rolls the transaction back.
#[derive(Debug)]
pub struct Session {
    engine: Arc<Engine>,
    options: SessionOptions,
    pending: Vec<Staged>,
    tx: Option<SessionTx>,
    loaded: HashMap<String, Vec<JsonValue>>,
}

impl Session {
    /// Get the engine this session runs against.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Get the policy this session was produced with.
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Number of writes queued for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Rows previously loaded by a query, keyed by statement text.
    /// Returns None after the loaded state has been expired.
    pub fn loaded(&self, sql: &str) -> Option<&[JsonValue]> {
        self.loaded.get(sql).map(Vec::as_slice)
    }

    /// Queue a write statement for the next flush.
    pub fn stage(&mut self, sql: impl Into<String>, params: Vec<SqlParam>) {
        self.pending.push(Staged {
            sql: sql.into(),
            params,
        });
    }

    /// Execute a read immediately and record the rows in the session.
    ///
    /// A non-autocommit session opens its transaction on first use, so reads
    /// observe the session's own uncommitted writes.
    pub async fn query(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<JsonValue>> {
        if !self.options.autocommit {
            self.ensure_tx().await?;
        }

        debug!(sql = %sql, params = params.len(), "executing query");

        let rows = match self.tx.as_mut() {
            Some(tx) => fetch_tx(tx, sql, params).await,
            None => fetch_pool(self.engine.pool(), sql, params).await,
        }
        .map_err(DbError::from)?;

        self.loaded.insert(sql.to_string(), rows.clone());
        Ok(rows)
    }

    /// Execute all queued writes, returning the total affected row count.
    ///
    /// Under autocommit each statement commits as it runs; otherwise the
    /// statements run inside the session transaction and stay invisible to
    /// other connections until `commit`. On failure the failed statement and
    /// everything after it remain queued.
    pub async fn flush(&mut self) -> DbResult<u64> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        if !self.options.autocommit {
            self.ensure_tx().await?;
        }

        debug!(statements = self.pending.len(), "flushing session");

        let staged = std::mem::take(&mut self.pending);
        let mut affected = 0u64;
        let mut iter = staged.into_iter();
        while let Some(stmt) = iter.next() {
            let run = match self.tx.as_mut() {
                Some(tx) => execute_tx(tx, &stmt.sql, &stmt.params).await,
                None => execute_pool(self.engine.pool(), &stmt.sql, &stmt.params).await,
            };
            match run {
                Ok(n) => affected += n,
                Err(e) => {
                    self.pending.push(stmt);
                    self.pending.extend(iter);
                    return Err(DbError::from(e));
                }
            }
        }
        Ok(affected)
    }

    /// Flush queued writes and commit the open transaction, if any.
    ///
    /// With `expire_on_commit` the loaded-state map is cleared so stale rows
    /// cannot be observed after the commit.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.flush().await?;
        if let Some(tx) = self.tx.take() {
            match tx {
                #[cfg(feature = "mysql")]
                SessionTx::MySql(tx) => tx.commit().await?,
                SessionTx::Postgres(tx) => tx.commit().await?,
                SessionTx::Sqlite(tx) => tx.commit().await?,
            }
        }
        if self.options.expire_on_commit {
            self.loaded.clear();
        }
        Ok(())
    }

    /// Discard queued writes, loaded state, and the open transaction.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.pending.clear();
        self.loaded.clear();
        if let Some(tx) = self.tx.take() {
            match tx {
                #[cfg(feature = "mysql")]
                SessionTx::MySql(tx) => tx.rollback().await?,
                SessionTx::Postgres(tx) => tx.rollback().await?,
                SessionTx::Sqlite(tx) => tx.rollback().await?,
            }
        }
        Ok(())
    }

    async fn ensure_tx(&mut self) -> DbResult<()> {
        if self.tx.is_some() {
            return Ok(());
        }
        let tx = match self.engine.pool() {
            #[cfg(feature = "mysql")]
            DbPool::MySql(pool) => SessionTx::MySql(pool.begin().await?),
            DbPool::Postgres(pool) => SessionTx::Postgres(pool.begin().await?),
            DbPool::Sqlite(pool) => SessionTx::Sqlite(pool.begin().await?),
        };
        self.tx = Some(tx);
        Ok(())
    }
}

async fn fetch_pool(
    pool: &DbPool,
    sql: &str,
    params: &[SqlParam],
) -> Result<Vec<JsonValue>, sqlx::Error> {
    match pool {
        #[cfg(feature = "mysql")]
        DbPool::MySql(pool) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql(query, param);
            }
            let rows = query.fetch_all(pool).await?;
            Ok(rows.iter().map(mysql_row_to_json).collect())
        }
        DbPool::Postgres(pool) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres(query, param);
            }
            let rows = query.fetch_all(pool).await?;
            Ok(rows.iter().map(pg_row_to_json).collect())
        }
        DbPool::Sqlite(pool) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite(query, param);
            }
            let rows = query.fetch_all(pool).await?;
            Ok(rows.iter().map(sqlite_row_to_json).collect())
        }
    }
}

async fn fetch_tx(
    tx: &mut SessionTx,
    sql: &str,
    params: &[SqlParam],
) -> Result<Vec<JsonValue>, sqlx::Error> {
    match tx {
        #[cfg(feature = "mysql")]
        SessionTx::MySql(tx) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql(query, param);
            }
            let rows = query.fetch_all(&mut **tx).await?;
            Ok(rows.iter().map(mysql_row_to_json).collect())
        }
        SessionTx::Postgres(tx) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres(query, param);
            }
            let rows = query.fetch_all(&mut **tx).await?;
            Ok(rows.iter().map(pg_row_to_json).collect())
        }
        SessionTx::Sqlite(tx) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite(query, param);
            }
            let rows = query.fetch_all(&mut **tx).await?;
            Ok(rows.iter().map(sqlite_row_to_json).collect())
        }
    }
}

async fn execute_pool(
    pool: &DbPool,
    sql: &str,
    params: &[SqlParam],
) -> Result<u64, sqlx::Error> {
    match pool {
        #[cfg(feature = "mysql")]
        DbPool::MySql(pool) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql(query, param);
            }
            Ok(query.execute(pool).await?.rows_affected())
        }
        DbPool::Postgres(pool) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres(query, param);
            }
            Ok(query.execute(pool).await?.rows_affected())
        }
        DbPool::Sqlite(pool) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite(query, param);
            }
            Ok(query.execute(pool).await?.rows_affected())
        }
    }
}

async fn execute_tx(
    tx: &mut SessionTx,
    sql: &str,
    params: &[SqlParam],
) -> Result<u64, sqlx::Error> {
    match tx {
        #[cfg(feature = "mysql")]
        SessionTx::MySql(tx) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql(query, param);
            }
            Ok(query.execute(&mut **tx).await?.rows_affected())
        }
        SessionTx::Postgres(tx) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres(query, param);
            }
            Ok(query.execute(&mut **tx).await?.rows_affected())
        }
        SessionTx::Sqlite(tx) => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite(query, param);
            }
            Ok(query.execute(&mut **tx).await?.rows_affected())
        }
    }
}
