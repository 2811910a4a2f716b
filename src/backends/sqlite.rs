use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo};
use tempfile::TempDir;
use uuid::Uuid;

use crate::backend::{Connection, ConnectionProvider};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::pool::PoolConfig;
use crate::value::SqlValue;

/// Connection provider backed by a `sqlx` SQLite pool.
#[derive(Clone)]
pub struct SqliteProvider {
    pool: SqlitePool,
    url: String,
    // keeps a throwaway database directory alive as long as any clone
    _tempdir: Option<Arc<TempDir>>,
}

impl SqliteProvider {
    /// Open a pool for the configured database, creating the file when
    /// missing. The pool warms up to `min_idle` connections in the
    /// background.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.pool.max_size as u32)
            .acquire_timeout(config.pool.acquire_timeout);
        if let Some(min_idle) = config.pool.min_idle {
            pool_options = pool_options.min_connections(min_idle as u32);
        }
        if let Some(lifetime) = config.pool.max_lifetime {
            pool_options = pool_options.max_lifetime(lifetime);
        }
        if let Some(idle) = config.pool.idle_timeout {
            pool_options = pool_options.idle_timeout(idle);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        tracing::debug!(url = %config.url, "sqlite pool ready");

        Ok(Self {
            pool,
            url: config.url.clone(),
            _tempdir: None,
        })
    }

    /// Open a pool over a throwaway database in a fresh temporary
    /// directory. The directory lives as long as the provider and its
    /// clones.
    pub async fn temporary() -> Result<Self> {
        Self::temporary_with(PoolConfig::default()).await
    }

    /// Throwaway database with custom pool settings
    pub async fn temporary_with(pool: PoolConfig) -> Result<Self> {
        let dir = TempDir::new()
            .map_err(|e| DbError::Config(format!("could not create temp dir: {e}")))?;
        let path = dir.path().join("txkit.db");
        let config = DbConfig::new(format!("sqlite:{}", path.display()))?.with_pool(pool);
        let mut provider = Self::connect(&config).await?;
        provider._tempdir = Some(Arc::new(dir));
        Ok(provider)
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    type Connection = SqliteConnection;

    async fn acquire(&self) -> Result<SqliteConnection> {
        let conn = self.pool.acquire().await?;
        let id = Uuid::new_v4();
        tracing::debug!(conn = %id, "connection acquired");
        Ok(SqliteConnection {
            conn,
            id,
            auto_commit: true,
            in_tx: false,
        })
    }

    async fn release(&self, conn: SqliteConnection) -> Result<()> {
        tracing::debug!(conn = %conn.id, "connection released");
        // dropping the handle returns it to the pool
        drop(conn);
        Ok(())
    }

    fn connection_string(&self) -> String {
        self.url.clone()
    }
}

/// A pooled SQLite session.
///
/// Manual-commit mode is driven with explicit BEGIN/COMMIT/ROLLBACK
/// statements; the transaction is opened lazily on the first statement after
/// auto-commit is disabled.
pub struct SqliteConnection {
    conn: PoolConnection<Sqlite>,
    id: Uuid,
    auto_commit: bool,
    in_tx: bool,
}

impl SqliteConnection {
    async fn ensure_transaction(&mut self) -> Result<()> {
        if !self.auto_commit && !self.in_tx {
            // IMMEDIATE takes the write lock up front; concurrent units of
            // work queue on the busy timeout instead of failing later on a
            // stale-snapshot upgrade
            sqlx::query("BEGIN IMMEDIATE").execute(&mut *self.conn).await?;
            self.in_tx = true;
        }
        Ok(())
    }
}

fn bind_params<'q>(
    sql: &'q str,
    params: &'q [SqlValue],
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::BigInt(v) => query.bind(*v),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "TEXT" => row
                .try_get::<Option<String>, _>(index)?
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null),
            "INTEGER" => row
                .try_get::<Option<i64>, _>(index)?
                .map(SqlValue::BigInt)
                .unwrap_or(SqlValue::Null),
            "NULL" => SqlValue::Null,
            other => {
                return Err(DbError::data_access_msg(format!(
                    "unsupported column type: {other}"
                )))
            }
        };
        values.push(value);
    }
    Ok(values)
}

#[async_trait]
impl Connection for SqliteConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.ensure_transaction().await?;
        let done = bind_params(sql, params)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| {
                tracing::error!(conn = %self.id, "execute failed: {e}");
                DbError::from(e)
            })?;
        Ok(done.rows_affected())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<Vec<SqlValue>>> {
        self.ensure_transaction().await?;
        let row = bind_params(sql, params)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| {
                tracing::error!(conn = %self.id, "query failed: {e}");
                DbError::from(e)
            })?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit == self.auto_commit {
            return Ok(());
        }
        if auto_commit && self.in_tx {
            // re-enabling auto-commit finishes the open unit of work
            sqlx::query("COMMIT").execute(&mut *self.conn).await?;
            self.in_tx = false;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            sqlx::query("COMMIT").execute(&mut *self.conn).await?;
            self.in_tx = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_tx {
            sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
            self.in_tx = false;
        }
        Ok(())
    }

    async fn is_valid(&mut self) -> bool {
        sqlx::query("SELECT 1").execute(&mut *self.conn).await.is_ok()
    }
}
