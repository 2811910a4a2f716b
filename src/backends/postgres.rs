use std::str::FromStr;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::backend::{Connection, ConnectionProvider};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::value::SqlValue;

/// Connection provider backed by `deadpool-postgres`.
#[derive(Clone)]
pub struct PostgresProvider {
    pool: Pool,
    url: String,
}

impl PostgresProvider {
    /// Build a pool for the configured endpoint and warm it in the
    /// background.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pg_config = tokio_postgres::config::Config::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("invalid Postgres URL: {e}")))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.pool.max_size)
            .wait_timeout(Some(config.pool.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let provider = Self {
            pool,
            url: config.url.clone(),
        };
        if let Some(min_idle) = config.pool.min_idle {
            provider.warm(min_idle);
        }
        Ok(provider)
    }

    /// Pre-create up to `count` connections without blocking the caller
    fn warm(&self, count: usize) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut held = Vec::with_capacity(count);
            for _ in 0..count {
                match pool.get().await {
                    Ok(client) => held.push(client),
                    Err(e) => {
                        tracing::warn!("pool warm-up stopped early: {e}");
                        break;
                    }
                }
            }
            tracing::debug!(connections = held.len(), "pool warmed");
        });
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    type Connection = PostgresConnection;

    async fn acquire(&self) -> Result<PostgresConnection> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        let id = Uuid::new_v4();
        tracing::debug!(conn = %id, "connection acquired");
        Ok(PostgresConnection {
            client,
            id,
            auto_commit: true,
            in_tx: false,
        })
    }

    async fn release(&self, conn: PostgresConnection) -> Result<()> {
        tracing::debug!(conn = %conn.id, "connection released");
        // dropping the client returns it to the deadpool
        drop(conn);
        Ok(())
    }

    fn connection_string(&self) -> String {
        self.url.clone()
    }
}

/// A pooled Postgres session.
pub struct PostgresConnection {
    client: deadpool_postgres::Client,
    id: Uuid,
    auto_commit: bool,
    in_tx: bool,
}

impl PostgresConnection {
    async fn ensure_transaction(&mut self) -> Result<()> {
        if !self.auto_commit && !self.in_tx {
            self.client
                .batch_execute("BEGIN")
                .await
                .map_err(translate)?;
            self.in_tx = true;
        }
        Ok(())
    }
}

/// Rewrite `?` placeholders into the `$n` form the wire protocol expects.
/// Question marks inside string literals are left alone.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 4);
    let mut index = 0;
    let mut in_literal = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(ch);
            }
            '?' if !in_literal => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

fn to_sql_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Send + Sync>> {
    params
        .iter()
        .map(|param| match param {
            SqlValue::BigInt(v) => Box::new(*v) as Box<dyn ToSql + Send + Sync>,
            SqlValue::Text(s) => Box::new(s.clone()) as Box<dyn ToSql + Send + Sync>,
            SqlValue::Null => Box::new(Option::<String>::None) as Box<dyn ToSql + Send + Sync>,
        })
        .collect()
}

fn translate(error: tokio_postgres::Error) -> DbError {
    if let Some(db) = error.as_db_error() {
        if db.code() == &SqlState::UNIQUE_VIOLATION {
            return DbError::DuplicateKey(db.message().to_string());
        }
    }
    DbError::data_access("statement execution failed", error)
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(index)
                .map_err(translate)?
                .map(SqlValue::BigInt)
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(index)
                .map_err(translate)?
                .map(|v| SqlValue::BigInt(v as i64))
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(index)
                .map_err(translate)?
                .map(|v| SqlValue::BigInt(v as i64))
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
            row.try_get::<_, Option<String>>(index)
                .map_err(translate)?
                .map(SqlValue::Text)
        } else {
            return Err(DbError::data_access_msg(format!(
                "unsupported column type: {ty}"
            )));
        };
        values.push(value.unwrap_or(SqlValue::Null));
    }
    Ok(values)
}

#[async_trait]
impl Connection for PostgresConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.ensure_transaction().await?;
        let sql = numbered_placeholders(sql);
        let owned = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = owned
            .iter()
            .map(|p| {
                let r: &(dyn ToSql + Sync) = p.as_ref();
                r
            })
            .collect();
        self.client.execute(sql.as_str(), &refs).await.map_err(|e| {
            tracing::error!(conn = %self.id, "execute failed: {e}");
            translate(e)
        })
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<Vec<SqlValue>>> {
        self.ensure_transaction().await?;
        let sql = numbered_placeholders(sql);
        let owned = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = owned
            .iter()
            .map(|p| {
                let r: &(dyn ToSql + Sync) = p.as_ref();
                r
            })
            .collect();
        let row = self
            .client
            .query_opt(sql.as_str(), &refs)
            .await
            .map_err(|e| {
                tracing::error!(conn = %self.id, "query failed: {e}");
                translate(e)
            })?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit == self.auto_commit {
            return Ok(());
        }
        if auto_commit && self.in_tx {
            // re-enabling auto-commit finishes the open unit of work
            self.client
                .batch_execute("COMMIT")
                .await
                .map_err(translate)?;
            self.in_tx = false;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            self.client
                .batch_execute("COMMIT")
                .await
                .map_err(translate)?;
            self.in_tx = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_tx {
            self.client
                .batch_execute("ROLLBACK")
                .await
                .map_err(translate)?;
            self.in_tx = false;
        }
        Ok(())
    }

    async fn is_valid(&mut self) -> bool {
        self.client.simple_query("SELECT 1").await.is_ok()
    }
}
