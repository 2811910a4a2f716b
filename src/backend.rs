use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::value::SqlValue;

/// A single database session.
///
/// Sessions are handed out by a [`ConnectionProvider`] and must be given
/// back exactly once. Every acquisition carries its own identity so callers
/// can observe whether two operations ran on the same session.
#[async_trait]
pub trait Connection: Send {
    /// Identity assigned when the connection was acquired
    fn id(&self) -> Uuid;

    /// Execute a parameterized statement, returning the affected row count
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute a parameterized query expected to match at most one row.
    /// Decoded values come back in select-list order.
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<Vec<SqlValue>>>;

    /// Toggle manual-commit mode. Disabling opens a unit of work on this
    /// session; re-enabling finishes any work still open.
    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    /// Commit the open unit of work
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open unit of work
    async fn rollback(&mut self) -> Result<()>;

    /// Check if the connection is valid
    async fn is_valid(&mut self) -> bool;
}

/// A source of database connections, pooled or direct.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + Clone + 'static {
    /// The type of connection this provider hands out
    type Connection: Connection + 'static;

    /// Acquire a connection, waiting up to the configured timeout
    async fn acquire(&self) -> Result<Self::Connection>;

    /// Release a connection back to the provider
    async fn release(&self, conn: Self::Connection) -> Result<()>;

    /// Get the connection string this provider points at
    fn connection_string(&self) -> String;
}
