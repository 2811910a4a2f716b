//! Account persistence over the bound-or-fresh connection discipline.

use crate::backend::{Connection, ConnectionProvider};
use crate::context::TransactionContext;
use crate::error::{DbError, Result};
use crate::value::SqlValue;
use crate::BoxFuture;

/// A row of the `account` table: an identifier and its current balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub balance: i64,
}

impl Account {
    pub fn new(id: impl Into<String>, balance: i64) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    fn from_row(values: Vec<SqlValue>) -> Result<Self> {
        match <[SqlValue; 2]>::try_from(values) {
            Ok([SqlValue::Text(id), SqlValue::BigInt(balance)]) => Ok(Self { id, balance }),
            _ => Err(DbError::data_access_msg("unexpected row shape for account")),
        }
    }
}

/// Executes account SQL against the connection bound to the active unit of
/// work, or against a one-off connection when none is bound.
///
/// All statements bind parameters through [`SqlValue`]; SQL text is never
/// assembled from caller input.
#[derive(Debug, Clone)]
pub struct AccountRepository<P> {
    provider: P,
}

impl<P: ConnectionProvider> AccountRepository<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Insert a new account row
    pub async fn save(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        account: &Account,
    ) -> Result<()> {
        let id = account.id.clone();
        let balance = account.balance;
        self.with_connection(ctx, move |conn| {
            Box::pin(async move {
                conn.execute(
                    "INSERT INTO account (account_id, balance) VALUES (?, ?)",
                    &[SqlValue::Text(id), SqlValue::BigInt(balance)],
                )
                .await?;
                Ok(())
            })
        })
        .await
    }

    /// Look up one account.
    ///
    /// Fails with [`DbError::NotFound`] when the id matches no row; a
    /// missing account is never reported as an empty success.
    pub async fn find_by_id(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        id: &str,
    ) -> Result<Account> {
        let key = id.to_string();
        self.with_connection(ctx, move |conn| {
            Box::pin(async move {
                let row = conn
                    .fetch_optional(
                        "SELECT account_id, balance FROM account WHERE account_id = ?",
                        &[SqlValue::Text(key.clone())],
                    )
                    .await?;
                match row {
                    Some(values) => Account::from_row(values),
                    None => Err(DbError::NotFound(key)),
                }
            })
        })
        .await
    }

    /// Set an account's balance
    pub async fn update(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        id: &str,
        balance: i64,
    ) -> Result<()> {
        let key = id.to_string();
        self.with_connection(ctx, move |conn| {
            Box::pin(async move {
                let updated = conn
                    .execute(
                        "UPDATE account SET balance = ? WHERE account_id = ?",
                        &[SqlValue::BigInt(balance), SqlValue::Text(key)],
                    )
                    .await?;
                tracing::debug!(rows = updated, "account update");
                Ok(())
            })
        })
        .await
    }

    /// Remove an account row
    pub async fn delete(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        id: &str,
    ) -> Result<()> {
        let key = id.to_string();
        self.with_connection(ctx, move |conn| {
            Box::pin(async move {
                conn.execute(
                    "DELETE FROM account WHERE account_id = ?",
                    &[SqlValue::Text(key)],
                )
                .await?;
                Ok(())
            })
        })
        .await
    }

    /// Run `op` on the bound connection, or on a one-off connection that is
    /// released exactly once when the operation finishes, on success and on
    /// error alike.
    async fn with_connection<T, F>(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        op: F,
    ) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut P::Connection) -> BoxFuture<'c, T, DbError> + Send,
        T: Send,
    {
        match ctx.current() {
            Some(conn) => op(conn).await,
            None => {
                let mut conn = self.provider.acquire().await?;
                tracing::debug!(conn = %conn.id(), "no active unit of work, using one-off connection");
                let result = op(&mut conn).await;
                match self.provider.release(conn).await {
                    Ok(()) => result,
                    Err(release_err) => result.and(Err(release_err)),
                }
            }
        }
    }
}
