#![allow(dead_code)]

use db_txkit::backends::sqlite::SqliteProvider;
use db_txkit::prelude::*;

/// Throwaway SQLite database with the account schema in place.
pub async fn provider() -> SqliteProvider {
    let provider = SqliteProvider::temporary()
        .await
        .expect("temporary database");
    create_schema(&provider).await;
    provider
}

/// Throwaway database with custom pool settings.
pub async fn provider_with(pool: PoolConfig) -> SqliteProvider {
    let provider = SqliteProvider::temporary_with(pool)
        .await
        .expect("temporary database");
    create_schema(&provider).await;
    provider
}

pub async fn create_schema(provider: &SqliteProvider) {
    let mut conn = provider.acquire().await.expect("schema connection");
    conn.execute(
        "CREATE TABLE account (account_id TEXT PRIMARY KEY, balance INTEGER NOT NULL)",
        &[],
    )
    .await
    .expect("create table");
    provider
        .release(conn)
        .await
        .expect("release schema connection");
}

pub async fn seed(provider: &SqliteProvider, accounts: &[(&str, i64)]) {
    let repository = AccountRepository::new(provider.clone());
    let mut ctx = TransactionContext::new();
    for (id, balance) in accounts {
        repository
            .save(&mut ctx, &Account::new(*id, *balance))
            .await
            .expect("seed account");
    }
}

pub async fn balance_of(provider: &SqliteProvider, id: &str) -> i64 {
    let repository = AccountRepository::new(provider.clone());
    let mut ctx = TransactionContext::new();
    repository
        .find_by_id(&mut ctx, id)
        .await
        .expect("account exists")
        .balance
}
