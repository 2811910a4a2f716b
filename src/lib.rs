//! Connection management and transaction propagation for SQL databases.
//!
//! The crate is built around four pieces:
//! - a [`ConnectionProvider`] hands out pooled connections;
//! - a [`TransactionContext`] binds one connection to one logical unit of
//!   work so nested repository calls share it;
//! - a [`TransactionManager`] begins, commits and rolls back units of work,
//!   with owner/participant semantics for nested use and the closure-based
//!   [`TransactionManager::in_transaction`] wrapper;
//! - an [`AccountRepository`] and [`TransferService`] exercise the machinery
//!   end to end.

pub mod backend;
pub mod backends;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod pool;
pub mod repository;
pub mod service;
pub mod tracing;
pub mod value;

pub mod prelude;

pub use backend::{Connection, ConnectionProvider};
#[cfg(feature = "postgres")]
pub use backends::PostgresProvider;
#[cfg(feature = "sqlite")]
pub use backends::SqliteProvider;
pub use config::DbConfig;
pub use context::TransactionContext;
pub use error::{DbError, Result};
pub use manager::{TransactionHandle, TransactionManager};
pub use pool::PoolConfig;
pub use repository::{Account, AccountRepository};
pub use service::{TransferService, TransferValidator};
pub use value::SqlValue;

pub use self::tracing::init_tracing;

use std::future::Future;

/// A boxed future that resolves to a Result
pub type BoxFuture<'a, T, E> =
    std::pin::Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 'a>>;
