pub use crate::backend::{Connection, ConnectionProvider};
#[cfg(feature = "postgres")]
pub use crate::backends::PostgresProvider;
#[cfg(feature = "sqlite")]
pub use crate::backends::SqliteProvider;
pub use crate::config::DbConfig;
pub use crate::context::TransactionContext;
pub use crate::error::{DbError, Result};
pub use crate::manager::{TransactionHandle, TransactionManager};
pub use crate::pool::PoolConfig;
pub use crate::repository::{Account, AccountRepository};
pub use crate::service::TransferService;
pub use crate::value::SqlValue;
