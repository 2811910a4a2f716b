#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnection, PostgresProvider};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteProvider};
