use thiserror::Error;

/// Error type for connection, transaction and data-access operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to reach the database or to obtain a pooled connection
    #[error("Failed to acquire connection: {0}")]
    Connection(String),

    /// A statement failed to execute; the driver error rides along as the source
    #[error("Data access failure: {message}")]
    DataAccess {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A unique key was violated
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A lookup matched zero rows
    #[error("No row found for id: {0}")]
    NotFound(String),

    /// A business rule rejected the operation
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// A connection is already bound to the current unit of work
    #[error("A connection is already bound to the current unit of work")]
    AlreadyBound,

    /// No connection is bound to the current unit of work
    #[error("No connection is bound to the current unit of work")]
    NotBound,

    /// A participant demanded rollback, so the owning commit rolled back instead
    #[error("Transaction rolled back because a participant demanded rollback")]
    RollbackOnly,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Wrap a driver error as a data-access failure
    pub fn data_access<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DbError::DataAccess {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A data-access failure with no underlying driver error
    pub fn data_access_msg(message: impl Into<String>) -> Self {
        DbError::DataAccess {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => {
                DbError::Connection("timed out waiting for a pooled connection".into())
            }
            sqlx::Error::PoolClosed => DbError::Connection("connection pool is closed".into()),
            sqlx::Error::Io(e) => DbError::Connection(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::DuplicateKey(db.message().to_string())
            }
            other => DbError::data_access("statement execution failed", other),
        }
    }
}

/// Result type for all database operations
pub type Result<T> = std::result::Result<T, DbError>;
