use std::sync::OnceLock;

use url::Url;

use crate::error::{DbError, Result};
use crate::pool::PoolConfig;

/// A static cell that ensures environment variables are loaded only once
static ENV_LOADED: OnceLock<()> = OnceLock::new();

fn load_env() {
    ENV_LOADED.get_or_init(|| {
        dotenvy::dotenv().ok();
    });
}

/// Connection endpoint and pool settings for a database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database URL, credentials included
    pub url: String,
    /// Pool sizing and timeout settings
    pub pool: PoolConfig,
}

impl DbConfig {
    /// Create a config for the given URL with default pool settings.
    ///
    /// The URL is validated up front so a bad endpoint fails at
    /// configuration time rather than on first acquire.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Url::parse(&url).map_err(|e| DbError::Config(format!("invalid database URL: {e}")))?;
        Ok(Self {
            url,
            pool: PoolConfig::default(),
        })
    }

    /// Replace the pool settings
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Read the database URL from the `DATABASE_URL` environment variable,
    /// loading a `.env` file first if one is present.
    pub fn from_env() -> Result<Self> {
        load_env();
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DbError::Config("DATABASE_URL environment variable not found".into()))?;
        Self::new(url)
    }
}
