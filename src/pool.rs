use std::time::Duration;

/// Configuration for a connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Minimum number of idle connections to maintain; pools warm up to this
    /// count in the background without blocking callers
    pub min_idle: Option<usize>,
    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,
    /// Maximum time to wait for a connection before the acquisition fails
    pub acquire_timeout: Duration,
    /// Maximum time a connection can be idle
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: None,
            max_lifetime: Some(Duration::from_secs(30 * 60)), // 30 minutes
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(10 * 60)), // 10 minutes
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    /// Set the minimum number of idle connections
    pub fn min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = Some(min_idle);
        self
    }

    /// Set the maximum lifetime of a connection
    pub fn max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = Some(max_lifetime);
        self
    }

    /// Set the acquisition timeout
    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.min_idle, None);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn setters_chain() {
        let config = PoolConfig::new(2)
            .min_idle(1)
            .acquire_timeout(Duration::from_millis(250));
        assert_eq!(config.max_size, 2);
        assert_eq!(config.min_idle, Some(1));
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
    }
}
