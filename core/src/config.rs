//! Miner configuration

use crate::MAX_NONCE;
use std::time::Duration;

/// Configuration for the proof-of-work miner
#[derive(Debug, Clone, PartialEq)]
pub struct MinerConfig {
    /// Worker threads; 1 searches nonces strictly in order
    pub threads: usize,
    /// Nonces claimed by a worker at a time
    pub batch_size: u64,
    /// Give up after this long, `None` searches until done
    pub timeout: Option<Duration>,
    /// Interval between hash-rate log lines
    pub stats_interval: Duration,
    /// Highest nonce tried, capped at `MAX_NONCE`
    pub nonce_limit: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: 10_000,
            timeout: None,
            stats_interval: Duration::from_secs(5),
            nonce_limit: MAX_NONCE,
        }
    }
}

impl MinerConfig {
    /// Checks the settings a search cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

/// Builder for miner configuration
#[derive(Debug, Default)]
pub struct MinerConfigBuilder {
    config: MinerConfig,
}

impl MinerConfigBuilder {
    /// Create new builder with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of worker threads
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set nonces per claimed batch
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set search deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval = interval;
        self
    }

    pub fn nonce_limit(mut self, limit: u64) -> Self {
        self.config.nonce_limit = limit.min(MAX_NONCE);
        self
    }

    /// Build the configuration
    pub fn build(self) -> MinerConfig {
        self.config
    }
}

/// Invalid miner configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Miner needs at least one thread")]
    ZeroThreads,
    #[error("Batch size must be positive")]
    ZeroBatchSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MinerConfig::default();

        assert_eq!(config.threads, 1);
        assert_eq!(config.timeout, None);
        assert_eq!(config.nonce_limit, MAX_NONCE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = MinerConfigBuilder::new()
            .threads(8)
            .batch_size(500)
            .timeout(Duration::from_secs(30))
            .nonce_limit(u64::MAX)
            .build();

        assert_eq!(config.threads, 8);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.nonce_limit, MAX_NONCE);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = MinerConfigBuilder::new().batch_size(0).build();
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
    }
}
