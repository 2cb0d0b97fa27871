//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("Unknown log format '{}'", other)),
        }
    }
}

/// Main worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Database URL.
    pub database_url: String,
    /// Pool size.
    pub db_max_connections: u32,
    /// Pause between recalculation passes.
    pub recompute_interval: Duration,
    /// Pending transactions examined per pass.
    pub recompute_batch_size: usize,
    /// How long looked-up market rates are reused.
    pub rate_cache_ttl: Duration,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/sarafi".to_string(),
            db_max_connections: 5,
            recompute_interval: Duration::from_secs(60),
            recompute_batch_size: 500,
            rate_cache_ttl: Duration::from_secs(30),
            log_format: LogFormat::Json,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(max) = std::env::var("SARAFI_DB_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.db_max_connections = max;
            }
        }

        if let Ok(secs) = std::env::var("SARAFI_RECOMPUTE_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.recompute_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(size) = std::env::var("SARAFI_RECOMPUTE_BATCH_SIZE") {
            if let Ok(size) = size.parse() {
                config.recompute_batch_size = size;
            }
        }

        if let Ok(secs) = std::env::var("SARAFI_RATE_CACHE_TTL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.rate_cache_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(format) = std::env::var("SARAFI_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                config.log_format = format;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.db_max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        if self.recompute_interval.is_zero() {
            return Err("Recompute interval cannot be 0".to_string());
        }

        if self.recompute_batch_size == 0 {
            return Err("Recompute batch size cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = WorkerConfig::default();
        config.recompute_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.recompute_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
