//! Configuration for the harvest pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::PipelineOptions;
use crate::retry::RetryPolicy;

/// Configuration for the external lookup service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP endpoint accepting a batch of identifiers.
    pub endpoint: String,
}

/// Main configuration for harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the input file, one identifier per line.
    pub input_path: String,
    /// Directory for the checkpoint and result artifacts.
    pub output_dir: String,
    /// External service configuration.
    #[serde(default)]
    pub service: Option<ServiceConfig>,
    /// Optional path to the per-item result cache file.
    #[serde(default)]
    pub cache_path: Option<String>,
    /// Items per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum attempts per batch.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay between attempts on the same batch, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Pacing delay between batches, in seconds.
    #[serde(default = "default_batch_delay")]
    pub batch_delay_secs: u64,
    /// Batches between checkpoint flushes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_batches: usize,
    /// Directory for the failure artifact (DLQ); defaults to `output_dir`.
    #[serde(default)]
    pub dlq_path: Option<String>,
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_batch_delay() -> u64 {
    3
}

fn default_flush_interval() -> usize {
    10
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_path.is_empty() {
            return Err(ConfigError::EmptyInputPath);
        }
        if self.output_dir.is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.flush_interval_batches == 0 {
            return Err(ConfigError::ZeroFlushInterval);
        }
        Ok(())
    }

    /// Pipeline options derived from this configuration.
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            flush_interval_batches: self.flush_interval_batches,
            policy: RetryPolicy {
                max_attempts: self.max_attempts,
                retry_delay: Duration::from_secs(self.retry_delay_secs),
                batch_delay: Duration::from_secs(self.batch_delay_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_applies_defaults() {
        let config = Config::parse(
            "input_path: pmids.txt\n\
             output_dir: out\n",
        )
        .unwrap();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay_secs, 5);
        assert_eq!(config.batch_delay_secs, 3);
        assert_eq!(config.flush_interval_batches, 10);
        assert!(config.service.is_none());
        assert!(config.dlq_path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            "input_path: pmids.txt\n\
             output_dir: out\n\
             service:\n  endpoint: http://localhost:8080/fetch\n\
             cache_path: out/cache.json\n\
             batch_size: 25\n\
             max_attempts: 5\n\
             retry_delay_secs: 1\n\
             batch_delay_secs: 0\n\
             flush_interval_batches: 2\n\
             dlq_path: out/dlq\n",
        )
        .unwrap();

        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(
            config.service.as_ref().unwrap().endpoint,
            "http://localhost:8080/fetch"
        );

        let options = config.options();
        assert_eq!(options.policy.retry_delay, Duration::from_secs(1));
        assert_eq!(options.policy.batch_delay, Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let result = Config::parse("input_path: \"\"\noutput_dir: out\n");
        assert!(matches!(result, Err(ConfigError::EmptyInputPath)));

        let result = Config::parse("input_path: pmids.txt\noutput_dir: \"\"\n");
        assert!(matches!(result, Err(ConfigError::EmptyOutputDir)));
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let result = Config::parse("input_path: a\noutput_dir: b\nbatch_size: 0\n");
        assert!(matches!(result, Err(ConfigError::ZeroBatchSize)));

        let result = Config::parse("input_path: a\noutput_dir: b\nmax_attempts: 0\n");
        assert!(matches!(result, Err(ConfigError::ZeroMaxAttempts)));
    }
}
