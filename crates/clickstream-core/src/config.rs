//! Configuration loading and typed config structures for the simulator.
//!
//! The configuration lives in `clickstream-config.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, a loader that
//! reads the file, and validation of the values the tick loop depends on.

use std::path::Path;
use std::time::Duration;

use clickstream_producer::ProducerConfig;
use serde::Deserialize;

use crate::worker::WorkerConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `clickstream-config.yaml`. Every field has a
/// default, so an empty document is valid apart from the sitemap source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClickstreamConfig {
    /// Population and timing parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Broker connection and buffering.
    #[serde(default)]
    pub producer: ProducerConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClickstreamConfig {
    /// Load configuration from the YAML file at `path`, falling back to
    /// defaults when the file does not exist, then apply environment
    /// overrides read through `lookup` and validate the result.
    ///
    /// Environment variables override YAML values:
    /// - `NATS_URL` overrides `producer.brokers` (comma-separated)
    /// - `SITEMAP_SOURCE` overrides `simulation.sitemap_source`
    /// - `CLICKSTREAM_WORKERS` overrides `simulation.num_workers`
    ///
    /// Returns the configuration and whether it was read from the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if an existing file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override cannot be parsed or a value
    /// is out of range.
    pub fn load<F>(path: &Path, lookup: F) -> Result<(Self, bool), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut config, from_file) = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            (Self::parse(&contents)?, true)
        } else {
            (Self::default(), false)
        };
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok((config, from_file))
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `CLICKSTREAM_WORKERS` is not a
    /// number.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("NATS_URL") {
            self.producer.brokers = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(val) = lookup("SITEMAP_SOURCE") {
            self.simulation.sitemap_source = val;
        }
        if let Some(val) = lookup("CLICKSTREAM_WORKERS") {
            self.simulation.num_workers = val.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("CLICKSTREAM_WORKERS must be a number: {e}"),
            })?;
        }
        Ok(())
    }

    /// Check the values the simulation depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_owned(),
            })
        };

        let sim = &self.simulation;
        if sim.max_users_per_worker == 0 {
            return invalid("simulation.max_users_per_worker must be at least 1");
        }
        if sim.tick_interval_ms == 0 {
            return invalid("simulation.tick_interval_ms must be at least 1");
        }
        if sim.tick_jitter_ms > sim.tick_interval_ms {
            return invalid("simulation.tick_jitter_ms must not exceed tick_interval_ms");
        }
        if self.producer.topic.trim().is_empty() {
            return invalid("producer.topic must not be empty");
        }
        if self.producer.brokers.iter().all(|b| b.trim().is_empty()) {
            return invalid("producer.brokers must name at least one broker");
        }
        Ok(())
    }

    /// Per-worker settings derived from this configuration.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            topic: self.producer.topic.clone(),
            max_users: self.simulation.max_users_per_worker,
            tick_interval: self.simulation.tick_interval(),
            tick_jitter: self.simulation.tick_jitter(),
            min_dwell: self.simulation.min_dwell(),
            max_ticks: self.simulation.max_ticks,
        }
    }
}

/// Population and timing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Number of parallel workers. `0` means one per available CPU.
    #[serde(default)]
    pub num_workers: usize,

    /// Population cap per worker.
    #[serde(default = "default_max_users_per_worker")]
    pub max_users_per_worker: usize,

    /// URL or file path of the sitemap describing the site.
    #[serde(default)]
    pub sitemap_source: String,

    /// Nominal milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum random deviation from `tick_interval_ms`, either way.
    #[serde(default = "default_tick_jitter_ms")]
    pub tick_jitter_ms: u64,

    /// Visitors only consider navigating after dwelling longer than this.
    #[serde(default = "default_min_dwell_ms")]
    pub min_dwell_ms: u64,

    /// Ticks each worker runs before stopping on its own (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Seed for all random draws. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            max_users_per_worker: default_max_users_per_worker(),
            sitemap_source: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            tick_jitter_ms: default_tick_jitter_ms(),
            min_dwell_ms: default_min_dwell_ms(),
            max_ticks: 0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Number of workers to start, resolving `0` to the available
    /// parallelism (or 1 if that cannot be determined).
    pub fn worker_count(&self) -> usize {
        if self.num_workers > 0 {
            return self.num_workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }

    /// Nominal tick interval.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Tick jitter bound.
    pub const fn tick_jitter(&self) -> Duration {
        Duration::from_millis(self.tick_jitter_ms)
    }

    /// Minimum dwell before navigation is considered.
    pub const fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_max_users_per_worker() -> usize {
    100
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_tick_jitter_ms() -> u64 {
    200
}

const fn default_min_dwell_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    String::from("info")
}
