//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - quarry.toml (default configuration)
//! - quarry.local.toml (git-ignored local overrides)
//! - Environment variables (QUARRY_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # quarry.toml
//! [engine]
//! morsel_size = 10000
//! worker_threads = 4
//!
//! [optimizer]
//! disabled = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUARRY_ENGINE__MORSEL_SIZE=50000
//! QUARRY_OPTIMIZER__DISABLED=true
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target rows per morsel flowing between operators
    #[serde(default = "default_morsel_size")]
    pub morsel_size: usize,

    /// Workers evaluating stateless operator chains (0 = serial)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Capacity of the async reader's bounded morsel pool
    #[serde(default = "default_pool_capacity")]
    pub morsel_pool_capacity: usize,

    /// Retries before a failed pool commit is recorded as a stall
    #[serde(default = "default_commit_retries")]
    pub pool_commit_retries: usize,
}

/// Optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OptimizerConfig {
    /// When true, every plan passes through the optimizer unchanged
    #[serde(default)]
    pub disabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter directive, e.g. "quarry=debug"
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_morsel_size() -> usize {
    10_000
}

// one worker per core, capped at four
fn default_worker_threads() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_pool_capacity() -> usize {
    8
}

fn default_commit_retries() -> usize {
    10
}

fn default_log_filter() -> String {
    "quarry=info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            morsel_size: default_morsel_size(),
            worker_threads: default_worker_threads(),
            morsel_pool_capacity: default_pool_capacity(),
            pool_commit_retries: default_commit_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from quarry.toml, quarry.local.toml and
    /// QUARRY_* environment variables, in increasing precedence.
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Toml::file("quarry.toml"))
            .merge(Toml::file("quarry.local.toml"))
            .merge(Env::prefixed("QUARRY_").split("__"))
            .extract()
            .map_err(|e| Error::Programming(format!("configuration error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.engine.morsel_size, 10_000);
        assert!((1..=4).contains(&config.engine.worker_threads));
        assert!(!config.optimizer.disabled);
    }

    #[test]
    fn toml_roundtrip() {
        let config = Config::default();
        let rendered = toml::to_string(&config).expect("config should serialize");
        let parsed: Config = toml::from_str(&rendered).expect("config should parse");
        assert_eq!(parsed.engine.morsel_size, config.engine.morsel_size);
    }
}
