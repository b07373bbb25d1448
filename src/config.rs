//! Harness configuration, persisted as TOML.
//!
//! Values come from three layers: built-in defaults, an optional config file
//! (`--config`), and command-line flags, each overriding the previous one.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::CaseSettings;
use crate::error::{ConfigError, ConfigResult};
use crate::pair::InputFill;

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned table on stdout.
    #[default]
    Console,
    /// One JSON document.
    Json,
}

/// Everything that shapes a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Elements per vector.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Minimum duration of each case's timed loop, in seconds.
    #[serde(default = "default_min_time_secs")]
    pub min_time_secs: f64,
    /// Threads per case.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Fixed iteration count per thread; overrides `min_time_secs`.
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Regex selecting which cases run.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
    /// Keep last: a `Constant` fill is written as a TOML table.
    #[serde(default)]
    pub fill: InputFill,
}

fn default_dimensions() -> usize {
    1536
}
fn default_min_time_secs() -> f64 {
    10.0
}
fn default_threads() -> usize {
    num_cpus::get()
}
fn default_seed() -> u64 {
    42
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            min_time_secs: default_min_time_secs(),
            threads: default_threads(),
            iterations: None,
            seed: default_seed(),
            fill: InputFill::default(),
            filter: None,
            format: OutputFormat::default(),
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.dimensions == 0 {
            return Err(invalid("dimensions must be greater than zero"));
        }
        if self.threads == 0 {
            return Err(invalid("threads must be greater than zero"));
        }
        if self.iterations == Some(0) {
            return Err(invalid("iterations must be greater than zero"));
        }
        self.min_time()?;
        if let InputFill::Constant(value) = self.fill {
            if !value.is_finite() {
                return Err(invalid(format!("constant fill must be finite, got {value}")));
            }
        }
        Ok(())
    }

    /// The minimum time as a `Duration`; negative, non-finite and
    /// out-of-range values are rejected.
    pub fn min_time(&self) -> ConfigResult<Duration> {
        Duration::try_from_secs_f64(self.min_time_secs).map_err(|e| {
            invalid(format!(
                "min_time_secs must be a non-negative number of seconds, got {}: {e}",
                self.min_time_secs
            ))
        })
    }

    /// Validate and convert into per-case settings.
    pub fn case_settings(&self) -> ConfigResult<CaseSettings> {
        self.validate()?;
        Ok(CaseSettings {
            dimensions: self.dimensions,
            min_time: self.min_time()?,
            threads: self.threads,
            iterations: self.iterations,
            fill: self.fill,
            seed: self.seed,
        })
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
