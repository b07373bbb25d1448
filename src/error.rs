//! Rich diagnostic error types for the benchmark harness.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the harness.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SimbenchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bench(#[from] BenchError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(simbench::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file: {path}")]
    #[diagnostic(
        code(simbench::config::write),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {message}")]
    #[diagnostic(
        code(simbench::config::parse),
        help(
            "The config file must be valid TOML. Known keys are `dimensions`, \
             `min_time_secs`, `threads`, `iterations`, `seed`, `fill`, `filter` and `format`."
        )
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(simbench::config::invalid),
        help("Adjust the offending value in the config file or on the command line.")
    )]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Benchmark engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum BenchError {
    #[error("invalid benchmark filter \"{filter}\": {message}")]
    #[diagnostic(
        code(simbench::bench::invalid_filter),
        help("The filter is a regular expression matched against benchmark names, e.g. `serial_f32_.*`.")
    )]
    InvalidFilter { filter: String, message: String },

    #[error("failed to match any benchmarks against regex: {filter}")]
    #[diagnostic(
        code(simbench::bench::no_match),
        help("Run with `--list` to see the registered benchmark names.")
    )]
    NoMatch { filter: String },

    #[error("failed to write benchmark report")]
    #[diagnostic(
        code(simbench::bench::report_io),
        help("Check that the output path is writable and the disk is not full.")
    )]
    Report {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize benchmark report: {message}")]
    #[diagnostic(code(simbench::bench::serialize))]
    Serialize { message: String },
}

impl From<std::io::Error> for BenchError {
    fn from(source: std::io::Error) -> Self {
        BenchError::Report { source }
    }
}

/// Result type for configuration handling.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type for the benchmark engine.
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Convenience alias for functions returning harness results.
pub type SimbenchResult<T> = std::result::Result<T, SimbenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err = ConfigError::Invalid {
            message: "dimensions must be > 0".into(),
        };
        let top: SimbenchError = err.into();
        assert!(matches!(top, SimbenchError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn io_error_becomes_report_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: BenchError = io.into();
        assert!(matches!(err, BenchError::Report { .. }));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = BenchError::NoMatch {
            filter: "avx512_.*".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("avx512_.*"));
    }
}
