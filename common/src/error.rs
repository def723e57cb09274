use std::path::PathBuf;
use thiserror::Error;

/// A start-time string that could not be turned into a UTC instant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected YY:MM:DD:HH:MM:SS, got {0:?}")]
    Format(String),

    #[error("invalid field {field:?} in {input:?}")]
    Field { input: String, field: String },

    #[error("date or time out of range in {0:?}")]
    OutOfRange(String),
}

/// Failure of an external command.
///
/// `Launch` is the subprocess-launch error kind, `Failed` is what a
/// status-registry call reports when the tool exits non-zero.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config file format {0:?}, use .yaml, .yml, or .toml")]
    Format(PathBuf),

    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },
}
