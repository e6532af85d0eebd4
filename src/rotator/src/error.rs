use common::config::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::MAX_ROTATION_SUFFIX;
use crate::pattern::PatternError;

/// Startup and serving failures of the rotator.
#[derive(Error, Debug)]
pub enum RotatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, RotatorError>;

/// Failure to rotate a single file.
#[derive(Error, Debug)]
pub enum RotateError {
    #[error(
        "Too many rotations for {}: suffixes 1 to {} are taken",
        path.display(),
        MAX_ROTATION_SUFFIX
    )]
    SuffixExhausted { path: PathBuf },

    #[error("Failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RotateError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| RotateError::Io { op, path, source }
    }
}

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to encode journal: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write journal {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
