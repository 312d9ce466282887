use std::path::PathBuf;

use thiserror::Error;

/// Every fallible operation in the loader, merge engine, evaluator and
/// backend returns one of these. Each variant carries enough context to
/// format a standalone diagnostic line without a caller-side wrapper.
#[derive(Debug, Error)]
pub enum Error {
    #[error("out of memory while {context}")]
    NoMem { context: String },

    #[error("JSON error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("filesystem error resolving {path}: {message}")]
    Fs { path: PathBuf, message: String },

    #[error("{message}")]
    Gyp { message: String },

    #[error("expression error: {message}")]
    AstFatal { message: String },

    #[error("expression warning: {message}")]
    AstWarn { message: String },
}

impl Error {
    pub fn json(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Json {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn fs(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Fs {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn gyp(message: impl Into<String>) -> Self {
        Error::Gyp {
            message: message.into(),
        }
    }

    pub fn ast_fatal(message: impl Into<String>) -> Self {
        Error::AstFatal {
            message: message.into(),
        }
    }

    pub fn ast_warn(message: impl Into<String>) -> Self {
        Error::AstWarn {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
