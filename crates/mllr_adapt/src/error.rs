use std::path::PathBuf;
use thiserror::Error;

use crate::adapter::AdapterState;

/// Adaptation-side failures. Degenerate regression classes are not errors;
/// they are reported through `SolveReport` and fall back to the identity.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error(transparent)]
    Model(#[from] am_engine::ModelError),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt transform file {path}: {detail}")]
    CorruptFile { path: PathBuf, detail: String },

    #[error("{operation} is not valid in the {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: AdapterState,
    },

    #[error("mismatch: {0}")]
    Mismatch(String),
}

impl AdaptError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AdaptError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        AdaptError::CorruptFile {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
