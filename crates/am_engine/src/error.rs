use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while loading an acoustic model. All load
/// errors abort the load and surface to the caller.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt file {path}: {detail}")]
    CorruptFile { path: PathBuf, detail: String },

    #[error("unsupported version in {path}: expected {expected:?}, found {found:?}")]
    UnsupportedVersion {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("checksum mismatch in {path}: computed {computed:#010x}, stored {stored:#010x}")]
    ChecksumMismatch {
        path: PathBuf,
        computed: u32,
        stored: u32,
    },

    #[error("malformed model: {0}")]
    ModelMalformed(String),
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        ModelError::CorruptFile {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
