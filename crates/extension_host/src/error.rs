// crates/extension_host/src/error.rs
use std::ffi::NulError;
use std::path::PathBuf;

use bridge_shared::FfiResult;
use thiserror::Error;

use crate::loader::LoadError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("extension rejected `{op}`")]
    Rejected { op: &'static str },

    #[error("extension returned a null string from `{op}`")]
    NullString { op: &'static str },

    #[error("argument contains an interior NUL: {0}")]
    InvalidString(#[from] NulError),

    #[error("extension returned malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state transfer `{op}` failed with {result:?}")]
    Transfer { op: &'static str, result: FfiResult },

    #[error("could not read config {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("file watcher failed: {0}")]
    Watch(#[from] notify::Error),
}
