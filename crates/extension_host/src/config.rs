// crates/extension_host/src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Host settings, read from a TOML file. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Extension library as produced by the build; the host loads a copy.
    pub library_path: PathBuf,
    /// Reload the extension whenever `library_path` changes.
    pub watch: bool,
    pub reload_debounce_ms: u64,
    /// `tracing` filter directives, overridden by `RUST_LOG`.
    pub log_filter: String,
    /// Exported to the extension as `MERCHANT_SAVE_DIR` before it initializes.
    pub save_dir: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            library_path: default_library_path(),
            watch: false,
            reload_debounce_ms: 500,
            log_filter: "info".to_string(),
            save_dir: None,
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let text = fs::read_to_string(path).map_err(|source| HostError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| HostError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// `path` if given, otherwise `bridge_host.toml` when present, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, HostError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new("bridge_host.toml");
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }
}

/// `target/debug/<prefix>merchant_extension<suffix>` for the current platform.
pub fn default_library_path() -> PathBuf {
    PathBuf::from("target/debug").join(format!(
        "{}merchant_extension{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    ))
}
