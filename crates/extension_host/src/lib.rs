// crates/extension_host/src/lib.rs
//! Engine-side half of the bridge: loads the extension library, registers
//! its class callbacks, drives the session API and hot reloads on rebuild.

pub mod binding;
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod manager;
pub mod session_api;
pub mod watcher;

pub use binding::{CallFailure, ClassBinding};
pub use config::HostConfig;
pub use error::HostError;
pub use loader::{ExtensionLibrary, LoadError};
pub use manager::{ExtensionManager, RuntimeState};
pub use session_api::SessionApi;
pub use watcher::LibraryWatcher;

/// Serializes tests that touch the linked extension's global registry/session.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
