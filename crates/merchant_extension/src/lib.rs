// crates/merchant_extension/src/lib.rs
//! Native side of the Merchant Tails engine extension.
//!
//! `trampolines` holds the three class callbacks the engine registers. They
//! forward straight into `registry`, where the embedding layer installs the
//! real instance and method handlers. `session` and `exports` carry the flat
//! trading API the game scripts call directly.

pub mod entry;
pub mod exports;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod trampolines;

pub use session::{MerchantSession, SessionConfig, SessionError};

/// Serializes tests that touch the process-wide registry or session.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
