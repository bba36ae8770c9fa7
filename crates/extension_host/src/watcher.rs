// crates/extension_host/src/watcher.rs

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::HostError;

/// Signals whenever the extension library on disk is rewritten.
///
/// Watches the parent directory; build tools replace the library file rather
/// than writing into it.
pub struct LibraryWatcher {
    _watcher: RecommendedWatcher,
    changes: Receiver<()>,
}

impl LibraryWatcher {
    pub fn watch(library_path: &Path) -> Result<Self, HostError> {
        let file_name = library_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let dir = match library_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };

        let (tx, rx) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event, &file_name) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "file watcher error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %dir.display(), "watching for extension rebuilds");

        Ok(Self { _watcher: watcher, changes: rx })
    }

    /// Waits up to `timeout` for a change, then swallows any burst of
    /// follow-up events. `None` once the watcher has shut down.
    pub fn wait_for_change(&self, timeout: Duration) -> Option<bool> {
        match self.changes.recv_timeout(timeout) {
            Ok(()) => {
                while self.changes.try_recv().is_ok() {}
                Some(true)
            }
            Err(RecvTimeoutError::Timeout) => Some(false),
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
