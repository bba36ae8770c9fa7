// crates/extension_host/src/loader.rs

use std::ffi::{c_char, CString, OsStr};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use libloading::Library;
use thiserror::Error;

use bridge_shared::{ClassCallbacks, FfiResult, BRIDGE_API_VERSION, CURRENT_LAYOUT_HASH};

use crate::error::HostError;
use crate::session_api::SessionApi;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("extension library not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("could not stage a copy of {}: {source}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not open extension library: {0}")]
    Open(#[source] libloading::Error),
    #[error("extension does not export `{name}`: {source}")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("extension API version {found} does not match host version {expected}")]
    ApiVersion { found: u32, expected: u32 },
    #[error("extension layout hash {found:#018x} does not match host {expected:#018x}")]
    LayoutHash { found: u64, expected: u64 },
}

/// Copies a function pointer out of `lib`. The pointer is only valid while
/// `lib` stays loaded.
pub(crate) unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, LoadError> {
    lib.get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|source| LoadError::MissingSymbol { name, source })
}

/// A loaded, handshake-checked copy of the extension library.
pub struct ExtensionLibrary {
    callbacks: ClassCallbacks,
    install_handler: unsafe extern "C" fn(*const ClassCallbacks) -> FfiResult,
    uninstall_handler: unsafe extern "C" fn(),
    init_logging: unsafe extern "C" fn(*const c_char) -> FfiResult,
    session: SessionApi,
    staged_path: PathBuf,
    // Declared last: every pointer above borrows from it.
    lib: Library,
}

impl ExtensionLibrary {
    /// Stages a copy of `path` so the original can be rebuilt while loaded,
    /// opens it and checks the ABI handshake.
    ///
    /// # Safety
    /// Loading runs the library's initializers. `path` must be a build of
    /// `merchant_extension`.
    pub unsafe fn load(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let staged_path = unique_copy_path(path);
        fs::copy(path, &staged_path).map_err(|source| LoadError::Stage {
            path: path.to_path_buf(),
            source,
        })?;

        match Self::open(&staged_path) {
            Ok(lib) => {
                tracing::info!(source = %path.display(), staged = %staged_path.display(), "extension loaded");
                Ok(lib)
            }
            Err(err) => {
                let _ = fs::remove_file(&staged_path);
                Err(err)
            }
        }
    }

    unsafe fn open(staged_path: &Path) -> Result<Self, LoadError> {
        let lib = Library::new(staged_path).map_err(LoadError::Open)?;

        let api_version: unsafe extern "C" fn() -> u32 = symbol(&lib, "merchant_bridge_api_version")?;
        let found = api_version();
        if found != BRIDGE_API_VERSION {
            return Err(LoadError::ApiVersion { found, expected: BRIDGE_API_VERSION });
        }

        let layout_hash: unsafe extern "C" fn() -> u64 = symbol(&lib, "merchant_bridge_layout_hash")?;
        let found = layout_hash();
        if found != CURRENT_LAYOUT_HASH {
            return Err(LoadError::LayoutHash { found, expected: CURRENT_LAYOUT_HASH });
        }

        let class_callbacks: unsafe extern "C" fn() -> ClassCallbacks =
            symbol(&lib, "merchant_bridge_class_callbacks")?;

        Ok(Self {
            callbacks: class_callbacks(),
            install_handler: symbol(&lib, "merchant_bridge_install_handler")?,
            uninstall_handler: symbol(&lib, "merchant_bridge_uninstall_handler")?,
            init_logging: symbol(&lib, "merchant_bridge_init_logging")?,
            session: SessionApi::resolve(&lib)?,
            staged_path: staged_path.to_path_buf(),
            lib,
        })
    }

    /// The extension's trampolines, for class registration.
    pub fn callbacks(&self) -> ClassCallbacks {
        self.callbacks
    }

    pub fn session(&self) -> &SessionApi {
        &self.session
    }

    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    /// Hands the embedding layer's handlers to the extension.
    ///
    /// # Safety
    /// The functions in `table` must outlive their installation.
    pub unsafe fn install_handler(&self, table: &ClassCallbacks) -> Result<(), HostError> {
        match (self.install_handler)(table) {
            FfiResult::Success => Ok(()),
            _ => Err(HostError::Rejected { op: "install_handler" }),
        }
    }

    pub fn uninstall_handler(&self) {
        unsafe { (self.uninstall_handler)() }
    }

    /// Starts the extension's own log output with `filter`.
    pub fn init_logging(&self, filter: &str) -> Result<(), HostError> {
        let filter = CString::new(filter)?;
        if unsafe { (self.init_logging)(filter.as_ptr()) } != FfiResult::Success {
            tracing::debug!("extension logging was already initialized");
        }
        Ok(())
    }

    /// Closes the library, then deletes its staged copy.
    pub fn unload(self) {
        let staged_path = self.staged_path;
        drop(self.lib);
        if let Err(err) = fs::remove_file(&staged_path) {
            tracing::warn!(path = %staged_path.display(), error = %err, "could not delete staged library");
        }
    }
}

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `<stem>_loaded_<millis>_<n>.<ext>` next to `original`.
pub(crate) fn unique_copy_path(original: &Path) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let n = STAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = original
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("extension");
    let ext = original
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or(std::env::consts::DLL_EXTENSION);
    original.with_file_name(format!("{stem}_loaded_{ts}_{n}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_copies_never_collide() {
        let original = Path::new("target/debug/libmerchant_extension.so");
        let a = unique_copy_path(original);
        let b = unique_copy_path(original);

        assert_ne!(a, b);
        assert_eq!(a.parent(), original.parent());
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("libmerchant_extension_loaded_"));
        assert!(name.ends_with(".so"));
    }

    #[test]
    fn missing_library_is_reported() {
        let err = unsafe { ExtensionLibrary::load(Path::new("/no/such/libmerchant.so")) }
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn non_library_file_fails_to_open_and_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("libfake.so");
        fs::write(&fake, b"not a shared object").unwrap();

        let err = unsafe { ExtensionLibrary::load(&fake) }.err().unwrap();
        assert!(matches!(err, LoadError::Open(_)));

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
