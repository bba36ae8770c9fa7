// crates/extension_host/src/manager.rs

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bridge_shared::{ClassCallbacks, ClassTag};

use crate::binding::ClassBinding;
use crate::config::HostConfig;
use crate::error::HostError;
use crate::loader::ExtensionLibrary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    Running,
    /// The last reload did not complete. The session is intact and the next
    /// reload carries it over.
    ReloadFailed(String),
    /// The session could not be started, so there is nothing to carry.
    PausedError(String),
}

/// Drops requests that arrive within `window` of the last accepted one.
#[derive(Debug)]
pub struct Debounce {
    last: Option<Instant>,
    window: Duration,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { last: None, window }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.duration_since(last) < self.window {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Owns the loaded extension and swaps it for a fresh build on request,
/// carrying the trading session and the installed handler across.
pub struct ExtensionManager {
    library: ExtensionLibrary,
    pub runtime_state: RuntimeState,
    source_path: PathBuf,
    log_filter: String,
    handler: Option<ClassCallbacks>,
    debounce: Debounce,
}

impl ExtensionManager {
    /// Loads the library named by `config` and starts its session.
    pub fn start(config: &HostConfig) -> Result<Self, HostError> {
        if let Some(dir) = &config.save_dir {
            std::env::set_var("MERCHANT_SAVE_DIR", dir);
        }

        let library = unsafe { ExtensionLibrary::load(&config.library_path)? };
        library.init_logging(&config.log_filter)?;
        library.session().init()?;

        Ok(Self {
            library,
            runtime_state: RuntimeState::Running,
            source_path: config.library_path.clone(),
            log_filter: config.log_filter.clone(),
            handler: None,
            debounce: Debounce::new(config.reload_debounce()),
        })
    }

    pub fn library(&self) -> &ExtensionLibrary {
        &self.library
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Installs `table` now and again after every reload.
    ///
    /// # Safety
    /// The functions in `table` must stay callable for the manager's lifetime.
    pub unsafe fn bind_handler(&mut self, table: ClassCallbacks) -> Result<(), HostError> {
        self.library.install_handler(&table)?;
        self.handler = Some(table);
        Ok(())
    }

    pub fn unbind_handler(&mut self) {
        self.library.uninstall_handler();
        self.handler = None;
    }

    /// A class registered against the current library's trampolines.
    /// Re-fetch after a reload.
    pub fn class_binding(&self, name: &str, class_userdata: *mut ClassTag) -> ClassBinding {
        ClassBinding::new(name, self.library.callbacks(), class_userdata)
    }

    /// Loads the library from disk again. Returns whether the swap happened.
    ///
    /// A rejected build leaves the old library serving and the manager in
    /// `ReloadFailed`.
    pub fn try_hot_reload(&mut self) -> bool {
        if !self.debounce.ready(Instant::now()) {
            return false;
        }
        tracing::info!(path = %self.source_path.display(), "hot reload requested");

        // 1. LOAD NEW
        let new_library = match unsafe { ExtensionLibrary::load(&self.source_path) } {
            Ok(lib) => lib,
            Err(err) => {
                tracing::error!(error = %err, "failed to load rebuilt extension");
                self.runtime_state = RuntimeState::ReloadFailed(format!("Failed to load new extension: {err}"));
                return false;
            }
        };
        if let Err(err) = new_library.init_logging(&self.log_filter) {
            tracing::warn!(error = %err, "could not start extension logging");
        }

        // 2. SAVE STATE
        let snapshot = match self.runtime_state {
            RuntimeState::Running | RuntimeState::ReloadFailed(_) => match self.library.session().snapshot() {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(error = %err, "session snapshot failed; reloading with a fresh session");
                    None
                }
            },
            RuntimeState::PausedError(_) => None,
        };

        // 3. SWAP
        self.library.uninstall_handler();
        let old = std::mem::replace(&mut self.library, new_library);
        tracing::debug!(
            old = %old.staged_path().display(),
            new = %self.library.staged_path().display(),
            "swapped extension copies"
        );
        old.unload();

        // 4. RESTORE STATE
        if let Err(err) = self.library.session().init() {
            self.runtime_state = RuntimeState::PausedError(format!("Session init failed: {err}"));
            return false;
        }
        if let Some(mut bytes) = snapshot {
            match self.library.session().restore(&mut bytes) {
                Ok(()) => tracing::info!("session restored"),
                Err(err) => tracing::warn!(error = %err, "session restore failed; using a fresh session"),
            }
        }

        // 5. REBIND HANDLER
        if let Some(table) = self.handler {
            if let Err(err) = unsafe { self.library.install_handler(&table) } {
                self.runtime_state = RuntimeState::ReloadFailed(format!("Handler rebind failed: {err}"));
                return false;
            }
        }

        self.runtime_state = RuntimeState::Running;
        true
    }

    /// Terminates the session (autosaving it) and unloads the library.
    pub fn shutdown(self) {
        self.library.uninstall_handler();
        self.library.session().terminate();
        self.library.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_lock;
    use bridge_shared::{ArgCount, CallError, ClassInstance, MethodTag, Variant};
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CREATES: AtomicUsize = AtomicUsize::new(0);
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count_create(_class_userdata: *mut ClassTag) -> *mut ClassInstance {
        CREATES.fetch_add(1, Ordering::SeqCst);
        std::ptr::null_mut()
    }

    unsafe extern "C" fn ignore_free(_class_userdata: *mut ClassTag, _instance: *mut ClassInstance) {}

    unsafe extern "C" fn count_call(
        _method_userdata: *mut MethodTag,
        _instance: *mut ClassInstance,
        _args: *const *const Variant,
        _arg_count: ArgCount,
        _ret: *mut Variant,
        error: *mut CallError,
    ) {
        CALLS.fetch_add(1, Ordering::SeqCst);
        if !error.is_null() {
            *error = CallError::OK;
        }
    }

    fn counting_handler() -> ClassCallbacks {
        ClassCallbacks {
            create_instance: count_create,
            free_instance: ignore_free,
            call_method: count_call,
        }
    }

    /// Copies the `merchant_extension` cdylib cargo built alongside this test
    /// binary into `dir`. `None` when no build is present.
    fn extension_in(dir: &Path) -> Option<PathBuf> {
        let deps = std::env::current_exe().ok()?.parent()?.to_path_buf();
        let name = format!("{DLL_PREFIX}merchant_extension{DLL_SUFFIX}");

        let mut candidates = vec![deps.join(&name)];
        if let Some(profile) = deps.parent() {
            candidates.push(profile.join(&name));
        }
        // Dependency builds carry a metadata hash in the file name.
        if let Ok(entries) = fs::read_dir(&deps) {
            candidates.extend(entries.filter_map(Result::ok).map(|e| e.path()).filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| {
                        n.starts_with(&format!("{DLL_PREFIX}merchant_extension-")) && n.ends_with(DLL_SUFFIX)
                    })
            }));
        }

        let built = candidates
            .into_iter()
            .filter(|p| p.is_file())
            .max_by_key(|p| fs::metadata(p).and_then(|m| m.modified()).ok())?;
        let target = dir.join(&name);
        fs::copy(built, &target).ok()?;
        Some(target)
    }

    fn config_for(library_path: &Path, dir: &Path) -> HostConfig {
        HostConfig {
            library_path: library_path.to_path_buf(),
            reload_debounce_ms: 0,
            save_dir: Some(dir.join("saves")),
            ..HostConfig::default()
        }
    }

    fn instantiate_once(manager: &ExtensionManager) {
        let binding = manager.class_binding("MerchantGame", std::ptr::null_mut());
        assert!(unsafe { binding.instantiate() }.is_none());
    }

    #[test]
    fn debounce_drops_bursts() {
        let mut debounce = Debounce::new(Duration::from_millis(500));
        let t0 = Instant::now();

        assert!(debounce.ready(t0));
        assert!(!debounce.ready(t0 + Duration::from_millis(100)));
        assert!(!debounce.ready(t0 + Duration::from_millis(499)));
        assert!(debounce.ready(t0 + Duration::from_millis(500)));
        assert!(!debounce.ready(t0 + Duration::from_millis(600)));
    }

    #[test]
    fn zero_window_accepts_everything() {
        let mut debounce = Debounce::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(debounce.ready(t0));
        assert!(debounce.ready(t0));
    }

    #[test]
    fn session_survives_a_rejected_rebuild() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        let Some(library) = extension_in(dir.path()) else {
            eprintln!("merchant_extension cdylib not built; skipping");
            return;
        };
        let mut manager = ExtensionManager::start(&config_for(&library, dir.path())).unwrap();
        manager.library().session().buy("sword", 2).unwrap();

        let parked = dir.path().join("parked.bin");
        fs::rename(&library, &parked).unwrap();
        assert!(!manager.try_hot_reload());
        assert!(matches!(manager.runtime_state, RuntimeState::ReloadFailed(_)));
        assert_eq!(manager.library().session().inventory_quantity("sword").unwrap(), 2);

        fs::rename(&parked, &library).unwrap();
        assert!(manager.try_hot_reload());
        assert_eq!(manager.runtime_state, RuntimeState::Running);
        assert_eq!(manager.library().session().inventory_quantity("sword").unwrap(), 2);
        assert_eq!(manager.library().session().gold(), 800.0);

        manager.shutdown();
    }

    #[test]
    fn reload_rebinds_handler_and_drops_old_copy() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        let Some(library) = extension_in(dir.path()) else {
            eprintln!("merchant_extension cdylib not built; skipping");
            return;
        };
        let mut manager = ExtensionManager::start(&config_for(&library, dir.path())).unwrap();
        unsafe { manager.bind_handler(counting_handler()).unwrap() };

        let creates = CREATES.load(Ordering::SeqCst);
        instantiate_once(&manager);
        assert_eq!(CREATES.load(Ordering::SeqCst), creates + 1);

        let calls = CALLS.load(Ordering::SeqCst);
        let binding = manager.class_binding("MerchantGame", std::ptr::null_mut());
        let result =
            unsafe { binding.call(std::ptr::null_mut(), std::ptr::null_mut(), &[], std::ptr::null_mut()) };
        assert!(result.is_ok());
        assert_eq!(CALLS.load(Ordering::SeqCst), calls + 1);

        manager.library().session().advance_day();
        let old_copy = manager.library().staged_path().to_path_buf();
        assert!(manager.try_hot_reload());
        assert!(!old_copy.exists());
        assert_ne!(manager.library().staged_path(), old_copy.as_path());
        assert_eq!(manager.library().session().day(), 2);

        instantiate_once(&manager);
        assert_eq!(CREATES.load(Ordering::SeqCst), creates + 2);

        manager.unbind_handler();
        instantiate_once(&manager);
        assert!(manager.try_hot_reload());
        instantiate_once(&manager);
        assert_eq!(CREATES.load(Ordering::SeqCst), creates + 2);

        manager.shutdown();
    }

    #[test]
    fn shutdown_autosaves_and_removes_staged_copy() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        let Some(library) = extension_in(dir.path()) else {
            eprintln!("merchant_extension cdylib not built; skipping");
            return;
        };
        let manager = ExtensionManager::start(&config_for(&library, dir.path())).unwrap();
        manager.library().session().buy("potion", 1).unwrap();
        let staged = manager.library().staged_path().to_path_buf();
        assert!(staged.exists());

        manager.shutdown();
        assert!(!staged.exists());
        assert!(dir.path().join("saves").join("slot_0.sav").exists());
    }

    #[test]
    fn start_fails_cleanly_without_library() {
        let config = HostConfig {
            library_path: PathBuf::from("/no/such/libmerchant_extension.so"),
            ..HostConfig::default()
        };
        assert!(matches!(
            ExtensionManager::start(&config),
            Err(HostError::Load(crate::loader::LoadError::NotFound(_)))
        ));
    }
}
