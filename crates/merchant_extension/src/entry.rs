// crates/merchant_extension/src/entry.rs
//! Handshake and registration entry points the host resolves by name.

use std::ffi::{c_char, CStr};
use std::sync::Arc;

use bridge_shared::{ClassCallbacks, FfiResult, ForeignHandler, BRIDGE_API_VERSION, CURRENT_LAYOUT_HASH};
use tracing_subscriber::EnvFilter;

use crate::{registry, trampolines};

#[no_mangle]
pub extern "C" fn merchant_bridge_api_version() -> u32 {
    BRIDGE_API_VERSION
}

#[no_mangle]
pub extern "C" fn merchant_bridge_layout_hash() -> u64 {
    CURRENT_LAYOUT_HASH
}

/// Trampolines for the host's class registration.
#[no_mangle]
pub extern "C" fn merchant_bridge_class_callbacks() -> ClassCallbacks {
    trampolines::class_callbacks()
}

/// Installs the embedding layer's handler table. The table is copied; the
/// functions it names must stay loaded until it is uninstalled or replaced.
#[no_mangle]
pub unsafe extern "C" fn merchant_bridge_install_handler(table: *const ClassCallbacks) -> FfiResult {
    if table.is_null() {
        tracing::warn!("install_handler called with a null table");
        return FfiResult::Error;
    }
    let handler = ForeignHandler::new(*table);
    registry::install(Arc::new(handler));
    FfiResult::Success
}

/// Starts this library's own log output on stderr. A loaded copy of the
/// library does not share the host's subscriber, so the host calls this once
/// per load. `RUST_LOG` wins over `filter`; null means `info`.
#[no_mangle]
pub unsafe extern "C" fn merchant_bridge_init_logging(filter: *const c_char) -> FfiResult {
    let directives = if filter.is_null() {
        "info".to_string()
    } else {
        CStr::from_ptr(filter).to_string_lossy().into_owned()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    match tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init() {
        Ok(()) => FfiResult::Success,
        // Already initialized in this copy of the library.
        Err(_) => FfiResult::Error,
    }
}

#[no_mangle]
pub extern "C" fn merchant_bridge_uninstall_handler() {
    if registry::uninstall().is_none() {
        tracing::debug!("uninstall_handler called with nothing installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_lock;
    use bridge_shared::{ArgCount, CallError, CallErrorKind, ClassInstance, ClassTag, MethodTag, Variant};

    unsafe extern "C" fn fixed_create(_class_userdata: *mut ClassTag) -> *mut ClassInstance {
        0xC0FFEE as *mut ClassInstance
    }

    unsafe extern "C" fn ignore_free(_class_userdata: *mut ClassTag, _instance: *mut ClassInstance) {}

    unsafe extern "C" fn reject_call(
        _method_userdata: *mut MethodTag,
        _instance: *mut ClassInstance,
        _args: *const *const Variant,
        _arg_count: ArgCount,
        _ret: *mut Variant,
        error: *mut CallError,
    ) {
        *error = CallError::new(CallErrorKind::InstanceIsNull);
    }

    #[test]
    fn handshake_matches_shared_constants() {
        assert_eq!(merchant_bridge_api_version(), BRIDGE_API_VERSION);
        assert_eq!(merchant_bridge_layout_hash(), CURRENT_LAYOUT_HASH);
    }

    #[test]
    fn null_table_is_rejected() {
        let _guard = test_lock();
        registry::uninstall();
        assert_eq!(unsafe { merchant_bridge_install_handler(std::ptr::null()) }, FfiResult::Error);
        assert!(!registry::is_bound());
    }

    #[test]
    fn installed_table_is_reached_through_trampolines() {
        let _guard = test_lock();
        let table = ClassCallbacks {
            create_instance: fixed_create,
            free_instance: ignore_free,
            call_method: reject_call,
        };
        assert_eq!(unsafe { merchant_bridge_install_handler(&table) }, FfiResult::Success);

        let callbacks = merchant_bridge_class_callbacks();
        let instance = unsafe { (callbacks.create_instance)(std::ptr::null_mut()) };
        assert_eq!(instance as usize, 0xC0FFEE);

        let mut error = CallError::OK;
        unsafe {
            (callbacks.call_method)(
                std::ptr::null_mut(),
                instance,
                std::ptr::null(),
                0,
                std::ptr::null_mut(),
                &mut error,
            )
        };
        assert_eq!(error.kind(), Ok(CallErrorKind::InstanceIsNull));

        merchant_bridge_uninstall_handler();
        assert!(!registry::is_bound());
    }
}
