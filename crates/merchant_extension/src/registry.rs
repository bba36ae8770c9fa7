// crates/merchant_extension/src/registry.rs
//! Process-wide slot holding the handler the trampolines forward to.
//!
//! The slot is only locked long enough to clone the `Arc`; the handler itself
//! always runs with no lock held, so it may install or remove handlers from
//! inside a callback.

use std::sync::{Arc, RwLock};

use bridge_shared::{
    ArgCount, CallError, CallErrorKind, ClassInstance, ClassTag, ExtensionHandler, MethodTag,
    Variant,
};

static HANDLER: RwLock<Option<Arc<dyn ExtensionHandler>>> = RwLock::new(None);

/// Installs `handler`, replacing any previous one.
pub fn install(handler: Arc<dyn ExtensionHandler>) {
    let mut slot = HANDLER.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.replace(handler).is_some() {
        tracing::debug!("replaced previously installed extension handler");
    } else {
        tracing::debug!("extension handler installed");
    }
}

/// Removes the installed handler, if any.
pub fn uninstall() -> Option<Arc<dyn ExtensionHandler>> {
    let mut slot = HANDLER.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    slot.take()
}

pub fn is_bound() -> bool {
    current().is_some()
}

fn current() -> Option<Arc<dyn ExtensionHandler>> {
    HANDLER
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

pub fn create_instance(class_userdata: *mut ClassTag) -> *mut ClassInstance {
    match current() {
        Some(handler) => handler.create_instance(class_userdata),
        None => {
            tracing::warn!("create_instance called with no handler installed");
            std::ptr::null_mut()
        }
    }
}

pub fn free_instance(class_userdata: *mut ClassTag, instance: *mut ClassInstance) {
    match current() {
        Some(handler) => handler.free_instance(class_userdata, instance),
        None => tracing::warn!("free_instance called with no handler installed"),
    }
}

pub fn call_method(
    method_userdata: *mut MethodTag,
    instance: *mut ClassInstance,
    args: *const *const Variant,
    arg_count: ArgCount,
    ret: *mut Variant,
    error: *mut CallError,
) {
    match current() {
        Some(handler) => {
            handler.call_method(method_userdata, instance, args, arg_count, ret, error)
        }
        None => {
            tracing::warn!(arg_count, "call_method called with no handler installed");
            if !error.is_null() {
                // The host owns `error` and guarantees it is writable for the call.
                unsafe { error.write(CallError::new(CallErrorKind::InvalidMethod)) };
            }
        }
    }
}
