// crates/host_cli/src/handler.rs
//! Stand-in embedding layer: logs every callback that reaches it.
//!
//! It owns no classes, so instances come back null and calls are rejected
//! as invalid methods.

use bridge_shared::{ArgCount, CallError, CallErrorKind, ClassCallbacks, ClassInstance, ClassTag, MethodTag, Variant};

unsafe extern "C" fn log_create(class_userdata: *mut ClassTag) -> *mut ClassInstance {
    tracing::info!(class_userdata = ?class_userdata, "create_instance reached the embedding layer");
    std::ptr::null_mut()
}

unsafe extern "C" fn log_free(class_userdata: *mut ClassTag, instance: *mut ClassInstance) {
    tracing::info!(class_userdata = ?class_userdata, instance = ?instance, "free_instance reached the embedding layer");
}

unsafe extern "C" fn log_call(
    method_userdata: *mut MethodTag,
    instance: *mut ClassInstance,
    _args: *const *const Variant,
    arg_count: ArgCount,
    _ret: *mut Variant,
    error: *mut CallError,
) {
    tracing::info!(method_userdata = ?method_userdata, instance = ?instance, arg_count, "call_method reached the embedding layer");
    if !error.is_null() {
        *error = CallError::new(CallErrorKind::InvalidMethod);
    }
}

pub fn logging_handler() -> ClassCallbacks {
    ClassCallbacks {
        create_instance: log_create,
        free_instance: log_free,
        call_method: log_call,
    }
}
