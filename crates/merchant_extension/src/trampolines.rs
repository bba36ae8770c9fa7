// crates/merchant_extension/src/trampolines.rs
//! Class callbacks registered with the engine.
//!
//! Each one hands its parameters, untouched and in order, to the matching
//! registry function and returns what that produced. No pointer is read,
//! written or checked here; panics are not caught either, so a handler that
//! unwinds aborts at the `extern "C"` boundary.

use bridge_shared::{ArgCount, CallError, ClassCallbacks, ClassInstance, ClassTag, MethodTag, Variant};

use crate::registry;

#[no_mangle]
pub unsafe extern "C" fn merchant_create_instance(class_userdata: *mut ClassTag) -> *mut ClassInstance {
    registry::create_instance(class_userdata)
}

#[no_mangle]
pub unsafe extern "C" fn merchant_free_instance(
    class_userdata: *mut ClassTag,
    instance: *mut ClassInstance,
) {
    registry::free_instance(class_userdata, instance)
}

#[no_mangle]
pub unsafe extern "C" fn merchant_call_method(
    method_userdata: *mut MethodTag,
    instance: *mut ClassInstance,
    args: *const *const Variant,
    arg_count: ArgCount,
    ret: *mut Variant,
    error: *mut CallError,
) {
    registry::call_method(method_userdata, instance, args, arg_count, ret, error)
}

/// The trampolines as one registration table.
pub fn class_callbacks() -> ClassCallbacks {
    ClassCallbacks {
        create_instance: merchant_create_instance,
        free_instance: merchant_free_instance,
        call_method: merchant_call_method,
    }
}
