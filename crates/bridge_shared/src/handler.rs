// crates/bridge_shared/src/handler.rs
use crate::abi::{ArgCount, CallError, ClassCallbacks};
use crate::handles::{ClassInstance, ClassTag, MethodTag, Variant};

/// The instance and method logic the trampolines forward to.
///
/// Every method receives the raw ABI parameters exactly as the host passed
/// them. Implementations that dereference a pointer take on the host's
/// contract for it: `args` holds `arg_count` valid variant pointers (or is
/// null when the count is zero), and `ret`/`error` are writable for the
/// duration of the call.
pub trait ExtensionHandler: Send + Sync {
    fn create_instance(&self, class_userdata: *mut ClassTag) -> *mut ClassInstance;

    fn free_instance(&self, class_userdata: *mut ClassTag, instance: *mut ClassInstance);

    fn call_method(
        &self,
        method_userdata: *mut MethodTag,
        instance: *mut ClassInstance,
        args: *const *const Variant,
        arg_count: ArgCount,
        ret: *mut Variant,
        error: *mut CallError,
    );
}

/// Handler backed by a foreign callback table, for embedding layers that live
/// on the other side of a C ABI.
#[derive(Clone, Copy, Debug)]
pub struct ForeignHandler {
    callbacks: ClassCallbacks,
}

impl ForeignHandler {
    /// # Safety
    /// Every function in `callbacks` must stay callable for as long as the
    /// handler is installed.
    pub unsafe fn new(callbacks: ClassCallbacks) -> Self {
        Self { callbacks }
    }
}

impl ExtensionHandler for ForeignHandler {
    fn create_instance(&self, class_userdata: *mut ClassTag) -> *mut ClassInstance {
        unsafe { (self.callbacks.create_instance)(class_userdata) }
    }

    fn free_instance(&self, class_userdata: *mut ClassTag, instance: *mut ClassInstance) {
        unsafe { (self.callbacks.free_instance)(class_userdata, instance) }
    }

    fn call_method(
        &self,
        method_userdata: *mut MethodTag,
        instance: *mut ClassInstance,
        args: *const *const Variant,
        arg_count: ArgCount,
        ret: *mut Variant,
        error: *mut CallError,
    ) {
        tracing::trace!(arg_count, "forwarding method call to foreign handler");
        unsafe {
            (self.callbacks.call_method)(method_userdata, instance, args, arg_count, ret, error)
        }
    }
}
