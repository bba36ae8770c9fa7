// crates/extension_host/src/binding.rs
//! A registered class as the engine sees it: the extension's callback table
//! plus the class user data the engine attached at registration.

use std::ptr::NonNull;

use thiserror::Error;

use bridge_shared::{
    ArgCount, CallError, CallErrorKind, ClassCallbacks, ClassInstance, ClassTag, MethodTag,
    UnknownCallError, Variant,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    #[error("call rejected with {kind:?} (argument {argument}, expected {expected})")]
    Rejected { kind: CallErrorKind, argument: i32, expected: i32 },
    #[error(transparent)]
    Unknown(#[from] UnknownCallError),
}

impl CallFailure {
    fn from_slot(slot: CallError) -> Result<(), CallFailure> {
        match slot.kind()? {
            CallErrorKind::Ok => Ok(()),
            kind => Err(CallFailure::Rejected {
                kind,
                argument: slot.argument,
                expected: slot.expected,
            }),
        }
    }
}

pub struct ClassBinding {
    name: String,
    callbacks: ClassCallbacks,
    class_userdata: *mut ClassTag,
}

impl ClassBinding {
    pub fn new(name: impl Into<String>, callbacks: ClassCallbacks, class_userdata: *mut ClassTag) -> Self {
        Self { name: name.into(), callbacks, class_userdata }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the extension for a new instance. `None` when the handler produced
    /// a null instance.
    ///
    /// # Safety
    /// The library owning the callbacks must still be loaded.
    pub unsafe fn instantiate(&self) -> Option<NonNull<ClassInstance>> {
        let instance = (self.callbacks.create_instance)(self.class_userdata);
        if instance.is_null() {
            tracing::debug!(class = %self.name, "create handler returned a null instance");
        }
        NonNull::new(instance)
    }

    /// # Safety
    /// `instance` must come from `instantiate` on this binding and not be used
    /// afterwards.
    pub unsafe fn release(&self, instance: NonNull<ClassInstance>) {
        (self.callbacks.free_instance)(self.class_userdata, instance.as_ptr())
    }

    /// Calls a bound method. An empty `args` is passed as a null array with a
    /// zero count.
    ///
    /// # Safety
    /// `method_userdata` and `instance` must be what the extension expects for
    /// this method, every argument pointer must be a live variant and `ret`
    /// must be writable (or null if the method returns nothing).
    pub unsafe fn call(
        &self,
        method_userdata: *mut MethodTag,
        instance: *mut ClassInstance,
        args: &[*const Variant],
        ret: *mut Variant,
    ) -> Result<(), CallFailure> {
        let args_ptr = if args.is_empty() { std::ptr::null() } else { args.as_ptr() };
        let mut slot = CallError::OK;
        (self.callbacks.call_method)(
            method_userdata,
            instance,
            args_ptr,
            args.len() as ArgCount,
            ret,
            &mut slot,
        );
        CallFailure::from_slot(slot)
    }
}
