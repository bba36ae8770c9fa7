// crates/bridge_shared/src/abi.rs
use thiserror::Error;

use crate::handles::{ClassInstance, ClassTag, MethodTag, Variant};

/// Integer type the engine uses for argument counts.
pub type ArgCount = i64;

// ==================================================================================
// 1. CALLBACK SIGNATURES
// ==================================================================================

/// Instance creation. Returns whatever instance pointer the handler produced,
/// null included.
pub type CreateInstanceFn = unsafe extern "C" fn(class_userdata: *mut ClassTag) -> *mut ClassInstance;

/// Instance release. The handler owns the instance from here on.
pub type FreeInstanceFn =
    unsafe extern "C" fn(class_userdata: *mut ClassTag, instance: *mut ClassInstance);

/// Method invocation. `args` points at `arg_count` variant pointers and may be
/// null when `arg_count` is zero. The callee writes `ret` and `error`.
pub type MethodCallFn = unsafe extern "C" fn(
    method_userdata: *mut MethodTag,
    instance: *mut ClassInstance,
    args: *const *const Variant,
    arg_count: ArgCount,
    ret: *mut Variant,
    error: *mut CallError,
);

/// The three callbacks a class registers with the host.
///
/// The same table travels both ways: the extension hands its trampolines to
/// the host, and the embedding layer hands its handlers to the extension.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ClassCallbacks {
    pub create_instance: CreateInstanceFn,
    pub free_instance: FreeInstanceFn,
    pub call_method: MethodCallFn,
}

// ==================================================================================
// 2. CALL ERROR
// ==================================================================================

/// Error slot written by a method handler.
///
/// `error` stays a raw integer: the value comes from foreign code and storing
/// an out-of-range discriminant in a Rust enum would be undefined behaviour.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallError {
    pub error: i32,
    pub argument: i32,
    pub expected: i32,
}

impl CallError {
    pub const OK: CallError = CallError { error: 0, argument: 0, expected: 0 };

    pub fn new(kind: CallErrorKind) -> Self {
        Self { error: kind as i32, argument: 0, expected: 0 }
    }

    pub fn with_argument(kind: CallErrorKind, argument: i32, expected: i32) -> Self {
        Self { error: kind as i32, argument, expected }
    }

    pub fn kind(&self) -> Result<CallErrorKind, UnknownCallError> {
        CallErrorKind::try_from(self.error)
    }

    pub fn is_ok(&self) -> bool {
        self.error == CallErrorKind::Ok as i32
    }
}

impl Default for CallError {
    fn default() -> Self {
        Self::OK
    }
}

#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallErrorKind {
    Ok = 0,
    InvalidMethod = 1,
    InvalidArgument = 2,
    TooManyArguments = 3,
    TooFewArguments = 4,
    InstanceIsNull = 5,
    MethodNotConst = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown call error code {0}")]
pub struct UnknownCallError(pub i32);

impl TryFrom<i32> for CallErrorKind {
    type Error = UnknownCallError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => CallErrorKind::Ok,
            1 => CallErrorKind::InvalidMethod,
            2 => CallErrorKind::InvalidArgument,
            3 => CallErrorKind::TooManyArguments,
            4 => CallErrorKind::TooFewArguments,
            5 => CallErrorKind::InstanceIsNull,
            6 => CallErrorKind::MethodNotConst,
            other => return Err(UnknownCallError(other)),
        })
    }
}
