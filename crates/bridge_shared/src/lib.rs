// crates/bridge_shared/src/lib.rs
//! Types shared by the host engine side and the extension side of the bridge.
//!
//! Nothing in here interprets an engine value. Handles are opaque, callback
//! tables are plain function pointers, and the snapshot header is a fixed
//! 24-byte POD.

pub mod abi;
pub mod handler;
pub mod handles;
pub mod snapshot;

pub use abi::{
    ArgCount, CallError, CallErrorKind, ClassCallbacks, CreateInstanceFn, FreeInstanceFn,
    MethodCallFn, UnknownCallError,
};
pub use handler::{ExtensionHandler, ForeignHandler};
pub use handles::{ClassInstance, ClassTag, MethodTag, Variant};
pub use snapshot::{
    calculate_layout_hash, FfiBuffer, FfiResult, StateEnvelope, BRIDGE_API_VERSION,
    CURRENT_LAYOUT_HASH, CURRENT_SCHEMA_HASH, CURRENT_STATE_VERSION, SNAPSHOT_MAGIC,
};
