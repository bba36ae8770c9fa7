// crates/bridge_shared/src/snapshot.rs
use bytemuck::{Pod, Zeroable};

// ==================================================================================
// 1. HANDSHAKE
// ==================================================================================

/// Bumped whenever an exported signature changes.
pub const BRIDGE_API_VERSION: u32 = 1;

/// Describes every `#[repr(C)]` type that crosses the boundary. Any edit here
/// changes `CURRENT_LAYOUT_HASH`, so host and extension built from different
/// trees refuse each other.
const LAYOUT_DESCRIPTOR: &str = "ClassCallbacks{create:fn(*mut ClassTag)->*mut ClassInstance;\
free:fn(*mut ClassTag,*mut ClassInstance);\
call:fn(*mut MethodTag,*mut ClassInstance,*const *const Variant,i64,*mut Variant,*mut CallError)}\
CallError{i32,i32,i32}FfiBuffer{*mut u8,usize}StateEnvelope{u32,u32,u64,u64}";

/// FNV-1a over a layout descriptor string.
pub const fn calculate_layout_hash(descriptor: &str) -> u64 {
    const PRIME: u64 = 0x100000001b3;
    let bytes = descriptor.as_bytes();
    let mut hash: u64 = 0xcbf29ce484222325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

pub const CURRENT_LAYOUT_HASH: u64 = calculate_layout_hash(LAYOUT_DESCRIPTOR);

// ==================================================================================
// 2. STATE SNAPSHOTS
// ==================================================================================

/// "MTSV"
pub const SNAPSHOT_MAGIC: u32 = 0x4D54_5356;
pub const CURRENT_STATE_VERSION: u32 = 1;
pub const CURRENT_SCHEMA_HASH: u64 =
    calculate_layout_hash("MerchantSession{player_name:String,gold:f64,day:i32,market:Map<String,f64>,inventory:Map<String,i32>}");

/// Header written in front of every serialized session.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct StateEnvelope {
    pub magic: u32,
    pub state_version: u32,
    pub schema_hash: u64,
    pub payload_len: u64,
}

impl StateEnvelope {
    pub const LEN: usize = std::mem::size_of::<StateEnvelope>();

    pub fn current(payload_len: usize) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            state_version: CURRENT_STATE_VERSION,
            schema_hash: CURRENT_SCHEMA_HASH,
            payload_len: payload_len as u64,
        }
    }

    /// Reads a header from the front of `bytes`. Alignment of `bytes` does not
    /// matter.
    pub fn read(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..Self::LEN)
            .map(bytemuck::pod_read_unaligned::<StateEnvelope>)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Caller-owned byte buffer handed across the boundary.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FfiBuffer {
    pub ptr: *mut u8,
    pub len: usize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfiResult {
    Success = 0,
    Error = 1,
    PanicDetected = 2,
    BufferTooSmall = 3,
    SchemaMismatch = 4,
    NotInitialized = 5,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hash_is_fnv1a() {
        // Published FNV-1a test vectors.
        assert_eq!(calculate_layout_hash(""), 0xcbf29ce484222325);
        assert_eq!(calculate_layout_hash("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn layout_hash_tracks_descriptor() {
        assert_ne!(CURRENT_LAYOUT_HASH, CURRENT_SCHEMA_HASH);
        assert_eq!(CURRENT_LAYOUT_HASH, calculate_layout_hash(LAYOUT_DESCRIPTOR));
    }

    #[test]
    fn envelope_is_padding_free() {
        assert_eq!(StateEnvelope::LEN, 24);
    }

    #[test]
    fn envelope_reads_back_from_unaligned_bytes() {
        let header = StateEnvelope::current(99);
        let mut bytes = vec![0xAAu8];
        bytes.extend_from_slice(header.as_bytes());

        assert_eq!(StateEnvelope::read(&bytes[1..]), Some(header));
        assert_eq!(StateEnvelope::read(&bytes[1..10]), None);
    }
}
