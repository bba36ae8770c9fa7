// crates/bridge_shared/src/handles.rs
//! Opaque handles crossing the extension boundary.
//!
//! Each handle is a zero-sized `#[repr(C)]` struct that is only ever used
//! behind a raw pointer. The bridge cannot see any fields, and the
//! `PhantomData` marker keeps the types `!Send`, `!Sync` and `!Unpin` so a
//! pointer to one is never mistaken for owned data.

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            _data: [u8; 0],
            _marker: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
        }
    };
}

opaque_handle!(
    /// User data the host attached to a class when it was registered.
    ClassTag
);

opaque_handle!(
    /// User data the host attached to a single method binding.
    MethodTag
);

opaque_handle!(
    /// An instance produced by the embedding layer's create handler.
    ClassInstance
);

opaque_handle!(
    /// An engine value. Layout and encoding belong to the engine's type system.
    Variant
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_zero_sized() {
        assert_eq!(std::mem::size_of::<ClassTag>(), 0);
        assert_eq!(std::mem::size_of::<MethodTag>(), 0);
        assert_eq!(std::mem::size_of::<ClassInstance>(), 0);
        assert_eq!(std::mem::size_of::<Variant>(), 0);
    }
}
