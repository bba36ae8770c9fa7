// crates/merchant_extension/src/exports.rs
//! Flat C API the game scripts call for trading.
//!
//! Every export runs inside a panic guard and reports success as `1` and
//! failure as `0` (or a zero value for getters). Failures are logged.

use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

use bridge_shared::{FfiBuffer, FfiResult};

use crate::session::{self, SessionConfig, SessionError, AUTOSAVE_SLOT};
use crate::snapshot::{self, SnapshotError};

const OK: i32 = 1;
const FAILED: i32 = 0;

/// Runs `f`, turning a panic into `fallback`. The session lock recovers from
/// poisoning on the next call.
fn guarded<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!("panic caught at the extension boundary");
            fallback
        }
    }
}

fn report(op: &str, result: Result<(), SessionError>) -> i32 {
    match result {
        Ok(()) => OK,
        Err(err) => {
            tracing::warn!(op, error = %err, "session call failed");
            FAILED
        }
    }
}

/// Copies a caller-owned C string. `None` for null.
unsafe fn string_arg(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

fn into_raw_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cstring) => cstring.into_raw(),
        Err(err) => {
            tracing::warn!(error = %err, "JSON contained an interior NUL");
            std::ptr::null_mut()
        }
    }
}

// ==================================================================================
// LIFECYCLE
// ==================================================================================

#[no_mangle]
pub extern "C" fn godot_gdextension_init() -> i32 {
    guarded(FAILED, || {
        session::init(SessionConfig::from_env());
        OK
    })
}

#[no_mangle]
pub extern "C" fn godot_gdextension_terminate() {
    guarded((), session::terminate)
}

#[no_mangle]
pub unsafe extern "C" fn start_new_game(player_name: *const c_char) -> i32 {
    let Some(name) = string_arg(player_name) else {
        return FAILED;
    };
    guarded(FAILED, move || {
        report(
            "start_new_game",
            session::with_session(|s| {
                s.start_new_game(&name);
                Ok(())
            }),
        )
    })
}

#[no_mangle]
pub extern "C" fn save_game() -> i32 {
    guarded(FAILED, || report("save_game", session::save_slot(AUTOSAVE_SLOT)))
}

#[no_mangle]
pub extern "C" fn load_game() -> i32 {
    guarded(FAILED, || report("load_game", session::load_slot(AUTOSAVE_SLOT)))
}

// ==================================================================================
// PLAYER STATE
// ==================================================================================

#[no_mangle]
pub extern "C" fn get_player_gold() -> f64 {
    guarded(0.0, || session::with_session(|s| Ok(s.gold)).unwrap_or(0.0))
}

#[no_mangle]
pub extern "C" fn set_player_gold(gold: f64) {
    guarded((), || {
        report(
            "set_player_gold",
            session::with_session(|s| {
                s.gold = gold;
                Ok(())
            }),
        );
    })
}

#[no_mangle]
pub extern "C" fn get_current_day() -> i32 {
    guarded(0, || session::with_session(|s| Ok(s.day)).unwrap_or(0))
}

#[no_mangle]
pub extern "C" fn advance_day() {
    guarded((), || {
        report(
            "advance_day",
            session::with_session(|s| s.advance_day()),
        );
    })
}

// ==================================================================================
// TRADING
// ==================================================================================

#[no_mangle]
pub unsafe extern "C" fn buy_item(item_id: *const c_char, quantity: i32) -> i32 {
    let Some(item) = string_arg(item_id) else {
        return FAILED;
    };
    guarded(FAILED, move || {
        report("buy_item", session::with_session(|s| s.buy(&item, quantity).map(drop)))
    })
}

#[no_mangle]
pub unsafe extern "C" fn sell_item(item_id: *const c_char, quantity: i32) -> i32 {
    let Some(item) = string_arg(item_id) else {
        return FAILED;
    };
    guarded(FAILED, move || {
        report("sell_item", session::with_session(|s| s.sell(&item, quantity).map(drop)))
    })
}

#[no_mangle]
pub unsafe extern "C" fn get_market_price(item_id: *const c_char) -> f64 {
    let Some(item) = string_arg(item_id) else {
        return 0.0;
    };
    guarded(0.0, move || {
        session::with_session(|s| Ok(s.market_price(&item))).unwrap_or(0.0)
    })
}

#[no_mangle]
pub unsafe extern "C" fn get_inventory_quantity(item_id: *const c_char) -> i32 {
    let Some(item) = string_arg(item_id) else {
        return 0;
    };
    guarded(0, move || {
        session::with_session(|s| Ok(s.inventory_quantity(&item))).unwrap_or(0)
    })
}

/// JSON object of item -> price. Free with `free_string`.
#[no_mangle]
pub extern "C" fn get_market_items_json() -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        match session::with_session(|s| s.market_json()) {
            Ok(json) => into_raw_string(json),
            Err(err) => {
                tracing::warn!(error = %err, "market JSON unavailable");
                std::ptr::null_mut()
            }
        }
    })
}

/// JSON object of item -> quantity. Free with `free_string`.
#[no_mangle]
pub extern "C" fn get_inventory_json() -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        match session::with_session(|s| s.inventory_json()) {
            Ok(json) => into_raw_string(json),
            Err(err) => {
                tracing::warn!(error = %err, "inventory JSON unavailable");
                std::ptr::null_mut()
            }
        }
    })
}

/// Frees a string returned by this library. Null is ignored.
#[no_mangle]
pub unsafe extern "C" fn free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(CString::from_raw(ptr));
}

// ==================================================================================
// HOT-RELOAD STATE TRANSFER
// ==================================================================================

/// Bytes needed by `merchant_session_save_state`, or 0 with no session.
#[no_mangle]
pub extern "C" fn merchant_session_state_len() -> usize {
    guarded(0, || {
        session::with_session(|s| Ok(snapshot::encoded_len(&*s)?)).unwrap_or(0)
    })
}

#[no_mangle]
pub unsafe extern "C" fn merchant_session_save_state(buf: FfiBuffer) -> FfiResult {
    if buf.ptr.is_null() {
        return FfiResult::Error;
    }
    let bytes = std::slice::from_raw_parts_mut(buf.ptr, buf.len);
    guarded(FfiResult::PanicDetected, move || {
        match session::with_session(|s| Ok(snapshot::encode_into(&*s, bytes)?)) {
            Ok(_) => FfiResult::Success,
            Err(err) => transfer_failure("save_state", err),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn merchant_session_load_state(buf: FfiBuffer) -> FfiResult {
    if buf.ptr.is_null() {
        return FfiResult::Error;
    }
    let bytes = std::slice::from_raw_parts(buf.ptr as *const u8, buf.len);
    guarded(FfiResult::PanicDetected, move || {
        let restored = snapshot::decode(bytes).map_err(SessionError::from);
        match restored.and_then(session::replace) {
            Ok(()) => FfiResult::Success,
            Err(err) => transfer_failure("load_state", err),
        }
    })
}

fn transfer_failure(op: &str, err: SessionError) -> FfiResult {
    tracing::warn!(op, error = %err, "session state transfer failed");
    match err {
        SessionError::NotInitialized => FfiResult::NotInitialized,
        SessionError::Snapshot(SnapshotError::BufferTooSmall { .. }) => FfiResult::BufferTooSmall,
        SessionError::Snapshot(
            SnapshotError::SchemaMismatch { .. } | SnapshotError::VersionMismatch { .. },
        ) => FfiResult::SchemaMismatch,
        _ => FfiResult::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_lock;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let out = CStr::from_ptr(ptr).to_str().unwrap().to_owned();
        free_string(ptr);
        out
    }

    fn fresh_session(dir: &std::path::Path) {
        session::discard();
        session::init(SessionConfig { save_dir: dir.to_path_buf() });
    }

    #[test]
    fn calls_before_init_fail_quietly() {
        let _guard = test_lock();
        session::discard();

        unsafe {
            assert_eq!(start_new_game(c("Mira").as_ptr()), FAILED);
            assert_eq!(buy_item(c("apple").as_ptr(), 1), FAILED);
        }
        assert_eq!(get_player_gold(), 0.0);
        assert_eq!(get_current_day(), 0);
        assert!(get_market_items_json().is_null());
        assert_eq!(merchant_session_state_len(), 0);
    }

    #[test]
    fn init_and_terminate_round_trip() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        fresh_session(dir.path());

        assert_eq!(get_player_gold(), 1000.0);
        assert_eq!(get_current_day(), 1);
        godot_gdextension_terminate();
        assert!(!session::is_active());
        assert!(dir.path().join("slot_0.sav").exists());
    }

    #[test]
    fn trading_day_through_c_api() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        fresh_session(dir.path());

        unsafe {
            assert_eq!(start_new_game(c("Mira").as_ptr()), OK);
            assert_eq!(buy_item(c("bread").as_ptr(), 4), OK);
            assert_eq!(buy_item(c("dragon").as_ptr(), 1), FAILED);
            assert_eq!(get_inventory_quantity(c("bread").as_ptr()), 4);
            assert_eq!(sell_item(c("bread").as_ptr(), 1), OK);
            assert_eq!(sell_item(c("bread").as_ptr(), 9), FAILED);
            assert_eq!(get_market_price(c("bread").as_ptr()), 15.0);

            assert_eq!(take_string(get_inventory_json()), r#"{"bread":3}"#);
            assert!(take_string(get_market_items_json()).contains(r#""sword":100.0"#));
        }
        assert_eq!(get_player_gold(), 1000.0 - 60.0 + 12.0);

        advance_day();
        assert_eq!(get_current_day(), 2);
        set_player_gold(5.0);
        assert_eq!(get_player_gold(), 5.0);
        session::terminate();
    }

    #[test]
    fn overflowing_buy_leaves_session_untouched() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        fresh_session(dir.path());

        set_player_gold(1e12);
        unsafe {
            assert_eq!(buy_item(c("herb").as_ptr(), i32::MAX), OK);
            let gold = get_player_gold();
            assert_eq!(buy_item(c("herb").as_ptr(), 1), FAILED);
            assert_eq!(get_player_gold(), gold);
            assert_eq!(get_inventory_quantity(c("herb").as_ptr()), i32::MAX);
        }
        session::terminate();
    }

    #[test]
    fn null_strings_are_rejected() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        fresh_session(dir.path());

        unsafe {
            assert_eq!(start_new_game(std::ptr::null()), FAILED);
            assert_eq!(buy_item(std::ptr::null(), 1), FAILED);
            assert_eq!(get_market_price(std::ptr::null()), 0.0);
            free_string(std::ptr::null_mut());
        }
        session::terminate();
    }

    #[test]
    fn save_and_load_game_use_slot_zero() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        fresh_session(dir.path());

        unsafe { buy_item(c("herb").as_ptr(), 10) };
        assert_eq!(save_game(), OK);
        unsafe { sell_item(c("herb").as_ptr(), 10) };
        assert_eq!(load_game(), OK);
        assert_eq!(unsafe { get_inventory_quantity(c("herb").as_ptr()) }, 10);
        session::terminate();
    }

    #[test]
    fn state_transfer_through_buffers() {
        let _guard = test_lock();
        let dir = tempfile::tempdir().unwrap();
        fresh_session(dir.path());
        unsafe { buy_item(c("sword").as_ptr(), 2) };

        let len = merchant_session_state_len();
        assert!(len > 0);

        let mut small = vec![0u8; len - 1];
        let result = unsafe {
            merchant_session_save_state(FfiBuffer { ptr: small.as_mut_ptr(), len: small.len() })
        };
        assert_eq!(result, FfiResult::BufferTooSmall);

        let mut buffer = vec![0u8; len];
        let result = unsafe {
            merchant_session_save_state(FfiBuffer { ptr: buffer.as_mut_ptr(), len: buffer.len() })
        };
        assert_eq!(result, FfiResult::Success);

        fresh_session(dir.path());
        assert_eq!(unsafe { get_inventory_quantity(c("sword").as_ptr()) }, 0);
        let result = unsafe {
            merchant_session_load_state(FfiBuffer { ptr: buffer.as_mut_ptr(), len: buffer.len() })
        };
        assert_eq!(result, FfiResult::Success);
        assert_eq!(unsafe { get_inventory_quantity(c("sword").as_ptr()) }, 2);

        buffer[8] ^= 0xFF;
        let result = unsafe {
            merchant_session_load_state(FfiBuffer { ptr: buffer.as_mut_ptr(), len: buffer.len() })
        };
        assert_eq!(result, FfiResult::SchemaMismatch);
        session::terminate();
    }
}
