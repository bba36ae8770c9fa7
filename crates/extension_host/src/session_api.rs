// crates/extension_host/src/session_api.rs
//! Typed wrappers over the extension's flat trading exports.

use std::collections::BTreeMap;
use std::ffi::{c_char, CStr, CString};

use libloading::Library;
use serde::de::DeserializeOwned;

use bridge_shared::{FfiBuffer, FfiResult};

use crate::error::HostError;
use crate::loader::{symbol, LoadError};

const OK: i32 = 1;

/// Function pointers resolved from one loaded copy of the extension. Only
/// valid while that library stays loaded, which `ExtensionLibrary` ensures.
#[derive(Clone, Copy)]
pub struct SessionApi {
    init: unsafe extern "C" fn() -> i32,
    terminate: unsafe extern "C" fn(),
    start_new_game: unsafe extern "C" fn(*const c_char) -> i32,
    get_player_gold: unsafe extern "C" fn() -> f64,
    set_player_gold: unsafe extern "C" fn(f64),
    get_current_day: unsafe extern "C" fn() -> i32,
    advance_day: unsafe extern "C" fn(),
    save_game: unsafe extern "C" fn() -> i32,
    load_game: unsafe extern "C" fn() -> i32,
    buy_item: unsafe extern "C" fn(*const c_char, i32) -> i32,
    sell_item: unsafe extern "C" fn(*const c_char, i32) -> i32,
    get_market_price: unsafe extern "C" fn(*const c_char) -> f64,
    get_inventory_quantity: unsafe extern "C" fn(*const c_char) -> i32,
    get_market_items_json: unsafe extern "C" fn() -> *mut c_char,
    get_inventory_json: unsafe extern "C" fn() -> *mut c_char,
    free_string: unsafe extern "C" fn(*mut c_char),
    state_len: unsafe extern "C" fn() -> usize,
    save_state: unsafe extern "C" fn(FfiBuffer) -> FfiResult,
    load_state: unsafe extern "C" fn(FfiBuffer) -> FfiResult,
}

fn check(op: &'static str, code: i32) -> Result<(), HostError> {
    if code == OK {
        Ok(())
    } else {
        Err(HostError::Rejected { op })
    }
}

impl SessionApi {
    pub(crate) unsafe fn resolve(lib: &Library) -> Result<Self, LoadError> {
        Ok(Self {
            init: symbol(lib, "godot_gdextension_init")?,
            terminate: symbol(lib, "godot_gdextension_terminate")?,
            start_new_game: symbol(lib, "start_new_game")?,
            get_player_gold: symbol(lib, "get_player_gold")?,
            set_player_gold: symbol(lib, "set_player_gold")?,
            get_current_day: symbol(lib, "get_current_day")?,
            advance_day: symbol(lib, "advance_day")?,
            save_game: symbol(lib, "save_game")?,
            load_game: symbol(lib, "load_game")?,
            buy_item: symbol(lib, "buy_item")?,
            sell_item: symbol(lib, "sell_item")?,
            get_market_price: symbol(lib, "get_market_price")?,
            get_inventory_quantity: symbol(lib, "get_inventory_quantity")?,
            get_market_items_json: symbol(lib, "get_market_items_json")?,
            get_inventory_json: symbol(lib, "get_inventory_json")?,
            free_string: symbol(lib, "free_string")?,
            state_len: symbol(lib, "merchant_session_state_len")?,
            save_state: symbol(lib, "merchant_session_save_state")?,
            load_state: symbol(lib, "merchant_session_load_state")?,
        })
    }

    pub fn init(&self) -> Result<(), HostError> {
        check("init", unsafe { (self.init)() })
    }

    pub fn terminate(&self) {
        unsafe { (self.terminate)() }
    }

    pub fn start_new_game(&self, player_name: &str) -> Result<(), HostError> {
        let name = CString::new(player_name)?;
        check("start_new_game", unsafe { (self.start_new_game)(name.as_ptr()) })
    }

    pub fn gold(&self) -> f64 {
        unsafe { (self.get_player_gold)() }
    }

    pub fn set_gold(&self, gold: f64) {
        unsafe { (self.set_player_gold)(gold) }
    }

    pub fn day(&self) -> i32 {
        unsafe { (self.get_current_day)() }
    }

    pub fn advance_day(&self) {
        unsafe { (self.advance_day)() }
    }

    pub fn save(&self) -> Result<(), HostError> {
        check("save_game", unsafe { (self.save_game)() })
    }

    pub fn load(&self) -> Result<(), HostError> {
        check("load_game", unsafe { (self.load_game)() })
    }

    pub fn buy(&self, item: &str, quantity: i32) -> Result<(), HostError> {
        let item = CString::new(item)?;
        check("buy_item", unsafe { (self.buy_item)(item.as_ptr(), quantity) })
    }

    pub fn sell(&self, item: &str, quantity: i32) -> Result<(), HostError> {
        let item = CString::new(item)?;
        check("sell_item", unsafe { (self.sell_item)(item.as_ptr(), quantity) })
    }

    pub fn market_price(&self, item: &str) -> Result<f64, HostError> {
        let item = CString::new(item)?;
        Ok(unsafe { (self.get_market_price)(item.as_ptr()) })
    }

    pub fn inventory_quantity(&self, item: &str) -> Result<i32, HostError> {
        let item = CString::new(item)?;
        Ok(unsafe { (self.get_inventory_quantity)(item.as_ptr()) })
    }

    pub fn market(&self) -> Result<BTreeMap<String, f64>, HostError> {
        self.json("get_market_items_json", self.get_market_items_json)
    }

    pub fn inventory(&self) -> Result<BTreeMap<String, i32>, HostError> {
        self.json("get_inventory_json", self.get_inventory_json)
    }

    fn json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        export: unsafe extern "C" fn() -> *mut c_char,
    ) -> Result<T, HostError> {
        let raw = unsafe { export() };
        if raw.is_null() {
            return Err(HostError::NullString { op });
        }
        let parsed = serde_json::from_slice(unsafe { CStr::from_ptr(raw) }.to_bytes());
        unsafe { (self.free_string)(raw) };
        Ok(parsed?)
    }

    /// Copies the session out of the extension. `None` when there is no
    /// session to transfer.
    pub fn snapshot(&self) -> Result<Option<Vec<u8>>, HostError> {
        const MAX_RETRIES: u32 = 3;

        for _ in 0..MAX_RETRIES {
            let required = unsafe { (self.state_len)() };
            if required == 0 {
                return Ok(None);
            }

            let mut buffer = vec![0u8; required];
            let ffi_buffer = FfiBuffer { ptr: buffer.as_mut_ptr(), len: buffer.len() };
            match unsafe { (self.save_state)(ffi_buffer) } {
                FfiResult::Success => return Ok(Some(buffer)),
                // The session grew between the two calls.
                FfiResult::BufferTooSmall => continue,
                FfiResult::NotInitialized => return Ok(None),
                result => return Err(HostError::Transfer { op: "save_state", result }),
            }
        }
        tracing::warn!(retries = MAX_RETRIES, "session kept growing during snapshot");
        Err(HostError::Transfer { op: "save_state", result: FfiResult::BufferTooSmall })
    }

    /// Replaces the extension's session with a snapshot from `snapshot`.
    pub fn restore(&self, snapshot: &mut [u8]) -> Result<(), HostError> {
        let ffi_buffer = FfiBuffer { ptr: snapshot.as_mut_ptr(), len: snapshot.len() };
        match unsafe { (self.load_state)(ffi_buffer) } {
            FfiResult::Success => Ok(()),
            result => Err(HostError::Transfer { op: "load_state", result }),
        }
    }

    /// The exports of the statically linked extension, for tests.
    #[cfg(test)]
    pub(crate) fn linked() -> Self {
        use merchant_extension::exports as x;
        Self {
            init: x::godot_gdextension_init,
            terminate: x::godot_gdextension_terminate,
            start_new_game: x::start_new_game,
            get_player_gold: x::get_player_gold,
            set_player_gold: x::set_player_gold,
            get_current_day: x::get_current_day,
            advance_day: x::advance_day,
            save_game: x::save_game,
            load_game: x::load_game,
            buy_item: x::buy_item,
            sell_item: x::sell_item,
            get_market_price: x::get_market_price,
            get_inventory_quantity: x::get_inventory_quantity,
            get_market_items_json: x::get_market_items_json,
            get_inventory_json: x::get_inventory_json,
            free_string: x::free_string,
            state_len: x::merchant_session_state_len,
            save_state: x::merchant_session_save_state,
            load_state: x::merchant_session_load_state,
        }
    }
}
