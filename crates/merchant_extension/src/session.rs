// crates/merchant_extension/src/session.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{self, SnapshotError};

pub const STARTING_GOLD: f64 = 1000.0;
pub const STARTING_DAY: i32 = 1;
/// Fraction of the market price a merchant gets back when selling.
pub const SELL_RATIO: f64 = 0.8;
/// Market price assumed for goods the market no longer lists.
pub const FALLBACK_PRICE: f64 = 10.0;
pub const AUTOSAVE_SLOT: u32 = 0;

const SAVE_DIR_ENV: &str = "MERCHANT_SAVE_DIR";
const DEFAULT_SAVE_DIR: &str = "saves";

const STARTING_MARKET: [(&str, f64); 6] = [
    ("apple", 10.0),
    ("bread", 15.0),
    ("sword", 100.0),
    ("potion", 50.0),
    ("armor", 200.0),
    ("herb", 5.0),
];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no game session; call init first")]
    NotInitialized,
    #[error("item `{0}` is not sold on the market")]
    UnknownItem(String),
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error("not enough gold: need {needed:.2}, have {available:.2}")]
    InsufficientGold { needed: f64, available: f64 },
    #[error("not enough `{item}` in inventory: want {wanted}, have {held}")]
    InsufficientStock { item: String, wanted: i32, held: i32 },
    #[error("inventory of `{item}` cannot hold {held} + {added}")]
    InventoryOverflow { item: String, held: i32, added: i32 },
    #[error("calendar cannot advance past day {0}")]
    CalendarOverflow(i32),
    #[error("save file {}: {source}", path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Where the session keeps its save slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub save_dir: PathBuf,
}

impl SessionConfig {
    /// `MERCHANT_SAVE_DIR`, falling back to `./saves`.
    pub fn from_env() -> Self {
        let save_dir = std::env::var_os(SAVE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR));
        Self { save_dir }
    }

    pub fn slot_path(&self, slot: u32) -> PathBuf {
        self.save_dir.join(format!("slot_{slot}.sav"))
    }
}

/// One player's trading state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantSession {
    pub player_name: String,
    pub gold: f64,
    pub day: i32,
    pub market: BTreeMap<String, f64>,
    pub inventory: BTreeMap<String, i32>,
}

impl Default for MerchantSession {
    fn default() -> Self {
        Self {
            player_name: String::new(),
            gold: STARTING_GOLD,
            day: STARTING_DAY,
            market: STARTING_MARKET
                .iter()
                .map(|(item, price)| (item.to_string(), *price))
                .collect(),
            inventory: BTreeMap::new(),
        }
    }
}

impl MerchantSession {
    /// Resets the player's purse, calendar and stock. Market prices carry over.
    pub fn start_new_game(&mut self, player_name: &str) {
        self.player_name = player_name.to_string();
        self.gold = STARTING_GOLD;
        self.day = STARTING_DAY;
        self.inventory.clear();
        tracing::info!(player = player_name, "new game started");
    }

    /// Moves to the next day and applies that day's price swing to every item.
    pub fn advance_day(&mut self) -> Result<(), SessionError> {
        self.day = self
            .day
            .checked_add(1)
            .ok_or(SessionError::CalendarOverflow(self.day))?;
        let factor = 0.8 + f64::from(self.day.rem_euclid(5)) * 0.1;
        for price in self.market.values_mut() {
            *price *= factor;
        }
        tracing::info!(day = self.day, factor, "advanced day");
        Ok(())
    }

    /// Buys `quantity` of `item`, returning the total cost.
    pub fn buy(&mut self, item: &str, quantity: i32) -> Result<f64, SessionError> {
        if quantity <= 0 {
            return Err(SessionError::InvalidQuantity(quantity));
        }
        let price = self
            .market
            .get(item)
            .copied()
            .ok_or_else(|| SessionError::UnknownItem(item.to_string()))?;

        let held = self.inventory_quantity(item);
        let stocked = held.checked_add(quantity).ok_or_else(|| SessionError::InventoryOverflow {
            item: item.to_string(),
            held,
            added: quantity,
        })?;

        let cost = price * f64::from(quantity);
        if self.gold < cost {
            return Err(SessionError::InsufficientGold { needed: cost, available: self.gold });
        }

        self.gold -= cost;
        self.inventory.insert(item.to_string(), stocked);
        tracing::debug!(item, quantity, cost, "bought");
        Ok(cost)
    }

    /// Sells `quantity` of `item`, returning the revenue.
    pub fn sell(&mut self, item: &str, quantity: i32) -> Result<f64, SessionError> {
        if quantity <= 0 {
            return Err(SessionError::InvalidQuantity(quantity));
        }
        let held = self.inventory_quantity(item);
        if held < quantity {
            return Err(SessionError::InsufficientStock {
                item: item.to_string(),
                wanted: quantity,
                held,
            });
        }

        let market_price = self.market.get(item).copied().unwrap_or(FALLBACK_PRICE);
        let revenue = market_price * SELL_RATIO * f64::from(quantity);

        if held == quantity {
            self.inventory.remove(item);
        } else {
            self.inventory.insert(item.to_string(), held - quantity);
        }
        self.gold += revenue;
        tracing::debug!(item, quantity, revenue, "sold");
        Ok(revenue)
    }

    pub fn market_price(&self, item: &str) -> f64 {
        self.market.get(item).copied().unwrap_or(0.0)
    }

    pub fn inventory_quantity(&self, item: &str) -> i32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    pub fn market_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string(&self.market)?)
    }

    pub fn inventory_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string(&self.inventory)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SessionError> {
        let bytes = snapshot::encode(self)?;
        let io_err = |source| SessionError::Io { path: path.to_path_buf(), source };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(path, bytes).map_err(io_err)?;
        tracing::info!(path = %path.display(), "game saved");
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, SessionError> {
        let bytes = fs::read(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let session = snapshot::decode(&bytes)?;
        tracing::info!(path = %path.display(), "game loaded");
        Ok(session)
    }
}

// ==================================================================================
// PROCESS-WIDE SESSION
// ==================================================================================

struct ActiveSession {
    session: MerchantSession,
    config: SessionConfig,
}

static ACTIVE: Mutex<Option<ActiveSession>> = Mutex::new(None);

fn active() -> MutexGuard<'static, Option<ActiveSession>> {
    ACTIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Creates a fresh session, replacing any existing one.
pub fn init(config: SessionConfig) {
    tracing::info!(save_dir = %config.save_dir.display(), "initializing merchant session");
    *active() = Some(ActiveSession { session: MerchantSession::default(), config });
}

/// Autosaves and drops the session. Save failures are logged, not returned.
pub fn terminate() {
    let Some(active) = active().take() else {
        return;
    };
    let path = active.config.slot_path(AUTOSAVE_SLOT);
    if let Err(err) = active.session.save_to(&path) {
        tracing::warn!(error = %err, "autosave on terminate failed");
    }
    tracing::info!("merchant session terminated");
}

/// Drops the session without the autosave, so a test never writes into a
/// previous test's save directory.
#[cfg(test)]
pub(crate) fn discard() {
    active().take();
}

pub fn is_active() -> bool {
    active().is_some()
}

/// Runs `f` against the live session.
pub fn with_session<R>(
    f: impl FnOnce(&mut MerchantSession) -> Result<R, SessionError>,
) -> Result<R, SessionError> {
    let mut guard = active();
    let active = guard.as_mut().ok_or(SessionError::NotInitialized)?;
    f(&mut active.session)
}

pub fn save_slot(slot: u32) -> Result<(), SessionError> {
    let guard = active();
    let active = guard.as_ref().ok_or(SessionError::NotInitialized)?;
    active.session.save_to(&active.config.slot_path(slot))
}

pub fn load_slot(slot: u32) -> Result<(), SessionError> {
    let mut guard = active();
    let active = guard.as_mut().ok_or(SessionError::NotInitialized)?;
    active.session = MerchantSession::load_from(&active.config.slot_path(slot))?;
    Ok(())
}

/// Replaces the live session wholesale, as done after a hot reload.
pub fn replace(session: MerchantSession) -> Result<(), SessionError> {
    with_session(|current| {
        *current = session;
        Ok(())
    })
}
