//! UA Changer Runtime
//!
//! This crate connects the pure core to the browser: it reacts to popup
//! picks, storage changes and tab events, and keeps the rule engine and the
//! toolbar badge in step with the stored settings.
//!
//! # Modules
//!
//! - `substrate`: Async traits over storage, rule engine, tabs and badge
//! - `controller`: Event entry points and serialized rule resynthesis
//! - `memory`: In-memory substrates for tests and the CLI
//! - `keys`: Storage key names

pub mod controller;
pub mod error;
pub mod keys;
pub mod memory;
pub mod substrate;

pub use controller::{state_from_items, Controller, ControllerConfig};
pub use error::RuntimeError;
pub use memory::{MemoryBadge, MemoryRuleEngine, MemoryStorage, MemoryTabs};
pub use substrate::{BadgeSink, RuleEngine, Storage, StorageMap, SubstrateError, TabInfo, Tabs};

/// Controller wired to the in-memory substrates.
pub type MemoryController = Controller<MemoryStorage, MemoryRuleEngine, MemoryTabs, MemoryBadge>;

impl MemoryController {
    pub fn in_memory(real_ua: uac_core::resolver::RealUserAgent) -> Self {
        Controller::new(
            MemoryStorage::new(),
            MemoryRuleEngine::new(),
            MemoryTabs::new(),
            MemoryBadge::new(),
            real_ua,
        )
    }
}
