//! Browser substrates the controller drives
//!
//! Each trait mirrors one extension API surface. Implementations live on
//! the JS side (through the wasm bindings) or in [`crate::memory`] for tests
//! and the CLI.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uac_compiler::rule::{HeaderRule, RuleScope, RuleUpdate};
use uac_core::types::TabId;

/// Key-value snapshot as returned by the storage area.
pub type StorageMap = Map<String, Value>;

/// Error type for substrate calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstrateError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Rule engine error: {0}")]
    Rules(String),
    #[error("Tabs error: {0}")]
    Tabs(String),
    #[error("Badge error: {0}")]
    Badge(String),
}

/// Local key-value storage area.
#[async_trait(?Send)]
pub trait Storage {
    /// Values for `keys`; absent keys are simply missing from the map.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, SubstrateError>;
    async fn get_all(&self) -> Result<StorageMap, SubstrateError>;
    async fn set(&self, items: StorageMap) -> Result<(), SubstrateError>;
    async fn remove(&self, keys: &[&str]) -> Result<(), SubstrateError>;
}

/// Declarative request-rule engine.
#[async_trait(?Send)]
pub trait RuleEngine {
    /// Apply removals then additions to one scope, all or nothing.
    async fn update_rules(&self, scope: RuleScope, update: RuleUpdate) -> Result<(), SubstrateError>;
    async fn list_rules(&self, scope: RuleScope) -> Result<Vec<HeaderRule>, SubstrateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: Option<String>,
    pub active: bool,
}

/// Tab queries.
#[async_trait(?Send)]
pub trait Tabs {
    /// Active tab of the focused window.
    async fn active_tab(&self) -> Result<Option<TabInfo>, SubstrateError>;
    async fn get(&self, tab_id: TabId) -> Result<Option<TabInfo>, SubstrateError>;
    /// Every open tab.
    async fn list(&self) -> Result<Vec<TabInfo>, SubstrateError>;
}

/// Toolbar badge, set per tab.
#[async_trait(?Send)]
pub trait BadgeSink {
    async fn set_text(&self, tab_id: TabId, text: &str) -> Result<(), SubstrateError>;
    async fn set_color(&self, tab_id: TabId, color: &str) -> Result<(), SubstrateError>;
    async fn set_title(&self, tab_id: TabId, title: &str) -> Result<(), SubstrateError>;
}
