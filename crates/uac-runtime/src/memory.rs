//! In-memory substrates
//!
//! Single-threaded stand-ins for the browser APIs, used by the CLI
//! simulator and the tests. Handles are cheap clones sharing one state, so
//! a caller can keep a handle after moving another into a controller.
//! The rule engine rejects the same inputs the browser does (duplicate ids,
//! `tabIds` outside the session scope) and yields once per call so
//! concurrent callers interleave the way they would on a real event loop.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde_json::Value;
use uac_compiler::rule::{HeaderRule, RuleScope, RuleUpdate};
use uac_core::effective::Badge;
use uac_core::types::TabId;

use crate::substrate::{BadgeSink, RuleEngine, Storage, StorageMap, SubstrateError, TabInfo, Tabs};

/// Resolves on its second poll.
#[derive(Debug, Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

fn yield_now() -> YieldNow {
    YieldNow::default()
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<StorageMap>>,
    failing: Rc<Cell<bool>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: StorageMap) -> Self {
        Self {
            items: Rc::new(RefCell::new(items)),
            failing: Rc::default(),
        }
    }

    /// Make every subsequent call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.items.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.items.borrow_mut().insert(key.to_string(), value);
    }

    pub fn snapshot(&self) -> StorageMap {
        self.items.borrow().clone()
    }

    fn check(&self) -> Result<(), SubstrateError> {
        if self.failing.get() {
            return Err(SubstrateError::Storage("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Storage for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, SubstrateError> {
        self.check()?;
        let items = self.items.borrow();
        Ok(keys
            .iter()
            .filter_map(|k| items.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<StorageMap, SubstrateError> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn set(&self, items: StorageMap) -> Result<(), SubstrateError> {
        self.check()?;
        self.items.borrow_mut().extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), SubstrateError> {
        self.check()?;
        let mut items = self.items.borrow_mut();
        for key in keys {
            items.remove(*key);
        }
        Ok(())
    }
}

// =============================================================================
// Rule Engine
// =============================================================================

#[derive(Debug, Default)]
struct RuleScopes {
    session: Vec<HeaderRule>,
    persistent: Vec<HeaderRule>,
    updates: Vec<(RuleScope, RuleUpdate)>,
    failing: bool,
}

impl RuleScopes {
    fn scope(&self, scope: RuleScope) -> &Vec<HeaderRule> {
        match scope {
            RuleScope::Session => &self.session,
            RuleScope::Persistent => &self.persistent,
        }
    }

    fn scope_mut(&mut self, scope: RuleScope) -> &mut Vec<HeaderRule> {
        match scope {
            RuleScope::Session => &mut self.session,
            RuleScope::Persistent => &mut self.persistent,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRuleEngine {
    inner: Rc<RefCell<RuleScopes>>,
}

impl MemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed rules of `scope`, sorted by id.
    pub fn rules(&self, scope: RuleScope) -> Vec<HeaderRule> {
        self.inner.borrow().scope(scope).clone()
    }

    /// Make every subsequent update fail.
    pub fn set_failing(&self, failing: bool) {
        self.inner.borrow_mut().failing = failing;
    }

    /// Every accepted update, oldest first.
    pub fn updates(&self) -> Vec<(RuleScope, RuleUpdate)> {
        self.inner.borrow().updates.clone()
    }

    fn validate(current: &[HeaderRule], scope: RuleScope, update: &RuleUpdate) -> Result<(), SubstrateError> {
        let mut ids: Vec<i32> = current
            .iter()
            .map(|r| r.id)
            .filter(|id| !update.remove.contains(id))
            .collect();
        for rule in &update.add {
            if ids.contains(&rule.id) {
                return Err(SubstrateError::Rules(format!("Rule with id {} does not have a unique ID", rule.id)));
            }
            if scope == RuleScope::Persistent && rule.condition.tab_ids.is_some() {
                return Err(SubstrateError::Rules(format!(
                    "Rule with id {}: tabIds is only supported for session rules",
                    rule.id
                )));
            }
            ids.push(rule.id);
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl RuleEngine for MemoryRuleEngine {
    async fn update_rules(&self, scope: RuleScope, update: RuleUpdate) -> Result<(), SubstrateError> {
        yield_now().await;
        let mut inner = self.inner.borrow_mut();
        if inner.failing {
            return Err(SubstrateError::Rules("rule engine unavailable".to_string()));
        }
        Self::validate(inner.scope(scope), scope, &update)?;
        update.apply_to(inner.scope_mut(scope));
        inner.updates.push((scope, update));
        Ok(())
    }

    async fn list_rules(&self, scope: RuleScope) -> Result<Vec<HeaderRule>, SubstrateError> {
        yield_now().await;
        Ok(self.rules(scope))
    }
}

// =============================================================================
// Tabs
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryTabs {
    tabs: Rc<RefCell<BTreeMap<TabId, TabInfo>>>,
}

impl MemoryTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a tab and make it the active one.
    pub fn open(&self, tab_id: TabId, url: &str) {
        self.tabs.borrow_mut().insert(
            tab_id,
            TabInfo {
                id: tab_id,
                url: Some(url.to_string()),
                active: false,
            },
        );
        self.activate(tab_id);
    }

    pub fn activate(&self, tab_id: TabId) {
        for tab in self.tabs.borrow_mut().values_mut() {
            tab.active = tab.id == tab_id;
        }
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.tabs.borrow().values().find(|t| t.active).map(|t| t.id)
    }

    pub fn navigate(&self, tab_id: TabId, url: &str) {
        if let Some(tab) = self.tabs.borrow_mut().get_mut(&tab_id) {
            tab.url = Some(url.to_string());
        }
    }

    pub fn close(&self, tab_id: TabId) {
        self.tabs.borrow_mut().remove(&tab_id);
    }
}

#[async_trait(?Send)]
impl Tabs for MemoryTabs {
    async fn active_tab(&self) -> Result<Option<TabInfo>, SubstrateError> {
        Ok(self.tabs.borrow().values().find(|t| t.active).cloned())
    }

    async fn get(&self, tab_id: TabId) -> Result<Option<TabInfo>, SubstrateError> {
        Ok(self.tabs.borrow().get(&tab_id).cloned())
    }

    async fn list(&self) -> Result<Vec<TabInfo>, SubstrateError> {
        Ok(self.tabs.borrow().values().cloned().collect())
    }
}

// =============================================================================
// Badge
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryBadge {
    badges: Rc<RefCell<BTreeMap<TabId, Badge>>>,
}

impl MemoryBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tab_id: TabId) -> Option<Badge> {
        self.badges.borrow().get(&tab_id).cloned()
    }

    fn with_badge(&self, tab_id: TabId, f: impl FnOnce(&mut Badge)) {
        let mut badges = self.badges.borrow_mut();
        let badge = badges.entry(tab_id).or_insert_with(|| Badge {
            text: String::new(),
            color: None,
            title: String::new(),
        });
        f(badge);
    }
}

#[async_trait(?Send)]
impl BadgeSink for MemoryBadge {
    async fn set_text(&self, tab_id: TabId, text: &str) -> Result<(), SubstrateError> {
        self.with_badge(tab_id, |b| b.text = text.to_string());
        Ok(())
    }

    async fn set_color(&self, tab_id: TabId, color: &str) -> Result<(), SubstrateError> {
        self.with_badge(tab_id, |b| b.color = Some(color.to_string()));
        Ok(())
    }

    async fn set_title(&self, tab_id: TabId, title: &str) -> Result<(), SubstrateError> {
        self.with_badge(tab_id, |b| b.title = title.to_string());
        Ok(())
    }
}
