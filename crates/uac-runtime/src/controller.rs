//! Event-driven controller
//!
//! Owns the only write path to the rule engine. Every entry point reads a
//! fresh [`State`] snapshot from storage, runs the pure synthesis and
//! resolution logic over it, and applies the result as one atomic update
//! per rule scope.
//!
//! Session-scope writes (tab picks, tab cleanup, tab resync) run one at a
//! time under a shared lock, so a tab's stored pick and its installed rule
//! never diverge. Domain rebuilds are serialized separately.

use std::cell::Cell;

use chrono::{DateTime, Utc};
use futures::lock::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uac_compiler::rule::{HeaderRule, RuleScope};
use uac_compiler::synth::{
    plan_domain_update, plan_session_update, plan_tab_update, synthesize_domain_rules, synthesize_tab_rule,
    synthesize_tab_rules,
};
use uac_core::catalog::{ProfileTable, SpoofList};
use uac_core::effective::{effective_profile_for, render_badge, BadgeStyle};
use uac_core::resolver::RealUserAgent;
use uac_core::settings::{self, ImportReport, SettingsBundle};
use uac_core::types::{is_reserved_id, CustomProfile, DomainSpoof, GlobalMode, State, TabId};

use crate::error::RuntimeError;
use crate::keys::{self, parse_tab_key, tab_key};
use crate::substrate::{BadgeSink, RuleEngine, Storage, StorageMap, SubstrateError, TabInfo, Tabs};

/// Controller settings supplied by the host.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub badge_style: BadgeStyle,
    /// Display name of the reserved `default` profile, localized
    pub default_name: String,
    /// Display name of the reserved `auto` profile, localized
    pub auto_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            badge_style: BadgeStyle::default(),
            default_name: "Default".to_string(),
            auto_name: "Auto".to_string(),
        }
    }
}

pub struct Controller<S, R, T, B> {
    storage: S,
    rules: R,
    tabs: T,
    badge: B,
    real_ua: RealUserAgent,
    config: ControllerConfig,
    /// Held across every session-scope read-plan-write sequence
    session_lock: Mutex<()>,
    domain_lock: Mutex<()>,
    /// Domain rebuild requests issued so far
    domain_requested: Cell<u64>,
    /// Highest request a successful rebuild has covered
    domain_completed: Cell<u64>,
}

impl<S, R, T, B> Controller<S, R, T, B>
where
    S: Storage,
    R: RuleEngine,
    T: Tabs,
    B: BadgeSink,
{
    pub fn new(storage: S, rules: R, tabs: T, badge: B, real_ua: RealUserAgent) -> Self {
        Self::with_config(storage, rules, tabs, badge, real_ua, ControllerConfig::default())
    }

    pub fn with_config(
        storage: S,
        rules: R,
        tabs: T,
        badge: B,
        real_ua: RealUserAgent,
        config: ControllerConfig,
    ) -> Self {
        Self {
            storage,
            rules,
            tabs,
            badge,
            real_ua,
            config,
            session_lock: Mutex::new(()),
            domain_lock: Mutex::new(()),
            domain_requested: Cell::new(0),
            domain_completed: Cell::new(0),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    pub fn badge(&self) -> &B {
        &self.badge
    }

    pub fn real_user_agent(&self) -> &str {
        self.real_ua.get()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Read the current snapshot from storage.
    pub async fn load_state(&self) -> Result<State, RuntimeError> {
        let items = self.storage.get_all().await?;
        state_from_items(&items)
    }

    async fn store<V: Serialize>(&self, key: &str, value: &V) -> Result<(), RuntimeError> {
        let mut items = StorageMap::new();
        items.insert(key.to_string(), encode(key, value)?);
        self.storage.set(items).await?;
        Ok(())
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Install/startup hook: persist the real UA, seed first-run data,
    /// migrate the legacy global key, drop overrides of tabs that no longer
    /// exist, then rebuild both rule scopes and the active badge.
    pub async fn initialize(&self) -> Result<(), RuntimeError> {
        let real_ua = self.real_ua.get().to_string();
        let existing = self
            .storage
            .get(&[
                keys::USER_AGENTS,
                keys::GLOBAL_USER_AGENT,
                keys::LEGACY_ACTIVE_ID,
                keys::DEFAULT_USER_AGENT,
            ])
            .await?;

        let mut writes = StorageMap::new();

        if existing.get(keys::DEFAULT_USER_AGENT).and_then(Value::as_str) != Some(real_ua.as_str()) {
            writes.insert(keys::DEFAULT_USER_AGENT.to_string(), Value::String(real_ua));
        }

        let table = match existing.get(keys::USER_AGENTS) {
            Some(value) if !value.is_null() => {
                let mut table: ProfileTable = decode(&existing, keys::USER_AGENTS)?;
                let before = table.clone();
                table.rename_reserved(&self.config.default_name, &self.config.auto_name);
                (table != before).then_some(table)
            }
            _ => {
                log::info!("seeding default profile table");
                Some(ProfileTable::seeded(&self.config.default_name, &self.config.auto_name))
            }
        };
        if let Some(table) = table {
            writes.insert(keys::USER_AGENTS.to_string(), encode(keys::USER_AGENTS, &table)?);
        }

        let has_global = existing
            .get(keys::GLOBAL_USER_AGENT)
            .and_then(Value::as_str)
            .map_or(false, |s| !s.is_empty());
        if !has_global {
            let legacy = existing
                .get(keys::LEGACY_ACTIVE_ID)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            let global = match legacy {
                Some(id) => {
                    log::info!("migrating legacy active id '{}' to global mode", id);
                    GlobalMode::from(id)
                }
                None => GlobalMode::Default,
            };
            writes.insert(keys::GLOBAL_USER_AGENT.to_string(), encode(keys::GLOBAL_USER_AGENT, &global)?);
        }

        if !writes.is_empty() {
            self.storage.set(writes).await?;
        }

        self.prune_stale_overrides().await?;
        self.resync_domain_rules().await?;
        self.resync_tab_rules().await?;
        self.refresh_all_badges().await
    }

    /// Tab ids do not survive a browser restart; forget picks for tabs that
    /// are not open.
    async fn prune_stale_overrides(&self) -> Result<(), RuntimeError> {
        let open: Vec<TabId> = self.tabs.list().await?.into_iter().map(|t| t.id).collect();
        let items = self.storage.get_all().await?;
        let stale: Vec<&String> = items
            .keys()
            .filter(|key| parse_tab_key(key).map_or(false, |id| !open.contains(&id)))
            .collect();
        if stale.is_empty() {
            return Ok(());
        }
        log::debug!("removing {} stale tab overrides", stale.len());
        let stale: Vec<&str> = stale.iter().map(|k| k.as_str()).collect();
        self.storage.remove(&stale).await?;
        Ok(())
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// A profile was picked in the popup for `tab_id`.
    ///
    /// Reserved picks switch the global mode and clear the tab's own pick;
    /// custom picks pin the profile to the tab.
    pub async fn on_user_agent_picked(&self, profile_id: &str, tab_id: Option<TabId>) -> Result<(), RuntimeError> {
        let tab_id = tab_id.ok_or(RuntimeError::MissingTabId)?;

        if is_reserved_id(profile_id) {
            self.commit_tab_pick(tab_id, None).await?;

            let global = GlobalMode::from(profile_id);
            let stored = self.storage.get(&[keys::GLOBAL_USER_AGENT]).await?;
            let current: GlobalMode = decode(&stored, keys::GLOBAL_USER_AGENT)?;
            if current != global {
                self.store(keys::GLOBAL_USER_AGENT, &global).await?;
                self.resync_domain_rules().await?;
            }
        } else {
            self.commit_tab_pick(tab_id, Some(profile_id)).await?;
        }

        self.update_badge(tab_id).await
    }

    /// Install (or drop, for `None`) the tab's session rule, then record the
    /// pick. The rule engine goes first: a rejected update leaves storage
    /// untouched, and a failed storage write restores the previous rule.
    async fn commit_tab_pick(&self, tab_id: TabId, profile_id: Option<&str>) -> Result<(), RuntimeError> {
        let _session = self.session_lock.lock().await;

        let rule = match profile_id {
            Some(id) => {
                let state = self.load_state().await?;
                let rule = synthesize_tab_rule(tab_id, id, &state.profiles, self.real_ua.get())
                    .ok_or_else(|| RuntimeError::UnknownProfile(id.to_string()))?;
                Some(rule)
            }
            None => None,
        };

        let installed = self.rules.list_rules(RuleScope::Session).await?;
        let previous = installed.iter().find(|r| r.id == tab_id).cloned();
        let update = plan_tab_update(&installed, tab_id, rule);
        if !update.is_empty() {
            self.rules.update_rules(RuleScope::Session, update).await?;
        }

        let key = tab_key(tab_id);
        let written = match profile_id {
            Some(id) => self.store(&key, &id).await,
            None => self.storage.remove(&[key.as_str()]).await.map_err(RuntimeError::from),
        };
        if let Err(e) = written {
            self.restore_tab_rule(tab_id, previous).await;
            return Err(e);
        }
        Ok(())
    }

    async fn restore_tab_rule(&self, tab_id: TabId, previous: Option<HeaderRule>) {
        let restore = async {
            let installed = self.rules.list_rules(RuleScope::Session).await?;
            let undo = plan_tab_update(&installed, tab_id, previous);
            if !undo.is_empty() {
                self.rules.update_rules(RuleScope::Session, undo).await?;
            }
            Ok::<(), SubstrateError>(())
        };
        if let Err(e) = restore.await {
            log::error!("failed to restore session rule for tab {}: {}", tab_id, e);
        }
    }

    /// Storage changed under `changed_keys`.
    pub async fn on_state_changed(&self, changed_keys: &[&str]) -> Result<(), RuntimeError> {
        let mut domain = false;
        let mut tab_rules = false;
        let mut badge = false;
        for key in changed_keys {
            match *key {
                keys::PERMANENT_SPOOFS | keys::GLOBAL_USER_AGENT => domain = true,
                keys::USER_AGENTS => {
                    domain = true;
                    tab_rules = true;
                }
                other => badge |= parse_tab_key(other).is_some(),
            }
        }

        if domain {
            self.resync_domain_rules().await?;
        }
        if tab_rules {
            self.resync_tab_rules().await?;
        }
        if domain || tab_rules || badge {
            self.refresh_active_badge().await?;
        }
        Ok(())
    }

    pub async fn on_tab_activated(&self, tab_id: TabId) -> Result<(), RuntimeError> {
        self.update_badge(tab_id).await
    }

    /// Refresh the badge once an active tab finishes loading.
    pub async fn on_tab_updated(&self, tab_id: TabId, complete: bool) -> Result<(), RuntimeError> {
        if !complete {
            return Ok(());
        }
        match self.tabs.get(tab_id).await? {
            Some(tab) if tab.active => self.render_badge_for(&tab, &self.load_state().await?).await,
            _ => Ok(()),
        }
    }

    /// Forget the closed tab's pick and rule. Failures are logged only.
    pub async fn on_tab_removed(&self, tab_id: TabId) {
        if let Err(e) = self.cleanup_tab(tab_id).await {
            log::error!("failed to clean up closed tab {}: {}", tab_id, e);
        }
    }

    async fn cleanup_tab(&self, tab_id: TabId) -> Result<(), RuntimeError> {
        let _session = self.session_lock.lock().await;
        let key = tab_key(tab_id);
        self.storage.remove(&[key.as_str()]).await?;
        let installed = self.rules.list_rules(RuleScope::Session).await?;
        let update = plan_tab_update(&installed, tab_id, None);
        if !update.is_empty() {
            self.rules.update_rules(RuleScope::Session, update).await?;
            log::debug!("removed session rule for closed tab {}", tab_id);
        }
        Ok(())
    }

    // =========================================================================
    // Rule Resynthesis
    // =========================================================================

    /// Rebuild the persistent domain block.
    ///
    /// Only one rebuild runs at a time; later callers wait their turn. A
    /// waiting caller returns early only if a rebuild that started after its
    /// request has succeeded. Otherwise it runs its own pass, so a failure
    /// is reported to every caller whose change it leaves uninstalled.
    pub async fn resync_domain_rules(&self) -> Result<(), RuntimeError> {
        let ticket = self.domain_requested.get() + 1;
        self.domain_requested.set(ticket);

        let _rebuild = self.domain_lock.lock().await;
        if self.domain_completed.get() >= ticket {
            log::debug!("domain rebuild request {} already covered", ticket);
            return Ok(());
        }

        let covers = self.domain_requested.get();
        self.sync_domain_rules_once().await?;
        self.domain_completed.set(covers.max(self.domain_completed.get()));
        Ok(())
    }

    async fn sync_domain_rules_once(&self) -> Result<(), RuntimeError> {
        let state = self.load_state().await?;
        let desired = synthesize_domain_rules(&state, self.real_ua.get());
        let installed = self.rules.list_rules(RuleScope::Persistent).await?;
        let count = desired.len();
        let update = plan_domain_update(&installed, desired);
        if !update.is_empty() {
            self.rules.update_rules(RuleScope::Persistent, update).await?;
            log::debug!("installed {} domain rules", count);
        }
        Ok(())
    }

    /// Reconcile session rules with the stored tab picks.
    pub async fn resync_tab_rules(&self) -> Result<(), RuntimeError> {
        let _session = self.session_lock.lock().await;
        let state = self.load_state().await?;
        let desired = synthesize_tab_rules(&state, self.real_ua.get());
        let installed = self.rules.list_rules(RuleScope::Session).await?;
        let update = plan_session_update(&installed, desired);
        if !update.is_empty() {
            self.rules.update_rules(RuleScope::Session, update).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Badge
    // =========================================================================

    pub async fn update_badge(&self, tab_id: TabId) -> Result<(), RuntimeError> {
        let state = self.load_state().await?;
        let tab = self.tabs.get(tab_id).await?.unwrap_or(TabInfo {
            id: tab_id,
            url: None,
            active: false,
        });
        self.render_badge_for(&tab, &state).await
    }

    pub async fn refresh_active_badge(&self) -> Result<(), RuntimeError> {
        match self.tabs.active_tab().await? {
            Some(tab) => self.render_badge_for(&tab, &self.load_state().await?).await,
            None => Ok(()),
        }
    }

    /// Repaint the badge of every open tab.
    pub async fn refresh_all_badges(&self) -> Result<(), RuntimeError> {
        let state = self.load_state().await?;
        for tab in self.tabs.list().await? {
            self.render_badge_for(&tab, &state).await?;
        }
        Ok(())
    }

    async fn render_badge_for(&self, tab: &TabInfo, state: &State) -> Result<(), RuntimeError> {
        let effective = effective_profile_for(tab.id, tab.url.as_deref(), state);
        let badge = render_badge(&effective, &self.config.badge_style);

        self.badge.set_text(tab.id, &badge.text).await?;
        if let Some(color) = &badge.color {
            self.badge.set_color(tab.id, color).await?;
        }
        self.badge.set_title(tab.id, &badge.title).await?;
        Ok(())
    }

    // =========================================================================
    // Management
    // =========================================================================

    /// Validate and store a new custom profile.
    pub async fn add_profile(&self, draft: CustomProfile) -> Result<CustomProfile, RuntimeError> {
        let mut state = self.load_state().await?;
        let profile = state.profiles.add(draft)?;
        self.store(keys::USER_AGENTS, &state.profiles).await?;
        self.on_state_changed(&[keys::USER_AGENTS]).await?;
        Ok(profile)
    }

    pub async fn remove_profile(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.load_state().await?;
        state.profiles.remove(id)?;
        self.store(keys::USER_AGENTS, &state.profiles).await?;
        self.on_state_changed(&[keys::USER_AGENTS]).await
    }

    /// Validate and store a new domain spoof.
    pub async fn add_spoof(&self, draft: DomainSpoof) -> Result<DomainSpoof, RuntimeError> {
        let mut state = self.load_state().await?;
        let spoof = state.spoofs.add(draft, &state.profiles)?.clone();
        self.store(keys::PERMANENT_SPOOFS, &state.spoofs).await?;
        self.on_state_changed(&[keys::PERMANENT_SPOOFS]).await?;
        Ok(spoof)
    }

    pub async fn remove_spoof(&self, id: &str) -> Result<bool, RuntimeError> {
        let mut state = self.load_state().await?;
        if state.spoofs.remove(id).is_none() {
            return Ok(false);
        }
        self.store(keys::PERMANENT_SPOOFS, &state.spoofs).await?;
        self.on_state_changed(&[keys::PERMANENT_SPOOFS]).await?;
        Ok(true)
    }

    pub async fn set_spoof_enabled(&self, id: &str, enabled: bool) -> Result<bool, RuntimeError> {
        let mut state = self.load_state().await?;
        if !state.spoofs.set_enabled(id, enabled) {
            return Ok(false);
        }
        self.store(keys::PERMANENT_SPOOFS, &state.spoofs).await?;
        self.on_state_changed(&[keys::PERMANENT_SPOOFS]).await?;
        Ok(true)
    }

    pub async fn export_settings(&self, version: &str, exported_at: DateTime<Utc>) -> Result<SettingsBundle, RuntimeError> {
        let state = self.load_state().await?;
        Ok(settings::export_settings(
            &state.profiles,
            &state.spoofs,
            &state.global,
            version,
            exported_at,
        ))
    }

    /// Merge a settings bundle into storage and rebuild what changed.
    pub async fn import_settings(&self, json: &str) -> Result<ImportReport, RuntimeError> {
        let bundle = settings::parse_bundle(json)?;
        let mut state = self.load_state().await?;
        let report = settings::import_settings(&bundle, &mut state.profiles, &mut state.spoofs, &mut state.global);

        let mut items = StorageMap::new();
        let mut changed = Vec::new();
        if report.profiles_added > 0 {
            items.insert(keys::USER_AGENTS.to_string(), encode(keys::USER_AGENTS, &state.profiles)?);
            changed.push(keys::USER_AGENTS);
        }
        if report.spoofs_added > 0 {
            items.insert(keys::PERMANENT_SPOOFS.to_string(), encode(keys::PERMANENT_SPOOFS, &state.spoofs)?);
            changed.push(keys::PERMANENT_SPOOFS);
        }
        if report.global_updated {
            items.insert(keys::GLOBAL_USER_AGENT.to_string(), encode(keys::GLOBAL_USER_AGENT, &state.global)?);
            changed.push(keys::GLOBAL_USER_AGENT);
        }
        if !items.is_empty() {
            self.storage.set(items).await?;
            self.on_state_changed(&changed).await?;
        }
        Ok(report)
    }
}

/// Build a [`State`] from a full storage snapshot.
pub fn state_from_items(items: &StorageMap) -> Result<State, RuntimeError> {
    let profiles: ProfileTable = decode(items, keys::USER_AGENTS)?;
    let spoofs: SpoofList = decode(items, keys::PERMANENT_SPOOFS)?;
    let global: GlobalMode = decode(items, keys::GLOBAL_USER_AGENT)?;

    let mut state = State::new(profiles, spoofs, global);
    for (key, value) in items {
        let Some(tab_id) = parse_tab_key(key) else {
            continue;
        };
        match value.as_str() {
            Some(id) if !id.is_empty() => {
                state.tab_overrides.insert(tab_id, id.to_string());
            }
            _ => log::warn!("ignoring malformed override under '{}'", key),
        }
    }
    Ok(state)
}

fn decode<V: DeserializeOwned + Default>(items: &StorageMap, key: &str) -> Result<V, RuntimeError> {
    match items.get(key) {
        None | Some(Value::Null) => Ok(V::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|source| RuntimeError::Decode {
            key: key.to_string(),
            source,
        }),
    }
}

fn encode<V: Serialize + ?Sized>(key: &str, value: &V) -> Result<Value, RuntimeError> {
    serde_json::to_value(value).map_err(|source| RuntimeError::Encode {
        key: key.to_string(),
        source,
    })
}
