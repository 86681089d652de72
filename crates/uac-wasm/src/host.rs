//! Controller bindings
//!
//! The service worker hands in a host object wrapping the extension APIs;
//! every host method returns a Promise. [`JsHost`] adapts that object to
//! the runtime's substrate traits, and [`UaChanger`] exposes the controller
//! entry points so the worker only forwards browser events.

use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Promise, Reflect};
use uac_compiler::rule::{HeaderRule, RuleScope, RuleUpdate};
use uac_core::resolver::RealUserAgent;
use uac_core::types::{DomainSpoof, Profile, TabId};
use uac_runtime::{
    BadgeSink, Controller, ControllerConfig, RuleEngine, Storage, StorageMap, SubstrateError, TabInfo, Tabs,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

use crate::{from_js, js_error, navigator_user_agent, to_js};

#[wasm_bindgen(typescript_custom_section)]
const HOST_TS: &'static str = r#"
export interface UaChangerHost {
  storageGet(keys: string[]): Promise<Record<string, unknown>>;
  storageGetAll(): Promise<Record<string, unknown>>;
  storageSet(items: Record<string, unknown>): Promise<void>;
  storageRemove(keys: string[]): Promise<void>;
  updateRules(scope: "session" | "persistent", update: { removeRuleIds?: number[]; addRules?: object[] }): Promise<void>;
  listRules(scope: "session" | "persistent"): Promise<object[]>;
  activeTab(): Promise<{ id: number; url?: string; active: boolean } | null>;
  getTab(tabId: number): Promise<{ id: number; url?: string; active: boolean } | null>;
  listTabs(): Promise<{ id: number; url?: string; active: boolean }[]>;
  setBadgeText(tabId: number, text: string): Promise<void>;
  setBadgeColor(tabId: number, color: string): Promise<void>;
  setBadgeTitle(tabId: number, title: string): Promise<void>;
}
"#;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(typescript_type = "UaChangerHost")]
    pub type Host;

    #[wasm_bindgen(method, catch, js_name = storageGet)]
    fn storage_get(this: &Host, keys: Array) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = storageGetAll)]
    fn storage_get_all(this: &Host) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = storageSet)]
    fn storage_set(this: &Host, items: JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = storageRemove)]
    fn storage_remove(this: &Host, keys: Array) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = updateRules)]
    fn update_rules(this: &Host, scope: &str, update: JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = listRules)]
    fn list_rules(this: &Host, scope: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = activeTab)]
    fn active_tab(this: &Host) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = getTab)]
    fn get_tab(this: &Host, tab_id: TabId) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = listTabs)]
    fn list_tabs(this: &Host) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = setBadgeText)]
    fn set_badge_text(this: &Host, tab_id: TabId, text: &str) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = setBadgeColor)]
    fn set_badge_color(this: &Host, tab_id: TabId, color: &str) -> Result<Promise, JsValue>;
    #[wasm_bindgen(method, catch, js_name = setBadgeTitle)]
    fn set_badge_title(this: &Host, tab_id: TabId, title: &str) -> Result<Promise, JsValue>;
}

// =============================================================================
// Promise Plumbing
// =============================================================================

fn describe(e: &JsValue) -> String {
    if let Some(s) = e.as_string() {
        return s;
    }
    Reflect::get(e, &"message".into())
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{:?}", e))
}

/// Await a host call, whether it throws or rejects.
async fn settle(call: Result<Promise, JsValue>) -> Result<JsValue, String> {
    let promise = call.map_err(|e| describe(&e))?;
    JsFuture::from(promise).await.map_err(|e| describe(&e))
}

fn key_array(keys: &[&str]) -> Array {
    keys.iter().map(|k| JsValue::from_str(k)).collect()
}

fn scope_name(scope: RuleScope) -> &'static str {
    match scope {
        RuleScope::Session => "session",
        RuleScope::Persistent => "persistent",
    }
}

fn is_nothing(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

fn map_from_js(value: &JsValue) -> Result<StorageMap, String> {
    if is_nothing(value) {
        return Ok(StorageMap::new());
    }
    from_js(value, "storage items").map_err(|e| describe(&e))
}

fn tab_from_js(value: &JsValue) -> Result<Option<TabInfo>, String> {
    if is_nothing(value) {
        return Ok(None);
    }
    let id = Reflect::get(value, &"id".into())
        .ok()
        .and_then(|v| v.as_f64())
        .ok_or_else(|| "tab without a numeric id".to_string())?;
    let url = Reflect::get(value, &"url".into()).ok().and_then(|v| v.as_string());
    let active = Reflect::get(value, &"active".into())
        .ok()
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok(Some(TabInfo {
        id: id as TabId,
        url,
        active,
    }))
}

// =============================================================================
// Substrates
// =============================================================================

/// Substrate adapter over a JS [`Host`]; clones share the same object.
#[derive(Clone)]
pub struct JsHost {
    host: Rc<Host>,
}

impl JsHost {
    pub fn new(host: Host) -> Self {
        Self { host: Rc::new(host) }
    }
}

#[async_trait(?Send)]
impl Storage for JsHost {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, SubstrateError> {
        let value = settle(self.host.storage_get(key_array(keys)))
            .await
            .map_err(SubstrateError::Storage)?;
        map_from_js(&value).map_err(SubstrateError::Storage)
    }

    async fn get_all(&self) -> Result<StorageMap, SubstrateError> {
        let value = settle(self.host.storage_get_all()).await.map_err(SubstrateError::Storage)?;
        map_from_js(&value).map_err(SubstrateError::Storage)
    }

    async fn set(&self, items: StorageMap) -> Result<(), SubstrateError> {
        let items = to_js(&items).map_err(|e| SubstrateError::Storage(describe(&e)))?;
        settle(self.host.storage_set(items)).await.map_err(SubstrateError::Storage)?;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), SubstrateError> {
        settle(self.host.storage_remove(key_array(keys)))
            .await
            .map_err(SubstrateError::Storage)?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl RuleEngine for JsHost {
    async fn update_rules(&self, scope: RuleScope, update: RuleUpdate) -> Result<(), SubstrateError> {
        let update = to_js(&update).map_err(|e| SubstrateError::Rules(describe(&e)))?;
        settle(self.host.update_rules(scope_name(scope), update))
            .await
            .map_err(SubstrateError::Rules)?;
        Ok(())
    }

    async fn list_rules(&self, scope: RuleScope) -> Result<Vec<HeaderRule>, SubstrateError> {
        let value = settle(self.host.list_rules(scope_name(scope)))
            .await
            .map_err(SubstrateError::Rules)?;
        if is_nothing(&value) {
            return Ok(Vec::new());
        }
        from_js(&value, "rule list").map_err(|e| SubstrateError::Rules(describe(&e)))
    }
}

#[async_trait(?Send)]
impl Tabs for JsHost {
    async fn active_tab(&self) -> Result<Option<TabInfo>, SubstrateError> {
        let value = settle(self.host.active_tab()).await.map_err(SubstrateError::Tabs)?;
        tab_from_js(&value).map_err(SubstrateError::Tabs)
    }

    async fn get(&self, tab_id: TabId) -> Result<Option<TabInfo>, SubstrateError> {
        let value = settle(self.host.get_tab(tab_id)).await.map_err(SubstrateError::Tabs)?;
        tab_from_js(&value).map_err(SubstrateError::Tabs)
    }

    async fn list(&self) -> Result<Vec<TabInfo>, SubstrateError> {
        let value = settle(self.host.list_tabs()).await.map_err(SubstrateError::Tabs)?;
        if !Array::is_array(&value) {
            return Err(SubstrateError::Tabs("listTabs did not return an array".to_string()));
        }
        let mut tabs = Vec::new();
        for item in Array::from(&value).iter() {
            if let Some(tab) = tab_from_js(&item).map_err(SubstrateError::Tabs)? {
                tabs.push(tab);
            }
        }
        Ok(tabs)
    }
}

#[async_trait(?Send)]
impl BadgeSink for JsHost {
    async fn set_text(&self, tab_id: TabId, text: &str) -> Result<(), SubstrateError> {
        settle(self.host.set_badge_text(tab_id, text))
            .await
            .map_err(SubstrateError::Badge)?;
        Ok(())
    }

    async fn set_color(&self, tab_id: TabId, color: &str) -> Result<(), SubstrateError> {
        settle(self.host.set_badge_color(tab_id, color))
            .await
            .map_err(SubstrateError::Badge)?;
        Ok(())
    }

    async fn set_title(&self, tab_id: TabId, title: &str) -> Result<(), SubstrateError> {
        settle(self.host.set_badge_title(tab_id, title))
            .await
            .map_err(SubstrateError::Badge)?;
        Ok(())
    }
}

// =============================================================================
// Exported Controller
// =============================================================================

type HostController = Controller<JsHost, JsHost, JsHost, JsHost>;

/// Event-driven controller for the service worker. Every method returns a
/// Promise; rejections carry the error message.
#[wasm_bindgen]
pub struct UaChanger {
    controller: Rc<HostController>,
}

impl UaChanger {
    fn run<F, Fut>(&self, f: F) -> Promise
    where
        F: FnOnce(Rc<HostController>) -> Fut,
        Fut: Future<Output = Result<JsValue, JsValue>> + 'static,
    {
        future_to_promise(f(Rc::clone(&self.controller)))
    }
}

#[wasm_bindgen]
impl UaChanger {
    /// `default_name`/`auto_name` are the localized labels of the reserved
    /// profiles.
    #[wasm_bindgen(constructor)]
    pub fn new(host: Host, default_name: Option<String>, auto_name: Option<String>) -> UaChanger {
        let host = JsHost::new(host);
        let mut config = ControllerConfig::default();
        if let Some(name) = default_name {
            config.default_name = name;
        }
        if let Some(name) = auto_name {
            config.auto_name = name;
        }
        let controller = Controller::with_config(
            host.clone(),
            host.clone(),
            host.clone(),
            host,
            RealUserAgent::new(navigator_user_agent),
            config,
        );
        UaChanger {
            controller: Rc::new(controller),
        }
    }

    /// Install/startup hook.
    pub fn initialize(&self) -> Promise {
        self.run(|c| async move {
            c.initialize().await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onUserAgentPicked)]
    pub fn on_user_agent_picked(&self, profile_id: String, tab_id: Option<TabId>) -> Promise {
        self.run(|c| async move {
            c.on_user_agent_picked(&profile_id, tab_id).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Forward `storage.onChanged` with the changed key names.
    #[wasm_bindgen(js_name = onStateChanged)]
    pub fn on_state_changed(&self, keys: Vec<String>) -> Promise {
        self.run(|c| async move {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            c.on_state_changed(&keys).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabActivated)]
    pub fn on_tab_activated(&self, tab_id: TabId) -> Promise {
        self.run(|c| async move {
            c.on_tab_activated(tab_id).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabUpdated)]
    pub fn on_tab_updated(&self, tab_id: TabId, complete: bool) -> Promise {
        self.run(|c| async move {
            c.on_tab_updated(tab_id, complete).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Never rejects; cleanup failures are logged.
    #[wasm_bindgen(js_name = onTabRemoved)]
    pub fn on_tab_removed(&self, tab_id: TabId) -> Promise {
        self.run(|c| async move {
            c.on_tab_removed(tab_id).await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Validate and store a profile given as a `userAgents` entry.
    #[wasm_bindgen(js_name = addProfile)]
    pub fn add_profile(&self, draft: JsValue) -> Promise {
        let draft: Result<Profile, JsValue> = from_js(&draft, "profile");
        self.run(|c| async move {
            let Profile::Custom(draft) = draft? else {
                return Err(JsValue::from_str("Reserved profiles cannot be added"));
            };
            let added = c.add_profile(draft).await.map_err(js_error)?;
            to_js(&Profile::Custom(added))
        })
    }

    #[wasm_bindgen(js_name = removeProfile)]
    pub fn remove_profile(&self, id: String) -> Promise {
        self.run(|c| async move {
            c.remove_profile(&id).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = addSpoof)]
    pub fn add_spoof(&self, draft: JsValue) -> Promise {
        let draft: Result<DomainSpoof, JsValue> = from_js(&draft, "spoof");
        self.run(|c| async move {
            let added = c.add_spoof(draft?).await.map_err(js_error)?;
            to_js(&added)
        })
    }

    /// Resolves to whether a spoof was removed.
    #[wasm_bindgen(js_name = removeSpoof)]
    pub fn remove_spoof(&self, id: String) -> Promise {
        self.run(|c| async move {
            let removed = c.remove_spoof(&id).await.map_err(js_error)?;
            Ok(JsValue::from_bool(removed))
        })
    }

    #[wasm_bindgen(js_name = setSpoofEnabled)]
    pub fn set_spoof_enabled(&self, id: String, enabled: bool) -> Promise {
        self.run(|c| async move {
            let found = c.set_spoof_enabled(&id, enabled).await.map_err(js_error)?;
            Ok(JsValue::from_bool(found))
        })
    }

    /// Resolves to the pretty-printed settings bundle.
    #[wasm_bindgen(js_name = exportSettings)]
    pub fn export_settings(&self, version: String) -> Promise {
        self.run(|c| async move {
            let bundle = c
                .export_settings(&version, crate::now()?)
                .await
                .map_err(js_error)?;
            let json = bundle.to_json_pretty().map_err(js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    /// Resolves to `{profilesAdded, profilesSkipped, spoofsAdded,
    /// spoofsSkipped, globalUpdated}`.
    #[wasm_bindgen(js_name = importSettings)]
    pub fn import_settings(&self, json: String) -> Promise {
        self.run(|c| async move {
            let report = c.import_settings(&json).await.map_err(js_error)?;
            to_js(&report)
        })
    }
}
