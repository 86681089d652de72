//! WebAssembly bindings for UA Changer
//!
//! Two surfaces:
//!
//! - [`UaChanger`] runs the whole controller. The service worker passes in
//!   a host object wrapping `storage`, `declarativeNetRequest`, `tabs` and
//!   `action`, then forwards browser events to it.
//! - Free functions take a plain storage snapshot (the object returned by
//!   `storage.local.get(null)`) and return JSON-shaped results, for the
//!   popup and options pages.

mod console;
mod host;

pub use host::{Host, JsHost, UaChanger};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use uac_compiler::rule::HeaderRule;
use uac_compiler::synth;
use uac_core::effective::{effective_profile_for, render_badge, BadgeStyle};
use uac_core::resolver::{resolve, RealUserAgent};
use uac_core::settings::{self, ImportReport};
use uac_core::types::{ComposeMode, CustomProfile, DomainSpoof, GlobalMode, Profile, State, TabId};
use uac_runtime::{state_from_items, StorageMap};
use wasm_bindgen::prelude::*;

thread_local! {
    static REAL_UA: RealUserAgent = RealUserAgent::new(navigator_user_agent);
}

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    console::init(log::LevelFilter::Info);
}

#[wasm_bindgen]
pub fn set_log_level(level: &str) {
    console::init(console::parse_level(level));
}

// =============================================================================
// JS Conversion
// =============================================================================

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(js_error)?;
    js_sys::JSON::parse(&json)
}

fn from_js<T: serde::de::DeserializeOwned>(value: &JsValue, what: &str) -> Result<T, JsValue> {
    let json: String = js_sys::JSON::stringify(value)
        .map_err(|_| JsValue::from_str(&format!("{} is not serializable", what)))?
        .into();
    serde_json::from_str(&json).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

fn storage_from_js(storage: &JsValue) -> Result<StorageMap, JsValue> {
    if storage.is_undefined() || storage.is_null() {
        return Ok(StorageMap::new());
    }
    from_js(storage, "storage snapshot")
}

fn state_from_js(storage: &JsValue) -> Result<State, JsValue> {
    state_from_items(&storage_from_js(storage)?).map_err(js_error)
}

fn rules_from_js(rules: &JsValue) -> Result<Vec<HeaderRule>, JsValue> {
    if rules.is_undefined() || rules.is_null() {
        return Ok(Vec::new());
    }
    from_js(rules, "rule list")
}

// =============================================================================
// Real User-Agent
// =============================================================================

fn navigator_user_agent() -> Option<String> {
    let navigator = js_sys::Reflect::get(&js_sys::global(), &"navigator".into()).ok()?;
    if navigator.is_undefined() {
        return None;
    }
    js_sys::Reflect::get(&navigator, &"userAgent".into()).ok()?.as_string()
}

/// The worker's own UA, read once and cached for the worker's lifetime.
#[wasm_bindgen]
pub fn real_user_agent() -> String {
    REAL_UA.with(|ua| ua.get().to_string())
}

// =============================================================================
// Matching & Compilation
// =============================================================================

#[wasm_bindgen]
pub fn url_matches(url: &str, pattern: &str) -> bool {
    uac_core::matcher::matches(url, pattern)
}

#[wasm_bindgen]
pub fn compile_pattern(pattern: &str) -> String {
    uac_compiler::pattern::compile(pattern)
}

#[wasm_bindgen]
pub fn resolve_user_agent(profile_id: &str, storage: JsValue) -> Result<Option<String>, JsValue> {
    let state = state_from_js(&storage)?;
    Ok(REAL_UA.with(|ua| resolve(profile_id, &state.profiles, ua.get())))
}

// =============================================================================
// Rule Synthesis
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleSetView<'a> {
    tab_rules: &'a [HeaderRule],
    domain_rules: &'a [HeaderRule],
}

/// Every rule the snapshot calls for: `{tabRules, domainRules}`.
#[wasm_bindgen]
pub fn synthesize_rules(storage: JsValue) -> Result<JsValue, JsValue> {
    let state = state_from_js(&storage)?;
    let rules = REAL_UA.with(|ua| synth::synthesize(&state, ua.get()));
    to_js(&RuleSetView {
        tab_rules: &rules.tab_rules,
        domain_rules: &rules.domain_rules,
    })
}

/// Argument for `updateDynamicRules`: swap the installed domain block for
/// the one the snapshot calls for.
#[wasm_bindgen]
pub fn plan_domain_update(storage: JsValue, installed: JsValue) -> Result<JsValue, JsValue> {
    let state = state_from_js(&storage)?;
    let installed = rules_from_js(&installed)?;
    let desired = REAL_UA.with(|ua| synth::synthesize_domain_rules(&state, ua.get()));
    to_js(&synth::plan_domain_update(&installed, desired))
}

/// Argument for `updateSessionRules` after a pick on `tab_id`.
#[wasm_bindgen]
pub fn plan_tab_update(storage: JsValue, installed: JsValue, tab_id: TabId) -> Result<JsValue, JsValue> {
    let state = state_from_js(&storage)?;
    let installed = rules_from_js(&installed)?;
    let desired = state.tab_overrides.get(&tab_id).and_then(|profile_id| {
        REAL_UA.with(|ua| synth::synthesize_tab_rule(tab_id, profile_id, &state.profiles, ua.get()))
    });
    to_js(&synth::plan_tab_update(&installed, tab_id, desired))
}

/// Argument for `updateSessionRules` reconciling every tab rule.
#[wasm_bindgen]
pub fn plan_session_update(storage: JsValue, installed: JsValue) -> Result<JsValue, JsValue> {
    let state = state_from_js(&storage)?;
    let installed = rules_from_js(&installed)?;
    let desired = REAL_UA.with(|ua| synth::synthesize_tab_rules(&state, ua.get()));
    to_js(&synth::plan_session_update(&installed, desired))
}

// =============================================================================
// Badge
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BadgeView {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    title: String,
    source_kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_id: Option<String>,
}

/// Badge text, color and title for a tab: `{text, color?, title,
/// sourceKind, profileId?}`.
#[wasm_bindgen]
pub fn badge_for_tab(
    storage: JsValue,
    tab_id: TabId,
    tab_url: Option<String>,
    title_prefix: Option<String>,
) -> Result<JsValue, JsValue> {
    let state = state_from_js(&storage)?;
    let mut style = BadgeStyle::default();
    if let Some(prefix) = title_prefix {
        style.title_prefix = prefix;
    }

    let effective = effective_profile_for(tab_id, tab_url.as_deref(), &state);
    let badge = render_badge(&effective, &style);
    to_js(&BadgeView {
        text: badge.text,
        color: badge.color,
        title: badge.title,
        source_kind: effective.source_kind().as_str(),
        profile_id: effective.profile().map(|p| p.id.clone()),
    })
}

// =============================================================================
// Management
// =============================================================================

/// Validate a new profile; returns the `userAgents` list to store.
#[wasm_bindgen]
pub fn add_profile(
    storage: JsValue,
    id: &str,
    name: &str,
    alias: &str,
    user_agent: &str,
    mode: &str,
) -> Result<JsValue, JsValue> {
    let mut state = state_from_js(&storage)?;
    let mode = match mode {
        "append" => ComposeMode::Append,
        "replace" | "" => ComposeMode::Replace,
        other => return Err(JsValue::from_str(&format!("Unknown mode: {}", other))),
    };
    state
        .profiles
        .add(CustomProfile {
            id: id.to_string(),
            name: name.to_string(),
            alias: alias.to_string(),
            user_agent: user_agent.to_string(),
            mode,
        })
        .map_err(js_error)?;
    to_js(&state.profiles)
}

/// Delete a custom profile; returns the `userAgents` list to store.
#[wasm_bindgen]
pub fn remove_profile(storage: JsValue, id: &str) -> Result<JsValue, JsValue> {
    let mut state = state_from_js(&storage)?;
    state.profiles.remove(id).map_err(js_error)?;
    to_js(&state.profiles)
}

/// Validate a new spoof; returns the `permanentSpoofs` list to store.
#[wasm_bindgen]
pub fn add_spoof(storage: JsValue, id: &str, domain: &str, user_agent_id: &str) -> Result<JsValue, JsValue> {
    let mut state = state_from_js(&storage)?;
    let draft = DomainSpoof {
        id: id.to_string(),
        domain: domain.to_string(),
        user_agent_id: user_agent_id.to_string(),
        enabled: true,
    };
    state.spoofs.add(draft, &state.profiles).map_err(js_error)?;
    to_js(&state.spoofs)
}

// =============================================================================
// Import / Export
// =============================================================================

fn now() -> Result<DateTime<Utc>, JsValue> {
    Utc.timestamp_millis_opt(js_sys::Date::now() as i64)
        .single()
        .ok_or_else(|| JsValue::from_str("Clock out of range"))
}

#[wasm_bindgen]
pub fn export_settings(storage: JsValue, version: &str) -> Result<String, JsValue> {
    let state = state_from_js(&storage)?;
    settings::export_settings(&state.profiles, &state.spoofs, &state.global, version, now()?)
        .to_json_pretty()
        .map_err(js_error)
}

#[wasm_bindgen]
pub fn export_file_name() -> String {
    settings::export_file_name(now().unwrap_or_default())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportView<'a> {
    user_agents: &'a [Profile],
    permanent_spoofs: &'a [DomainSpoof],
    global_user_agent: &'a GlobalMode,
    profiles_added: usize,
    profiles_skipped: usize,
    spoofs_added: usize,
    spoofs_skipped: usize,
}

/// Merge a bundle into the snapshot; returns the new `userAgents`,
/// `permanentSpoofs` and `globalUserAgent` plus added/skipped counts.
#[wasm_bindgen]
pub fn import_settings(storage: JsValue, bundle_json: &str) -> Result<JsValue, JsValue> {
    let bundle = settings::parse_bundle(bundle_json).map_err(js_error)?;
    let mut state = state_from_js(&storage)?;
    let ImportReport {
        profiles_added,
        profiles_skipped,
        spoofs_added,
        spoofs_skipped,
        ..
    } = settings::import_settings(&bundle, &mut state.profiles, &mut state.spoofs, &mut state.global);

    to_js(&ImportView {
        user_agents: state.profiles.as_slice(),
        permanent_spoofs: state.spoofs.as_slice(),
        global_user_agent: &state.global,
        profiles_added,
        profiles_skipped,
        spoofs_added,
        spoofs_skipped,
    })
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    fn storage() -> JsValue {
        js_sys::JSON::parse(
            r#"{
                "userAgents": [
                    {"id":"default","name":"Default","alias":"DEF","userAgent":"","mode":"replace"},
                    {"id":"auto","name":"Auto","alias":"AUTO","userAgent":"","mode":"auto"},
                    {"id":"tablet","name":"Tablet","alias":"TAB","userAgent":"UA-X","mode":"replace"}
                ],
                "permanentSpoofs": [
                    {"id":"s1","domain":"*.news.com","userAgentId":"tablet","enabled":true}
                ],
                "globalUserAgent": "auto",
                "tab_5": "tablet"
            }"#,
        )
        .unwrap()
    }

    #[wasm_bindgen_test]
    fn synthesizes_both_scopes() {
        let rules = synthesize_rules(storage()).unwrap();
        let domain = js_sys::Reflect::get(&rules, &"domainRules".into()).unwrap();
        let tab = js_sys::Reflect::get(&rules, &"tabRules".into()).unwrap();
        assert_eq!(js_sys::Array::from(&domain).length(), 1);
        assert_eq!(js_sys::Array::from(&tab).length(), 1);
    }

    #[wasm_bindgen_test]
    fn badge_for_matched_tab() {
        let badge = badge_for_tab(storage(), 9, Some("https://edition.news.com".into()), None).unwrap();
        let text = js_sys::Reflect::get(&badge, &"text".into()).unwrap();
        assert_eq!(text.as_string().as_deref(), Some("TAB"));
    }

    #[wasm_bindgen_test]
    fn reads_worker_user_agent() {
        assert!(!real_user_agent().is_empty());
    }
}
