use serde_json::json;
use uac_compiler::rule::{RuleScope, DOMAIN_RULE_PRIORITY, TAB_RULE_PRIORITY};
use uac_core::effective::{effective_profile_for, SourceKind};
use uac_core::resolver::{resolve, RealUserAgent};
use uac_core::types::{ComposeMode, CustomProfile, DomainSpoof};
use uac_core::validate::ValidationError;
use uac_runtime::keys;
use uac_runtime::{MemoryController, RuntimeError};

const REAL_UA: &str = "Mozilla/5.0 Real";

async fn controller() -> MemoryController {
    let controller = MemoryController::in_memory(RealUserAgent::fixed(REAL_UA));
    controller.initialize().await.unwrap();
    controller
}

fn profile(id: &str, name: &str, alias: &str, ua: &str) -> CustomProfile {
    CustomProfile {
        id: id.into(),
        name: name.into(),
        alias: alias.into(),
        user_agent: ua.into(),
        mode: ComposeMode::Replace,
    }
}

fn spoof(id: &str, domain: &str, profile_id: &str) -> DomainSpoof {
    DomainSpoof {
        id: id.into(),
        domain: domain.into(),
        user_agent_id: profile_id.into(),
        enabled: true,
    }
}

async fn set_global(controller: &MemoryController, mode: &str) {
    controller.storage().insert(keys::GLOBAL_USER_AGENT, json!(mode));
    controller.on_state_changed(&[keys::GLOBAL_USER_AGENT]).await.unwrap();
}

#[tokio::test]
async fn initialize_seeds_storage() {
    let controller = controller().await;
    let storage = controller.storage();

    assert_eq!(storage.value(keys::DEFAULT_USER_AGENT), Some(json!(REAL_UA)));
    assert_eq!(storage.value(keys::GLOBAL_USER_AGENT), Some(json!("default")));

    let state = controller.load_state().await.unwrap();
    assert_eq!(state.profiles.len(), 4);
    assert!(state.profiles.custom("iphone").is_some());
    assert!(controller.rules().rules(RuleScope::Persistent).is_empty());
}

#[tokio::test]
async fn initialize_migrates_legacy_active_id() {
    let controller = MemoryController::in_memory(RealUserAgent::fixed(REAL_UA));
    controller.storage().insert(keys::LEGACY_ACTIVE_ID, json!("auto"));
    controller.initialize().await.unwrap();
    assert_eq!(controller.storage().value(keys::GLOBAL_USER_AGENT), Some(json!("auto")));
}

#[tokio::test]
async fn initialize_drops_overrides_of_closed_tabs() {
    let controller = MemoryController::in_memory(RealUserAgent::fixed(REAL_UA));
    controller.tabs().open(1, "https://a.com");
    controller.storage().insert("tab_1", json!("iphone"));
    controller.storage().insert("tab_99", json!("iphone"));
    controller.initialize().await.unwrap();

    assert!(controller.storage().value("tab_1").is_some());
    assert!(controller.storage().value("tab_99").is_none());
    let session = controller.rules().rules(RuleScope::Session);
    assert_eq!(session.len(), 1);
    assert_eq!(session[0].id, 1);
}

#[tokio::test]
async fn initialize_paints_every_open_tab() {
    let controller = MemoryController::in_memory(RealUserAgent::fixed(REAL_UA));
    controller.tabs().open(1, "https://a.com");
    controller.tabs().open(2, "https://b.com");
    controller.storage().insert("tab_1", json!("iphone"));
    controller.initialize().await.unwrap();

    assert_eq!(controller.badge().get(1).unwrap().text, "iOS");
    assert_eq!(controller.badge().get(2).unwrap().text, "");
}

#[tokio::test]
async fn tablet_news_scenario() {
    let controller = controller().await;
    controller.tabs().open(7, "about:blank");

    let tablet = controller
        .add_profile(profile("tablet", "Tablet", "TAB", "UA-X"))
        .await
        .unwrap();
    controller.add_spoof(spoof("s1", "*.news.com", &tablet.id)).await.unwrap();
    set_global(&controller, "auto").await;

    controller.tabs().navigate(7, "https://edition.news.com");
    controller.on_tab_updated(7, true).await.unwrap();

    let state = controller.load_state().await.unwrap();
    let effective = effective_profile_for(7, Some("https://edition.news.com"), &state);
    assert_eq!(effective.source_kind(), SourceKind::GlobalAutoMatched);
    assert_eq!(effective.profile().unwrap().name, "Tablet");

    let badge = controller.badge().get(7).unwrap();
    assert_eq!(badge.text, "TAB");
    assert_eq!(badge.color.as_deref(), Some("#00AA00"));

    let domain_rules = controller.rules().rules(RuleScope::Persistent);
    assert_eq!(domain_rules.len(), 1);
    assert_eq!(domain_rules[0].condition.url_filter, "*://*.news.com/*");

    controller.on_user_agent_picked("default", Some(7)).await.unwrap();

    let badge = controller.badge().get(7).unwrap();
    assert!(badge.text.is_empty());
    assert!(controller.rules().rules(RuleScope::Session).is_empty());
    // Leaving auto mode retracts the domain block
    assert!(controller.rules().rules(RuleScope::Persistent).is_empty());
}

#[tokio::test]
async fn manual_pick_outranks_domain_spoof() {
    let controller = controller().await;
    controller.tabs().open(3, "https://m.shop.com/cart");
    controller.add_spoof(spoof("s1", "shop.com", "android")).await.unwrap();
    set_global(&controller, "auto").await;

    controller.on_user_agent_picked("iphone", Some(3)).await.unwrap();

    let session = controller.rules().rules(RuleScope::Session);
    let persistent = controller.rules().rules(RuleScope::Persistent);
    assert_eq!(session.len(), 1);
    assert_eq!(persistent.len(), 1);
    assert_eq!(session[0].priority, TAB_RULE_PRIORITY);
    assert_eq!(persistent[0].priority, DOMAIN_RULE_PRIORITY);
    assert!(session[0].priority > persistent[0].priority);

    let badge = controller.badge().get(3).unwrap();
    assert_eq!(badge.text, "iOS");
    assert_eq!(badge.color.as_deref(), Some("#000000"));

    // Picking again replaces the rule in one update
    controller.on_user_agent_picked("android", Some(3)).await.unwrap();
    let session = controller.rules().rules(RuleScope::Session);
    assert_eq!(session.len(), 1);
    let (scope, last) = controller.rules().updates().pop().unwrap();
    assert_eq!(scope, RuleScope::Session);
    assert_eq!(last.remove, vec![3]);
    assert_eq!(last.add.len(), 1);
}

#[tokio::test]
async fn domain_block_follows_global_mode() {
    let controller = controller().await;
    for (i, domain) in ["a.com", "b.com", "c.com"].iter().enumerate() {
        controller
            .add_spoof(spoof(&format!("s{}", i), domain, "iphone"))
            .await
            .unwrap();
    }
    assert!(controller.rules().rules(RuleScope::Persistent).is_empty());

    set_global(&controller, "auto").await;
    let ids: Vec<_> = controller
        .rules()
        .rules(RuleScope::Persistent)
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![1000, 1001, 1002]);

    controller.set_spoof_enabled("s1", false).await.unwrap();
    let ids: Vec<_> = controller
        .rules()
        .rules(RuleScope::Persistent)
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![1000, 1001]);

    set_global(&controller, "default").await;
    assert!(controller.rules().rules(RuleScope::Persistent).is_empty());
}

#[tokio::test]
async fn closing_a_tab_only_touches_that_tab() {
    let controller = controller().await;
    controller.tabs().open(1, "https://a.com");
    controller.tabs().open(2, "https://b.com");
    controller.on_user_agent_picked("iphone", Some(1)).await.unwrap();
    controller.on_user_agent_picked("android", Some(2)).await.unwrap();

    controller.tabs().close(1);
    controller.on_tab_removed(1).await;

    assert!(controller.storage().value("tab_1").is_none());
    assert_eq!(controller.storage().value("tab_2"), Some(json!("android")));
    let session = controller.rules().rules(RuleScope::Session);
    assert_eq!(session.len(), 1);
    assert_eq!(session[0].id, 2);
}

#[tokio::test]
async fn tab_close_failures_are_swallowed() {
    let controller = controller().await;
    controller.storage().set_failing(true);
    controller.on_tab_removed(5).await;
    controller.storage().set_failing(false);
    assert!(controller.load_state().await.is_ok());
}

#[tokio::test]
async fn reserved_alias_is_rejected() {
    let controller = controller().await;
    let before = controller.rules().updates().len();

    let err = controller
        .add_profile(profile("x", "Desktop", "def", "UA-D"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Validation(ValidationError::ReservedAlias(_))));

    let err = controller
        .add_profile(profile("y", "Phone", "ios", "UA-P"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Validation(ValidationError::DuplicateAlias(_))));

    assert_eq!(controller.rules().updates().len(), before);
    let state = controller.load_state().await.unwrap();
    assert!(state.profiles.get("x").is_none());
}

#[tokio::test]
async fn pick_requires_tab_id() {
    let controller = controller().await;
    let err = controller.on_user_agent_picked("iphone", None).await.unwrap_err();
    assert!(matches!(err, RuntimeError::MissingTabId));

    let err = controller.on_user_agent_picked("gone", Some(1)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownProfile(_)));
}

#[tokio::test]
async fn deleting_a_profile_drops_its_rules() {
    let controller = controller().await;
    controller.tabs().open(4, "https://a.com");
    controller.add_spoof(spoof("s1", "a.com", "android")).await.unwrap();
    set_global(&controller, "auto").await;
    controller.on_user_agent_picked("android", Some(4)).await.unwrap();

    controller.remove_profile("android").await.unwrap();

    assert!(controller.rules().rules(RuleScope::Session).is_empty());
    assert!(controller.rules().rules(RuleScope::Persistent).is_empty());
    let badge = controller.badge().get(4).unwrap();
    assert_eq!(badge.text, "AUTO");
}

#[tokio::test]
async fn concurrent_resyncs_converge() {
    let controller = controller().await;
    controller.add_spoof(spoof("s1", "a.com", "iphone")).await.unwrap();
    set_global(&controller, "auto").await;

    let late_change = async {
        controller.storage().insert(
            keys::PERMANENT_SPOOFS,
            json!([
                {"id": "s1", "domain": "a.com", "userAgentId": "iphone", "enabled": true},
                {"id": "s2", "domain": "b.com", "userAgentId": "android", "enabled": true}
            ]),
        );
        controller.resync_domain_rules().await
    };
    let (first, second) = futures::join!(controller.resync_domain_rules(), late_change);
    first.unwrap();
    second.unwrap();

    let rules = controller.rules().rules(RuleScope::Persistent);
    let filters: Vec<_> = rules.iter().map(|r| r.condition.url_filter.as_str()).collect();
    assert_eq!(filters, vec!["*://*.a.com/*", "*://*.b.com/*"]);
    assert_eq!(rules[1].id, 1001);
}

/// The stored pick for `tab_id` and its installed session rule agree.
async fn assert_tab_in_step(controller: &MemoryController, tab_id: i32) {
    let state = controller.load_state().await.unwrap();
    let session = controller.rules().rules(RuleScope::Session);
    let rules: Vec<_> = session.iter().filter(|r| r.id == tab_id).collect();
    match state.tab_overrides.get(&tab_id) {
        Some(id) => {
            assert_eq!(rules.len(), 1);
            let expected = resolve(id, &state.profiles, REAL_UA);
            assert_eq!(rules[0].user_agent(), expected.as_deref());
        }
        None => assert!(rules.is_empty()),
    }
}

#[tokio::test]
async fn concurrent_picks_keep_pick_and_rule_in_step() {
    let controller = controller().await;
    controller.tabs().open(3, "https://a.com");

    let (first, second) = futures::join!(
        controller.on_user_agent_picked("iphone", Some(3)),
        controller.on_user_agent_picked("android", Some(3)),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(controller.storage().value("tab_3"), Some(json!("android")));
    assert_tab_in_step(&controller, 3).await;
    assert_eq!(controller.badge().get(3).unwrap().text, "AND");
}

#[tokio::test]
async fn pick_racing_tab_close_leaves_nothing_behind() {
    let controller = controller().await;
    controller.tabs().open(5, "https://a.com");

    let close = async {
        controller.tabs().close(5);
        controller.on_tab_removed(5).await;
    };
    let (picked, _) = futures::join!(controller.on_user_agent_picked("iphone", Some(5)), close);
    picked.unwrap();

    assert!(controller.storage().value("tab_5").is_none());
    assert!(controller.rules().rules(RuleScope::Session).is_empty());
}

#[tokio::test]
async fn rejected_rule_update_keeps_previous_pick() {
    let controller = controller().await;
    controller.tabs().open(3, "https://a.com");
    controller.on_user_agent_picked("iphone", Some(3)).await.unwrap();

    controller.rules().set_failing(true);
    let err = controller.on_user_agent_picked("android", Some(3)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Substrate(_)));
    controller.rules().set_failing(false);

    assert_eq!(controller.storage().value("tab_3"), Some(json!("iphone")));
    assert_tab_in_step(&controller, 3).await;
}

#[tokio::test]
async fn queued_resync_reports_its_own_failure() {
    let controller = controller().await;
    controller.add_spoof(spoof("s1", "a.com", "iphone")).await.unwrap();
    set_global(&controller, "auto").await;

    let queued = async {
        controller.storage().insert(
            keys::PERMANENT_SPOOFS,
            json!([
                {"id": "s1", "domain": "a.com", "userAgentId": "iphone", "enabled": true},
                {"id": "s2", "domain": "b.com", "userAgentId": "android", "enabled": true}
            ]),
        );
        controller.storage().set_failing(true);
        controller.resync_domain_rules().await
    };
    let (first, second) = futures::join!(controller.resync_domain_rules(), queued);
    first.unwrap();
    assert!(matches!(second, Err(RuntimeError::Substrate(_))));

    controller.storage().set_failing(false);
    controller.resync_domain_rules().await.unwrap();
    let filters: Vec<_> = controller
        .rules()
        .rules(RuleScope::Persistent)
        .iter()
        .map(|r| r.condition.url_filter.clone())
        .collect();
    assert_eq!(filters, vec!["*://*.a.com/*", "*://*.b.com/*"]);
}

#[tokio::test]
async fn import_then_export() {
    let controller = controller().await;
    let report = controller
        .import_settings(
            r#"{
                "version": "1.0.0",
                "userAgents": [
                    {"id":"tablet","name":"Tablet","alias":"TAB","userAgent":"UA-X","mode":"append"}
                ],
                "permanentSpoofs": [
                    {"id":"s1","domain":"news.com","userAgentId":"tablet","enabled":true}
                ],
                "globalUserAgent": "auto"
            }"#,
        )
        .await
        .unwrap();
    assert_eq!(report.added(), 2);

    let rules = controller.rules().rules(RuleScope::Persistent);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].user_agent(), Some("Mozilla/5.0 Real UA-X"));

    let bundle = controller
        .export_settings("1.0.0", chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(bundle.user_agents.len(), 3);
    assert_eq!(bundle.permanent_spoofs.len(), 1);
}
