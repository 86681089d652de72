//! Event replay against the in-memory substrates.

use serde::Deserialize;
use serde_json::json;

use uac_compiler::rule::RuleScope;
use uac_core::resolver::RealUserAgent;
use uac_core::types::TabId;
use uac_runtime::{keys, MemoryController};

use crate::read_file;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum Event {
    /// Open a tab and focus it
    Open { tab: TabId, url: String },
    /// Finish loading a new URL in a tab
    Navigate { tab: TabId, url: String },
    Activate { tab: TabId },
    Close { tab: TabId },
    /// Popup pick; a missing tab is reported as an error
    Pick { profile: String, tab: Option<TabId> },
    /// Write `globalUserAgent` the way the options page does
    Global { mode: String },
}

pub fn run_simulation(settings: Option<&str>, events_path: &str, real_ua: &str) -> Result<(), String> {
    let events: Vec<Event> =
        serde_json::from_str(&read_file(events_path)?).map_err(|e| format!("Invalid event script: {}", e))?;
    let settings = settings.map(read_file).transpose()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(simulate_async(settings.as_deref(), events, real_ua))
}

async fn simulate_async(settings: Option<&str>, events: Vec<Event>, real_ua: &str) -> Result<(), String> {
    let controller = MemoryController::in_memory(RealUserAgent::fixed(real_ua));
    controller
        .initialize()
        .await
        .map_err(|e| format!("Initialization failed: {}", e))?;

    if let Some(json) = settings {
        let report = controller
            .import_settings(json)
            .await
            .map_err(|e| format!("Import failed: {}", e))?;
        println!(
            "Imported {} profiles, {} spoofs ({} skipped)",
            report.profiles_added,
            report.spoofs_added,
            report.profiles_skipped + report.spoofs_skipped
        );
    }

    for (step, event) in events.into_iter().enumerate() {
        if let Err(e) = apply(&controller, &event).await {
            println!("[{}] {:?} failed: {}", step, event, e);
            continue;
        }
        if let Some(tab) = controller.tabs().active_tab_id() {
            if let Some(badge) = controller.badge().get(tab) {
                println!("[{}] {:?} -> tab {} badge '{}'", step, event, tab, badge.text);
                continue;
            }
        }
        println!("[{}] {:?}", step, event);
    }

    let output = json!({
        "session": controller.rules().rules(RuleScope::Session),
        "persistent": controller.rules().rules(RuleScope::Persistent),
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| format!("Failed to serialize rules: {}", e))?;
    println!("{}", text);
    Ok(())
}

async fn apply(controller: &MemoryController, event: &Event) -> Result<(), uac_runtime::RuntimeError> {
    match event {
        Event::Open { tab, url } => {
            controller.tabs().open(*tab, url);
            controller.on_tab_activated(*tab).await
        }
        Event::Navigate { tab, url } => {
            controller.tabs().navigate(*tab, url);
            controller.on_tab_updated(*tab, true).await
        }
        Event::Activate { tab } => {
            controller.tabs().activate(*tab);
            controller.on_tab_activated(*tab).await
        }
        Event::Close { tab } => {
            controller.tabs().close(*tab);
            controller.on_tab_removed(*tab).await;
            Ok(())
        }
        Event::Pick { profile, tab } => controller.on_user_agent_picked(profile, *tab).await,
        Event::Global { mode } => {
            controller.storage().insert(keys::GLOBAL_USER_AGENT, json!(mode));
            controller.on_state_changed(&[keys::GLOBAL_USER_AGENT]).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_script_parses() {
        let events: Vec<Event> = serde_json::from_str(
            r#"[
                {"event":"open","tab":1,"url":"https://a.com"},
                {"event":"pick","profile":"iphone","tab":1},
                {"event":"pick","profile":"iphone"},
                {"event":"global","mode":"auto"},
                {"event":"close","tab":1}
            ]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[2], Event::Pick { tab: None, .. }));
    }

    #[test]
    fn replays_a_script() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let events = vec![
            Event::Open {
                tab: 1,
                url: "https://a.com".into(),
            },
            Event::Pick {
                profile: "iphone".into(),
                tab: Some(1),
            },
        ];
        runtime
            .block_on(simulate_async(None, events, "Mozilla/5.0 Real"))
            .unwrap();
    }
}
