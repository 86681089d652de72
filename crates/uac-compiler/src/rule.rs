//! Declarative header-rewrite rules
//!
//! Serialized in the exact JSON shape the browser's declarative request
//! engine accepts, so the JS side can pass them through untouched.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uac_core::types::{ResourceTypes, TabId};

pub type RuleId = i32;

/// Priority of per-tab manual rules.
pub const TAB_RULE_PRIORITY: u32 = 4;
/// Priority of per-domain spoof rules.
pub const DOMAIN_RULE_PRIORITY: u32 = 2;
/// First id of the persistent domain-rule block.
pub const DOMAIN_RULE_ID_OFFSET: RuleId = 1000;

pub const USER_AGENT_HEADER: &str = "user-agent";

// =============================================================================
// Rule Model
// =============================================================================

/// Where a rule is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RuleScope {
    /// Cleared on browser restart; the only scope accepting `tabIds`
    Session,
    /// Survives restarts
    Persistent,
}

impl RuleScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Persistent => "persistent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HeaderModification {
    pub header: String,
    pub operation: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub request_headers: Vec<HeaderModification>,
}

impl RuleAction {
    /// Set the `user-agent` request header to `value`.
    pub fn set_user_agent(value: impl Into<String>) -> Self {
        Self {
            kind: "modifyHeaders".to_string(),
            request_headers: vec![HeaderModification {
                header: USER_AGENT_HEADER.to_string(),
                operation: "set".to_string(),
                value: value.into(),
            }],
        }
    }

    /// The value written to `user-agent`, if this action sets it.
    pub fn user_agent(&self) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|h| h.header.eq_ignore_ascii_case(USER_AGENT_HEADER))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleCondition {
    pub url_filter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tab_ids: Option<Vec<TabId>>,
    pub resource_types: Vec<String>,
}

/// One installed (or to-be-installed) header rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HeaderRule {
    pub id: RuleId,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl HeaderRule {
    /// Session rule pinning `user_agent` on every request of `tab_id`.
    pub fn for_tab(tab_id: TabId, user_agent: impl Into<String>) -> Self {
        Self {
            id: tab_id,
            priority: TAB_RULE_PRIORITY,
            action: RuleAction::set_user_agent(user_agent),
            condition: RuleCondition {
                url_filter: "*".to_string(),
                tab_ids: Some(vec![tab_id]),
                resource_types: all_resource_types(),
            },
        }
    }

    /// Persistent rule applying `user_agent` to requests matching `url_filter`.
    pub fn for_domain(id: RuleId, url_filter: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            id,
            priority: DOMAIN_RULE_PRIORITY,
            action: RuleAction::set_user_agent(user_agent),
            condition: RuleCondition {
                url_filter: url_filter.into(),
                tab_ids: None,
                resource_types: all_resource_types(),
            },
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.action.user_agent()
    }

    pub fn is_domain_rule(&self) -> bool {
        self.id >= DOMAIN_RULE_ID_OFFSET
    }
}

fn all_resource_types() -> Vec<String> {
    ResourceTypes::ALL.names().into_iter().map(str::to_string).collect()
}

// =============================================================================
// Rule Updates
// =============================================================================

/// A single atomic change to one rule scope: removals happen before adds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleUpdate {
    #[serde(rename = "removeRuleIds", default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<RuleId>,
    #[serde(rename = "addRules", default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<HeaderRule>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// Apply this update to a scope's rule list in place.
    pub fn apply_to(&self, rules: &mut Vec<HeaderRule>) {
        rules.retain(|r| !self.remove.contains(&r.id));
        for rule in &self.add {
            rules.retain(|r| r.id != rule.id);
            rules.push(rule.clone());
        }
        rules.sort_by_key(|r| r.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_rule_wire_shape() {
        let rule = HeaderRule::for_tab(42, "UA-X");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["priority"], 4);
        assert_eq!(json["action"]["type"], "modifyHeaders");
        assert_eq!(json["action"]["requestHeaders"][0]["header"], "user-agent");
        assert_eq!(json["action"]["requestHeaders"][0]["operation"], "set");
        assert_eq!(json["action"]["requestHeaders"][0]["value"], "UA-X");
        assert_eq!(json["condition"]["urlFilter"], "*");
        assert_eq!(json["condition"]["tabIds"][0], 42);

        let types = json["condition"]["resourceTypes"].as_array().unwrap();
        assert_eq!(types.len(), 15);
        assert_eq!(types[0], "main_frame");
        assert_eq!(types[14], "other");
    }

    #[test]
    fn domain_rule_has_no_tab_ids() {
        let rule = HeaderRule::for_domain(1000, "*://*.a.com/*", "UA-X");
        let json = serde_json::to_value(&rule).unwrap();
        assert!(json["condition"].get("tabIds").is_none());
        assert_eq!(rule.priority, DOMAIN_RULE_PRIORITY);
        assert!(rule.is_domain_rule());
        assert_eq!(rule.user_agent(), Some("UA-X"));
    }

    #[test]
    fn update_serializes_like_the_engine_api() {
        let update = RuleUpdate {
            remove: vec![7],
            add: vec![HeaderRule::for_tab(7, "UA")],
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["removeRuleIds"][0], 7);
        assert_eq!(json["addRules"][0]["id"], 7);

        let empty = serde_json::to_string(&RuleUpdate::default()).unwrap();
        assert_eq!(empty, "{}");
    }

    #[test]
    fn apply_removes_then_adds() {
        let mut rules = vec![HeaderRule::for_tab(1, "A"), HeaderRule::for_tab(2, "B")];
        let update = RuleUpdate {
            remove: vec![1],
            add: vec![HeaderRule::for_tab(1, "C")],
        };
        update.apply_to(&mut rules);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].user_agent(), Some("C"));
        assert_eq!(rules[1].user_agent(), Some("B"));
    }
}
