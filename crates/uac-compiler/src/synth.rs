//! Rule Synthesizer
//!
//! Turns a [`State`] snapshot into the two rule blocks the engine holds:
//! per-tab manual rules in the session scope and per-domain spoof rules in
//! the persistent scope. Also plans the minimal atomic update that moves an
//! installed block to a desired one.

use std::collections::{BTreeMap, BTreeSet};

use uac_core::catalog::ProfileTable;
use uac_core::resolver::resolve;
use uac_core::types::{is_reserved_id, State, TabId};

use crate::pattern::compile;
use crate::rule::{HeaderRule, RuleId, RuleUpdate, DOMAIN_RULE_ID_OFFSET};

/// Rules desired for a state, split by scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Session scope, one per overridden tab
    pub tab_rules: Vec<HeaderRule>,
    /// Persistent scope, ids from [`DOMAIN_RULE_ID_OFFSET`]
    pub domain_rules: Vec<HeaderRule>,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.tab_rules.len() + self.domain_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tab_rules.is_empty() && self.domain_rules.is_empty()
    }
}

// =============================================================================
// Synthesis
// =============================================================================

pub fn synthesize(state: &State, real_ua: &str) -> RuleSet {
    let rules = RuleSet {
        tab_rules: synthesize_tab_rules(state, real_ua),
        domain_rules: synthesize_domain_rules(state, real_ua),
    };
    log::debug!(
        "synthesized {} tab rules, {} domain rules",
        rules.tab_rules.len(),
        rules.domain_rules.len()
    );
    rules
}

/// Rule for a manual pick of `profile_id` on `tab_id`. Reserved and
/// unresolvable ids produce no rule.
pub fn synthesize_tab_rule(
    tab_id: TabId,
    profile_id: &str,
    profiles: &ProfileTable,
    real_ua: &str,
) -> Option<HeaderRule> {
    if is_reserved_id(profile_id) {
        return None;
    }
    match resolve(profile_id, profiles, real_ua) {
        Some(ua) => Some(HeaderRule::for_tab(tab_id, ua)),
        None => {
            log::warn!("tab {}: no user agent for profile '{}', skipping rule", tab_id, profile_id);
            None
        }
    }
}

pub fn synthesize_tab_rules(state: &State, real_ua: &str) -> Vec<HeaderRule> {
    state
        .tab_overrides
        .iter()
        .filter_map(|(&tab_id, profile_id)| synthesize_tab_rule(tab_id, profile_id, &state.profiles, real_ua))
        .collect()
}

/// Domain rules exist only in auto mode. Ids are assigned in emitted
/// order, so a skipped spoof does not leave a gap.
pub fn synthesize_domain_rules(state: &State, real_ua: &str) -> Vec<HeaderRule> {
    if !state.global.is_auto() {
        return Vec::new();
    }

    let mut rules = Vec::new();
    for spoof in state.spoofs.enabled() {
        let Some(ua) = resolve(&spoof.user_agent_id, &state.profiles, real_ua) else {
            log::warn!("no user agent found for spoof '{}' ({})", spoof.domain, spoof.user_agent_id);
            continue;
        };
        let id = DOMAIN_RULE_ID_OFFSET + rules.len() as RuleId;
        rules.push(HeaderRule::for_domain(id, compile(&spoof.domain), ua));
    }
    rules
}

// =============================================================================
// Update Planning
// =============================================================================

/// Replace the whole persistent domain block in one update.
pub fn plan_domain_update(installed: &[HeaderRule], desired: Vec<HeaderRule>) -> RuleUpdate {
    RuleUpdate {
        remove: installed
            .iter()
            .filter(|r| r.is_domain_rule())
            .map(|r| r.id)
            .collect(),
        add: desired,
    }
}

/// Replace (or drop, when `desired` is `None`) the rule of one tab.
pub fn plan_tab_update(installed: &[HeaderRule], tab_id: TabId, desired: Option<HeaderRule>) -> RuleUpdate {
    let remove = if installed.iter().any(|r| r.id == tab_id) {
        vec![tab_id]
    } else {
        Vec::new()
    };
    RuleUpdate {
        remove,
        add: desired.into_iter().collect(),
    }
}

/// Reconcile the whole session scope: stale or changed rules are removed,
/// missing or changed ones added, identical ones left alone.
pub fn plan_session_update(installed: &[HeaderRule], desired: Vec<HeaderRule>) -> RuleUpdate {
    let current: BTreeMap<RuleId, &HeaderRule> = installed.iter().map(|r| (r.id, r)).collect();
    let wanted: BTreeSet<RuleId> = desired.iter().map(|r| r.id).collect();

    let mut update = RuleUpdate::default();
    for (&id, rule) in &current {
        let keep = desired.iter().any(|d| d == *rule);
        if !wanted.contains(&id) || !keep {
            update.remove.push(id);
        }
    }
    for rule in desired {
        if current.get(&rule.id).map_or(true, |&r| *r != rule) {
            update.add.push(rule);
        }
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use uac_core::catalog::SpoofList;
    use uac_core::types::{ComposeMode, CustomProfile, DomainSpoof, GlobalMode, Profile};

    fn profiles() -> ProfileTable {
        ProfileTable::new(vec![
            Profile::Default { name: "Default".into() },
            Profile::Auto { name: "Auto".into() },
            Profile::Custom(CustomProfile {
                id: "tablet".into(),
                name: "Tablet".into(),
                alias: "TAB".into(),
                user_agent: "UA-X".into(),
                mode: ComposeMode::Replace,
            }),
            Profile::Custom(CustomProfile {
                id: "ext".into(),
                name: "Ext".into(),
                alias: "EXT".into(),
                user_agent: "Foo".into(),
                mode: ComposeMode::Append,
            }),
        ])
    }

    fn spoof(id: &str, domain: &str, ua: &str, enabled: bool) -> DomainSpoof {
        DomainSpoof {
            id: id.into(),
            domain: domain.into(),
            user_agent_id: ua.into(),
            enabled,
        }
    }

    fn state(global: GlobalMode) -> State {
        let spoofs = SpoofList::new(vec![
            spoof("s1", "a.com", "tablet", true),
            spoof("s2", "b.com", "gone", true),
            spoof("s3", "c.com", "tablet", false),
            spoof("s4", "*.d.com", "ext", true),
        ]);
        State::new(profiles(), spoofs, global)
    }

    #[test]
    fn domain_ids_are_sequential_from_offset() {
        let rules = synthesize(&state(GlobalMode::Auto), "Real");
        let ids: Vec<_> = rules.domain_rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1000, 1001]);
        assert_eq!(rules.domain_rules[0].condition.url_filter, "*://*.a.com/*");
        assert_eq!(rules.domain_rules[1].condition.url_filter, "*://*.d.com/*");
        assert_eq!(rules.domain_rules[1].user_agent(), Some("Real Foo"));
    }

    #[test]
    fn no_domain_rules_outside_auto() {
        assert!(synthesize(&state(GlobalMode::Default), "Real").domain_rules.is_empty());
        assert!(synthesize(&state(GlobalMode::Profile("tablet".into())), "Real")
            .domain_rules
            .is_empty());
    }

    #[test]
    fn tab_rule_outranks_domain_rule() {
        let state = state(GlobalMode::Auto).with_override(5, "tablet").with_override(6, "auto");
        let rules = synthesize(&state, "Real");
        assert_eq!(rules.tab_rules.len(), 1);
        let tab = &rules.tab_rules[0];
        assert_eq!(tab.id, 5);
        assert_eq!(tab.condition.tab_ids.as_deref(), Some(&[5][..]));
        assert!(rules.domain_rules.iter().all(|d| tab.priority > d.priority));
    }

    #[test]
    fn domain_plan_replaces_only_the_domain_block() {
        let installed = vec![
            HeaderRule::for_domain(1000, "*://*.old.com/*", "A"),
            HeaderRule::for_domain(1001, "*://*.old2.com/*", "A"),
        ];
        let desired = synthesize_domain_rules(&state(GlobalMode::Auto), "Real");
        let update = plan_domain_update(&installed, desired);
        assert_eq!(update.remove, vec![1000, 1001]);
        assert_eq!(update.add.len(), 2);

        let cleared = plan_domain_update(&installed, Vec::new());
        assert_eq!(cleared.remove, vec![1000, 1001]);
        assert!(cleared.add.is_empty());

        assert!(plan_domain_update(&[], Vec::new()).is_empty());
    }

    #[test]
    fn tab_plan_only_removes_installed_rule() {
        let installed = vec![HeaderRule::for_tab(3, "A")];
        let fresh = plan_tab_update(&installed, 4, Some(HeaderRule::for_tab(4, "B")));
        assert!(fresh.remove.is_empty());
        assert_eq!(fresh.add[0].id, 4);

        let replace = plan_tab_update(&installed, 3, Some(HeaderRule::for_tab(3, "B")));
        assert_eq!(replace.remove, vec![3]);
        assert_eq!(replace.add.len(), 1);

        let clear = plan_tab_update(&installed, 3, None);
        assert_eq!(clear.remove, vec![3]);
        assert!(clear.add.is_empty());
    }

    #[test]
    fn session_plan_leaves_unchanged_rules() {
        let installed = vec![
            HeaderRule::for_tab(1, "A"),
            HeaderRule::for_tab(2, "B"),
            HeaderRule::for_tab(3, "C"),
        ];
        let desired = vec![
            HeaderRule::for_tab(1, "A"),
            HeaderRule::for_tab(2, "B2"),
            HeaderRule::for_tab(4, "D"),
        ];
        let update = plan_session_update(&installed, desired);
        assert_eq!(update.remove, vec![2, 3]);
        let added: Vec<_> = update.add.iter().map(|r| r.id).collect();
        assert_eq!(added, vec![2, 4]);
    }
}
