//! UA Changer Rule Compiler
//!
//! This crate compiles profiles, spoofs and tab overrides into declarative
//! header-rewrite rules, and plans the atomic updates that install them.

pub mod pattern;
pub mod rule;
pub mod synth;

pub use pattern::compile;
pub use rule::{
    HeaderRule, RuleId, RuleScope, RuleUpdate, DOMAIN_RULE_ID_OFFSET, DOMAIN_RULE_PRIORITY, TAB_RULE_PRIORITY,
};
pub use synth::{
    plan_domain_update, plan_session_update, plan_tab_update, synthesize, synthesize_domain_rules,
    synthesize_tab_rule, synthesize_tab_rules, RuleSet,
};
