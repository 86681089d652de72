//! Storage keys

use uac_core::types::TabId;

pub const USER_AGENTS: &str = "userAgents";
pub const PERMANENT_SPOOFS: &str = "permanentSpoofs";
pub const GLOBAL_USER_AGENT: &str = "globalUserAgent";
pub const DEFAULT_USER_AGENT: &str = "defaultUserAgent";
/// Pre-`globalUserAgent` name of the global setting.
pub const LEGACY_ACTIVE_ID: &str = "activeId";

const TAB_PREFIX: &str = "tab_";

/// Key holding the manual pick of `tab_id`.
pub fn tab_key(tab_id: TabId) -> String {
    format!("{}{}", TAB_PREFIX, tab_id)
}

pub fn parse_tab_key(key: &str) -> Option<TabId> {
    key.strip_prefix(TAB_PREFIX)?.parse().ok()
}
