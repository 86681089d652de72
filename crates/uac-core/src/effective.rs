//! Effective-State Resolver
//!
//! Decides which single profile is active for a tab, replaying the same
//! precedence the installed rules encode, and renders the toolbar badge
//! for it. Nothing here touches the rule engine.

use crate::matcher::matches;
use crate::types::{CustomProfile, DomainSpoof, GlobalMode, State, TabId};
use crate::url::is_restricted_url;

/// Why a profile is the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Picked by hand for this tab
    Manual,
    /// Global mode is `default`
    GlobalDefault,
    /// Global mode is `auto` and a spoof matches the tab URL
    GlobalAutoMatched,
    /// Global mode is `auto` and no spoof matches
    GlobalAutoUnmatched,
    /// Global mode names a profile
    GlobalSpecific,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::GlobalDefault => "globalDefault",
            Self::GlobalAutoMatched => "globalAutoMatched",
            Self::GlobalAutoUnmatched => "globalAutoUnmatched",
            Self::GlobalSpecific => "globalSpecific",
        }
    }
}

/// The profile in effect for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effective<'a> {
    Manual(&'a CustomProfile),
    GlobalDefault,
    AutoMatched {
        profile: &'a CustomProfile,
        spoof: &'a DomainSpoof,
    },
    AutoUnmatched,
    GlobalSpecific(&'a CustomProfile),
}

impl<'a> Effective<'a> {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Manual(_) => SourceKind::Manual,
            Self::GlobalDefault => SourceKind::GlobalDefault,
            Self::AutoMatched { .. } => SourceKind::GlobalAutoMatched,
            Self::AutoUnmatched => SourceKind::GlobalAutoUnmatched,
            Self::GlobalSpecific(_) => SourceKind::GlobalSpecific,
        }
    }

    /// The custom profile in effect, if any.
    pub fn profile(&self) -> Option<&'a CustomProfile> {
        match *self {
            Self::Manual(p) | Self::GlobalSpecific(p) => Some(p),
            Self::AutoMatched { profile, .. } => Some(profile),
            Self::GlobalDefault | Self::AutoUnmatched => None,
        }
    }
}

/// First enabled spoof, in list order, matching `url` whose profile exists.
pub fn find_spoof_for_url<'a>(url: &str, state: &'a State) -> Option<(&'a DomainSpoof, &'a CustomProfile)> {
    if is_restricted_url(url) {
        return None;
    }
    state
        .spoofs
        .enabled()
        .filter(|spoof| matches(url, &spoof.domain))
        .find_map(|spoof| state.profiles.custom(&spoof.user_agent_id).map(|p| (spoof, p)))
}

/// Resolve the active profile for `tab_id`, whose current URL is `tab_url`.
///
/// Overrides and global ids that point at deleted profiles are skipped the
/// same way synthesis skips them, so the badge never claims a rule that is
/// not installed.
pub fn effective_profile_for<'a>(tab_id: TabId, tab_url: Option<&str>, state: &'a State) -> Effective<'a> {
    if let Some(profile_id) = state.tab_overrides.get(&tab_id) {
        match state.profiles.custom(profile_id) {
            Some(profile) => return Effective::Manual(profile),
            None => log::warn!("tab {} overrides to unknown profile '{}'", tab_id, profile_id),
        }
    }

    match &state.global {
        GlobalMode::Default => Effective::GlobalDefault,
        GlobalMode::Auto => match tab_url.and_then(|url| find_spoof_for_url(url, state)) {
            Some((spoof, profile)) => Effective::AutoMatched { profile, spoof },
            None => Effective::AutoUnmatched,
        },
        GlobalMode::Profile(id) => match state.profiles.custom(id) {
            Some(profile) => Effective::GlobalSpecific(profile),
            None => {
                log::warn!("global mode names unknown profile '{}'", id);
                Effective::GlobalDefault
            }
        },
    }
}

// =============================================================================
// Badge Rendering
// =============================================================================

/// Colors and title prefix used for the toolbar badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeStyle {
    pub neutral_color: String,
    pub matched_color: String,
    pub unmatched_color: String,
    pub title_prefix: String,
}

impl Default for BadgeStyle {
    fn default() -> Self {
        Self {
            neutral_color: "#000000".to_string(),
            matched_color: "#00AA00".to_string(),
            unmatched_color: "#FF0000".to_string(),
            title_prefix: "User-Agent Changer".to_string(),
        }
    }
}

/// Badge text, background and tooltip for one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    /// `None` leaves the current color untouched (no text is shown)
    pub color: Option<String>,
    pub title: String,
}

pub const AUTO_BADGE_TEXT: &str = "AUTO";

pub fn render_badge(effective: &Effective<'_>, style: &BadgeStyle) -> Badge {
    let prefix = &style.title_prefix;
    match effective {
        Effective::Manual(p) => Badge {
            text: p.alias.clone(),
            color: Some(style.neutral_color.clone()),
            title: format!("{}\nActive: {}", prefix, p.name),
        },
        Effective::GlobalSpecific(p) => Badge {
            text: p.alias.clone(),
            color: Some(style.neutral_color.clone()),
            title: format!("{}\nActive (global): {}", prefix, p.name),
        },
        Effective::AutoMatched { profile, .. } => Badge {
            text: profile.alias.clone(),
            color: Some(style.matched_color.clone()),
            title: format!("{}\nAuto - spoof active: {}", prefix, profile.name),
        },
        Effective::AutoUnmatched => Badge {
            text: AUTO_BADGE_TEXT.to_string(),
            color: Some(style.unmatched_color.clone()),
            title: format!("{}\nAuto mode (no spoof for this domain)", prefix),
        },
        Effective::GlobalDefault => Badge {
            text: String::new(),
            color: None,
            title: format!("{}\nActive: Default", prefix),
        },
    }
}
