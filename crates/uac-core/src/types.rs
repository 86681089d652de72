//! Core type definitions for UA Changer
//!
//! These types mirror the records the extension keeps in storage and are
//! shared by the rule compiler, the runtime controller and the bindings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::{ProfileTable, SpoofList};

/// Browser tab identifier.
pub type TabId = i32;

/// Id of the reserved "use the real browser UA" profile.
pub const DEFAULT_ID: &str = "default";
/// Id of the reserved "defer to domain spoofs" profile.
pub const AUTO_ID: &str = "auto";

pub const DEFAULT_ALIAS: &str = "DEF";
pub const AUTO_ALIAS: &str = "AUTO";

/// Returns true for the two ids that never carry a literal UA string.
#[inline]
pub fn is_reserved_id(id: &str) -> bool {
    id == DEFAULT_ID || id == AUTO_ID
}

// =============================================================================
// Profiles
// =============================================================================

/// How a custom profile's string is combined with the real browser UA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ComposeMode {
    /// Header is the profile string verbatim
    #[default]
    Replace,
    /// Header is `realUA + " " + profile string`
    Append,
}

impl ComposeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

/// A user-defined profile carrying a literal UA string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProfile {
    pub id: String,
    pub name: String,
    /// Badge label, at most four characters
    pub alias: String,
    pub user_agent: String,
    pub mode: ComposeMode,
}

/// A user-agent profile.
///
/// The reserved ids `default` and `auto` decode to their own variants so
/// call sites never have to compare id strings to special-case them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRecord", into = "ProfileRecord")]
pub enum Profile {
    Default { name: String },
    Auto { name: String },
    Custom(CustomProfile),
}

impl Profile {
    pub fn id(&self) -> &str {
        match self {
            Self::Default { .. } => DEFAULT_ID,
            Self::Auto { .. } => AUTO_ID,
            Self::Custom(p) => &p.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Default { name } | Self::Auto { name } => name,
            Self::Custom(p) => &p.name,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Self::Default { .. } => DEFAULT_ALIAS,
            Self::Auto { .. } => AUTO_ALIAS,
            Self::Custom(p) => &p.alias,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomProfile> {
        match self {
            Self::Custom(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

/// Flat storage/wire form of a [`Profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileDecodeError {
    #[error("profile '{id}' has unknown mode '{mode}'")]
    UnknownMode { id: String, mode: String },
    #[error("profile id must not be empty")]
    EmptyId,
}

impl TryFrom<ProfileRecord> for Profile {
    type Error = ProfileDecodeError;

    fn try_from(record: ProfileRecord) -> Result<Self, Self::Error> {
        match record.id.as_str() {
            DEFAULT_ID => return Ok(Self::Default { name: record.name }),
            AUTO_ID => return Ok(Self::Auto { name: record.name }),
            "" => return Err(ProfileDecodeError::EmptyId),
            _ => {}
        }

        let mode = match record.mode.as_deref() {
            None | Some("replace") => ComposeMode::Replace,
            Some("append") => ComposeMode::Append,
            Some(other) => {
                return Err(ProfileDecodeError::UnknownMode {
                    id: record.id,
                    mode: other.to_string(),
                })
            }
        };

        Ok(Self::Custom(CustomProfile {
            id: record.id,
            name: record.name,
            alias: record.alias,
            user_agent: record.user_agent,
            mode,
        }))
    }
}

impl From<Profile> for ProfileRecord {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::Default { name } => Self {
                id: DEFAULT_ID.to_string(),
                name,
                alias: DEFAULT_ALIAS.to_string(),
                user_agent: String::new(),
                mode: Some(ComposeMode::Replace.as_str().to_string()),
            },
            Profile::Auto { name } => Self {
                id: AUTO_ID.to_string(),
                name,
                alias: AUTO_ALIAS.to_string(),
                user_agent: String::new(),
                mode: Some("auto".to_string()),
            },
            Profile::Custom(p) => Self {
                id: p.id,
                name: p.name,
                alias: p.alias,
                user_agent: p.user_agent,
                mode: Some(p.mode.as_str().to_string()),
            },
        }
    }
}

// =============================================================================
// Domain Spoofs
// =============================================================================

fn enabled_by_default() -> bool {
    true
}

/// Binds a domain pattern to a profile; only active in auto mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DomainSpoof {
    pub id: String,
    /// `example.com`, `*.example.com`, `*example.com` or `example.com/path/*`
    pub domain: String,
    pub user_agent_id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

// =============================================================================
// Global Mode
// =============================================================================

/// Extension-wide fallback for tabs without a manual override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GlobalMode {
    #[default]
    Default,
    Auto,
    Profile(String),
}

impl GlobalMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => DEFAULT_ID,
            Self::Auto => AUTO_ID,
            Self::Profile(id) => id,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl From<String> for GlobalMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | DEFAULT_ID => Self::Default,
            AUTO_ID => Self::Auto,
            _ => Self::Profile(value),
        }
    }
}

impl From<&str> for GlobalMode {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<GlobalMode> for String {
    fn from(mode: GlobalMode) -> Self {
        match mode {
            GlobalMode::Profile(id) => id,
            other => other.as_str().to_string(),
        }
    }
}

// =============================================================================
// Resource Types
// =============================================================================

bitflags::bitflags! {
    /// Resource types a header rule applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceTypes: u16 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;
        const STYLESHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const IMAGE = 1 << 4;
        const FONT = 1 << 5;
        const OBJECT = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const PING = 1 << 8;
        const CSP_REPORT = 1 << 9;
        const MEDIA = 1 << 10;
        const WEBSOCKET = 1 << 11;
        const WEBTRANSPORT = 1 << 12;
        const WEBBUNDLE = 1 << 13;
        const OTHER = 1 << 14;

        /// All resource types
        const ALL = 0x7FFF;
    }
}

const RESOURCE_TYPE_NAMES: [(ResourceTypes, &str); 15] = [
    (ResourceTypes::MAIN_FRAME, "main_frame"),
    (ResourceTypes::SUB_FRAME, "sub_frame"),
    (ResourceTypes::STYLESHEET, "stylesheet"),
    (ResourceTypes::SCRIPT, "script"),
    (ResourceTypes::IMAGE, "image"),
    (ResourceTypes::FONT, "font"),
    (ResourceTypes::OBJECT, "object"),
    (ResourceTypes::XMLHTTPREQUEST, "xmlhttprequest"),
    (ResourceTypes::PING, "ping"),
    (ResourceTypes::CSP_REPORT, "csp_report"),
    (ResourceTypes::MEDIA, "media"),
    (ResourceTypes::WEBSOCKET, "websocket"),
    (ResourceTypes::WEBTRANSPORT, "webtransport"),
    (ResourceTypes::WEBBUNDLE, "webbundle"),
    (ResourceTypes::OTHER, "other"),
];

impl ResourceTypes {
    /// Parse from browser resource type string.
    pub fn from_str(s: &str) -> Self {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(flag, _)| *flag)
            .unwrap_or(Self::OTHER)
    }

    /// Browser names of the contained types, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

// =============================================================================
// State Snapshot
// =============================================================================

/// Immutable view of everything synthesis and badge resolution depend on.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub profiles: ProfileTable,
    pub spoofs: SpoofList,
    pub global: GlobalMode,
    /// Manual per-tab picks, tab id -> profile id
    pub tab_overrides: BTreeMap<TabId, String>,
}

impl State {
    pub fn new(profiles: ProfileTable, spoofs: SpoofList, global: GlobalMode) -> Self {
        Self {
            profiles,
            spoofs,
            global,
            tab_overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, tab_id: TabId, profile_id: impl Into<String>) -> Self {
        self.tab_overrides.insert(tab_id, profile_id.into());
        self
    }
}
