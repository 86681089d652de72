//! Settings bundle import/export
//!
//! Versioned JSON document carrying custom profiles, domain spoofs and the
//! global mode between installations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{ProfileTable, SpoofList};
use crate::types::{is_reserved_id, DomainSpoof, GlobalMode, Profile};

/// Error type for bundle parsing.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Settings bundle must be a JSON object")]
    NotAnObject,
    #[error("Settings bundle contains neither userAgents nor permanentSpoofs")]
    Empty,
    #[error("Invalid entry in {section}[{index}]: {reason}")]
    InvalidEntry {
        section: &'static str,
        index: usize,
        reason: String,
    },
}

/// Exported settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBundle {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_agents: Vec<Profile>,
    #[serde(default)]
    pub permanent_spoofs: Vec<DomainSpoof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_user_agent: Option<GlobalMode>,
}

impl SettingsBundle {
    pub fn to_json_pretty(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Build an export bundle. Reserved profiles are left out.
pub fn export_settings(
    profiles: &ProfileTable,
    spoofs: &SpoofList,
    global: &GlobalMode,
    version: &str,
    exported_at: DateTime<Utc>,
) -> SettingsBundle {
    SettingsBundle {
        version: version.to_string(),
        export_date: Some(exported_at),
        user_agents: profiles.iter().filter(|p| !p.is_reserved()).cloned().collect(),
        permanent_spoofs: spoofs.as_slice().to_vec(),
        global_user_agent: Some(global.clone()),
    }
}

/// File name the options page offers for a download.
pub fn export_file_name(exported_at: DateTime<Utc>) -> String {
    format!("useragent-changer-settings-{}.json", exported_at.format("%Y-%m-%d"))
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse and structurally validate a bundle.
///
/// Every profile needs `id`, `name` and `alias` and, when present, a mode of
/// `replace` or `append`; every spoof needs `id`, `domain` and `userAgentId`.
pub fn parse_bundle(json: &str) -> Result<SettingsBundle, SettingsError> {
    let value: Value = serde_json::from_str(json)?;
    let object = value.as_object().ok_or(SettingsError::NotAnObject)?;

    let user_agents = object.get("userAgents");
    let spoofs = object.get("permanentSpoofs");
    if user_agents.is_none() && spoofs.is_none() {
        return Err(SettingsError::Empty);
    }

    if let Some(list) = user_agents {
        check_entries(list, "userAgents", &["id", "name", "alias"], |entry| {
            match entry.get("mode").and_then(Value::as_str) {
                None | Some("replace") | Some("append") => Ok(()),
                // Reserved entries from older exports carry mode "auto"
                Some("auto") if entry.get("id").and_then(Value::as_str) == Some("auto") => Ok(()),
                Some(other) => Err(format!("unknown mode '{}'", other)),
            }
        })?;
    }
    if let Some(list) = spoofs {
        check_entries(list, "permanentSpoofs", &["id", "domain", "userAgentId"], |_| Ok(()))?;
    }

    Ok(serde_json::from_value(value)?)
}

fn check_entries(
    list: &Value,
    section: &'static str,
    required: &[&str],
    extra: impl Fn(&Value) -> Result<(), String>,
) -> Result<(), SettingsError> {
    let entries = list.as_array().ok_or_else(|| SettingsError::InvalidEntry {
        section,
        index: 0,
        reason: "expected an array".to_string(),
    })?;

    for (index, entry) in entries.iter().enumerate() {
        for key in required {
            let present = entry
                .get(*key)
                .and_then(Value::as_str)
                .map_or(false, |s| !s.is_empty());
            if !present {
                return Err(SettingsError::InvalidEntry {
                    section,
                    index,
                    reason: format!("missing '{}'", key),
                });
            }
        }
        extra(entry).map_err(|reason| SettingsError::InvalidEntry { section, index, reason })?;
    }
    Ok(())
}

// =============================================================================
// Import
// =============================================================================

/// Counts reported back to the options page after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub profiles_added: usize,
    pub profiles_skipped: usize,
    pub spoofs_added: usize,
    pub spoofs_skipped: usize,
    pub global_updated: bool,
}

impl ImportReport {
    pub fn added(&self) -> usize {
        self.profiles_added + self.spoofs_added
    }
}

/// Merge a bundle into existing collections.
///
/// Reserved profiles and profiles whose id already exists are skipped;
/// spoofs whose id or domain already exists are skipped. A present
/// `globalUserAgent` replaces `global`.
pub fn import_settings(
    bundle: &SettingsBundle,
    profiles: &mut ProfileTable,
    spoofs: &mut SpoofList,
    global: &mut GlobalMode,
) -> ImportReport {
    let mut report = ImportReport::default();

    for profile in &bundle.user_agents {
        if profile.is_reserved() || is_reserved_id(profile.id()) || profiles.contains(profile.id()) {
            report.profiles_skipped += 1;
            continue;
        }
        profiles.push_unchecked(profile.clone());
        report.profiles_added += 1;
    }

    let mut ids: HashSet<String> = spoofs.iter().map(|s| s.id.clone()).collect();
    let mut domains: HashSet<String> = spoofs.iter().map(|s| s.domain.clone()).collect();
    for spoof in &bundle.permanent_spoofs {
        if ids.contains(&spoof.id) || domains.contains(&spoof.domain) {
            report.spoofs_skipped += 1;
            continue;
        }
        ids.insert(spoof.id.clone());
        domains.insert(spoof.domain.clone());
        spoofs.push_unchecked(spoof.clone());
        report.spoofs_added += 1;
    }

    if let Some(mode) = &bundle.global_user_agent {
        *global = mode.clone();
        report.global_updated = true;
    }

    log::debug!(
        "imported {} profiles ({} skipped), {} spoofs ({} skipped)",
        report.profiles_added,
        report.profiles_skipped,
        report.spoofs_added,
        report.spoofs_skipped
    );

    report
}
