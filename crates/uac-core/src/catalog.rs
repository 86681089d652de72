//! Profile and spoof collections
//!
//! Ordered lists as kept in storage (`userAgents`, `permanentSpoofs`),
//! with the insertion rules the management surface relies on.

use serde::{Deserialize, Serialize};

use crate::types::{ComposeMode, CustomProfile, DomainSpoof, Profile};
use crate::validate::{self, ValidationError};

/// Literal UA of the seeded iPhone profile.
pub const IPHONE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";
/// Literal UA of the seeded Android profile.
pub const ANDROID_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36";

// =============================================================================
// Profile Table
// =============================================================================

/// Ordered profile list, reserved entries included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable {
    profiles: Vec<Profile>,
}

impl ProfileTable {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }

    /// First-run table: the two reserved profiles plus two mobile presets.
    pub fn seeded(default_name: &str, auto_name: &str) -> Self {
        Self::new(vec![
            Profile::Default { name: default_name.to_string() },
            Profile::Auto { name: auto_name.to_string() },
            Profile::Custom(CustomProfile {
                id: "iphone".to_string(),
                name: "iPhone 14".to_string(),
                alias: "iOS".to_string(),
                user_agent: IPHONE_USER_AGENT.to_string(),
                mode: ComposeMode::Replace,
            }),
            Profile::Custom(CustomProfile {
                id: "android".to_string(),
                name: "Android".to_string(),
                alias: "AND".to_string(),
                user_agent: ANDROID_USER_AGENT.to_string(),
                mode: ComposeMode::Replace,
            }),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id() == id)
    }

    /// Look up a profile that carries a literal UA string.
    pub fn custom(&self, id: &str) -> Option<&CustomProfile> {
        self.get(id).and_then(Profile::as_custom)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn as_slice(&self) -> &[Profile] {
        &self.profiles
    }

    /// Validate and append a new custom profile. The alias is stored
    /// upper-cased, name and UA trimmed.
    pub fn add(&mut self, draft: CustomProfile) -> Result<CustomProfile, ValidationError> {
        let profile = validate::validate_new_profile(draft, self)?;
        self.profiles.push(Profile::Custom(profile.clone()));
        Ok(profile)
    }

    /// Append without validation; used when merging imported data that was
    /// already checked structurally.
    pub(crate) fn push_unchecked(&mut self, profile: Profile) {
        self.profiles.push(profile);
    }

    /// Delete a custom profile. Reserved profiles cannot be removed.
    pub fn remove(&mut self, id: &str) -> Result<Profile, ValidationError> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| ValidationError::UnknownProfile(id.to_string()))?;
        if self.profiles[idx].is_reserved() {
            return Err(ValidationError::ReservedProfile(id.to_string()));
        }
        Ok(self.profiles.remove(idx))
    }

    /// Regenerate the reserved display names (language change). Missing
    /// reserved entries are inserted at the front.
    pub fn rename_reserved(&mut self, default_name: &str, auto_name: &str) {
        let mut has_default = false;
        let mut has_auto = false;
        for profile in &mut self.profiles {
            match profile {
                Profile::Default { name } => {
                    *name = default_name.to_string();
                    has_default = true;
                }
                Profile::Auto { name } => {
                    *name = auto_name.to_string();
                    has_auto = true;
                }
                Profile::Custom(_) => {}
            }
        }
        if !has_auto {
            self.profiles.insert(0, Profile::Auto { name: auto_name.to_string() });
        }
        if !has_default {
            self.profiles.insert(0, Profile::Default { name: default_name.to_string() });
        }
    }

    /// Custom profiles only, in table order.
    pub fn customs(&self) -> impl Iterator<Item = &CustomProfile> {
        self.profiles.iter().filter_map(Profile::as_custom)
    }
}

impl FromIterator<Profile> for ProfileTable {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// =============================================================================
// Spoof List
// =============================================================================

/// Ordered list of domain spoofs; order decides which spoof wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpoofList {
    spoofs: Vec<DomainSpoof>,
}

impl SpoofList {
    pub fn new(spoofs: Vec<DomainSpoof>) -> Self {
        Self { spoofs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainSpoof> {
        self.spoofs.iter()
    }

    /// Enabled entries in list order.
    pub fn enabled(&self) -> impl Iterator<Item = &DomainSpoof> {
        self.spoofs.iter().filter(|s| s.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&DomainSpoof> {
        self.spoofs.iter().find(|s| s.id == id)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.spoofs.iter().any(|s| s.domain == domain)
    }

    pub fn len(&self) -> usize {
        self.spoofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spoofs.is_empty()
    }

    pub fn as_slice(&self) -> &[DomainSpoof] {
        &self.spoofs
    }

    /// Validate and append a spoof. The domain string must be unique and
    /// the profile must be an existing custom profile.
    pub fn add(&mut self, draft: DomainSpoof, profiles: &ProfileTable) -> Result<&DomainSpoof, ValidationError> {
        let spoof = validate::validate_new_spoof(draft, self, profiles)?;
        self.spoofs.push(spoof);
        Ok(&self.spoofs[self.spoofs.len() - 1])
    }

    pub(crate) fn push_unchecked(&mut self, spoof: DomainSpoof) {
        self.spoofs.push(spoof);
    }

    pub fn remove(&mut self, id: &str) -> Option<DomainSpoof> {
        let idx = self.spoofs.iter().position(|s| s.id == id)?;
        Some(self.spoofs.remove(idx))
    }

    /// Enable or disable a spoof; returns false when the id is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.spoofs.iter_mut().find(|s| s.id == id) {
            Some(spoof) => {
                spoof.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

impl FromIterator<DomainSpoof> for SpoofList {
    fn from_iter<I: IntoIterator<Item = DomainSpoof>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AUTO_ID, DEFAULT_ID};

    fn draft(id: &str, name: &str, alias: &str) -> CustomProfile {
        CustomProfile {
            id: id.to_string(),
            name: name.to_string(),
            alias: alias.to_string(),
            user_agent: "UA".to_string(),
            mode: ComposeMode::Replace,
        }
    }

    #[test]
    fn seeded_table_has_reserved_entries() {
        let table = ProfileTable::seeded("Default", "Auto");
        assert!(table.get(DEFAULT_ID).unwrap().is_reserved());
        assert!(table.get(AUTO_ID).unwrap().is_reserved());
        assert_eq!(table.custom("iphone").unwrap().alias, "iOS");
        assert!(table.custom(DEFAULT_ID).is_none());
    }

    #[test]
    fn add_uppercases_alias() {
        let mut table = ProfileTable::seeded("Default", "Auto");
        let added = table.add(draft("t1", "Tablet", "tab")).unwrap();
        assert_eq!(added.alias, "TAB");
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn reserved_profiles_cannot_be_removed() {
        let mut table = ProfileTable::seeded("Default", "Auto");
        assert_eq!(
            table.remove(DEFAULT_ID),
            Err(ValidationError::ReservedProfile(DEFAULT_ID.to_string()))
        );
        assert!(table.remove("android").is_ok());
        assert!(!table.contains("android"));
    }

    #[test]
    fn rename_reserved_updates_and_restores() {
        let mut table = ProfileTable::new(vec![Profile::Custom(draft("x", "X", "X"))]);
        table.rename_reserved("Predeterminado", "Automatico");
        assert_eq!(table.get(DEFAULT_ID).unwrap().name(), "Predeterminado");
        assert_eq!(table.get(AUTO_ID).unwrap().name(), "Automatico");
        assert_eq!(table.as_slice()[0].id(), DEFAULT_ID);
        assert_eq!(table.as_slice()[1].id(), AUTO_ID);
    }

    #[test]
    fn spoof_duplicate_domain_rejected() {
        let profiles = ProfileTable::seeded("Default", "Auto");
        let mut spoofs = SpoofList::default();
        let spoof = DomainSpoof {
            id: "1".into(),
            domain: "example.com".into(),
            user_agent_id: "iphone".into(),
            enabled: true,
        };
        spoofs.add(spoof.clone(), &profiles).unwrap();
        let dup = DomainSpoof { id: "2".into(), ..spoof };
        assert_eq!(
            spoofs.add(dup, &profiles),
            Err(ValidationError::DuplicateDomain("example.com".into()))
        );
    }

    #[test]
    fn toggling_spoofs() {
        let mut spoofs = SpoofList::new(vec![DomainSpoof {
            id: "1".into(),
            domain: "a.com".into(),
            user_agent_id: "iphone".into(),
            enabled: true,
        }]);
        assert!(spoofs.set_enabled("1", false));
        assert_eq!(spoofs.enabled().count(), 0);
        assert!(!spoofs.set_enabled("missing", true));
        assert!(spoofs.remove("1").is_some());
        assert!(spoofs.is_empty());
    }
}
