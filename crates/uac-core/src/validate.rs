//! Input validation for profiles and domain spoofs
//!
//! Everything here runs at the point of user input. Anything rejected never
//! reaches rule synthesis.

use unicode_normalization::UnicodeNormalization;

use crate::catalog::{ProfileTable, SpoofList};
use crate::types::{is_reserved_id, CustomProfile, DomainSpoof};
use crate::url::strip_http_scheme;

/// Longest alias that fits on the toolbar badge.
pub const MAX_ALIAS_LEN: usize = 4;

const RESERVED_NAMES: [&str; 2] = ["auto", "default"];
const RESERVED_ALIASES: [&str; 2] = ["auto", "def"];

/// Error type for rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name is required")]
    EmptyName,
    #[error("Alias is required")]
    EmptyAlias,
    #[error("User-Agent string is required")]
    EmptyUserAgent,
    #[error("Alias '{0}' must be 4 characters or less")]
    AliasTooLong(String),
    #[error("Name '{0}' may only contain letters, digits and single spaces")]
    InvalidNameChars(String),
    #[error("Alias '{0}' may only contain letters, digits and single spaces")]
    InvalidAliasChars(String),
    #[error("\"{0}\" is a reserved name")]
    ReservedName(String),
    #[error("\"{0}\" is a reserved alias")]
    ReservedAlias(String),
    #[error("A profile named '{0}' already exists")]
    DuplicateName(String),
    #[error("A profile with alias '{0}' already exists")]
    DuplicateAlias(String),
    #[error("Id '{0}' is already in use")]
    DuplicateId(String),
    #[error("Id is required")]
    EmptyId,
    #[error("Invalid domain pattern: '{0}'")]
    InvalidDomain(String),
    #[error("Domain '{0}' already has a spoof configured")]
    DuplicateDomain(String),
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
    #[error("Profile '{0}' is reserved and cannot be modified or deleted")]
    ReservedProfile(String),
}

// =============================================================================
// String Normalization
// =============================================================================

/// Lower-case and strip combining diacritics so `Déf` compares equal to `def`.
pub fn normalize_label(s: &str) -> String {
    s.to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// ASCII letters, digits and single spaces only.
pub fn is_alphanumeric_with_spaces(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b' ')
        && !s.contains("  ")
}

// =============================================================================
// Profile Validation
// =============================================================================

/// Check a display name against reserved words and existing profiles.
pub fn validate_name(name: &str, profiles: &ProfileTable) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !is_alphanumeric_with_spaces(trimmed) {
        return Err(ValidationError::InvalidNameChars(trimmed.to_string()));
    }

    let normalized = normalize_label(trimmed);
    if RESERVED_NAMES.contains(&normalized.as_str()) {
        return Err(ValidationError::ReservedName(trimmed.to_string()));
    }
    if profiles.iter().any(|p| normalize_label(p.name()) == normalized) {
        return Err(ValidationError::DuplicateName(trimmed.to_string()));
    }
    Ok(())
}

/// Check a badge alias against length, reserved words and existing aliases.
pub fn validate_alias(alias: &str, profiles: &ProfileTable) -> Result<(), ValidationError> {
    let trimmed = alias.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyAlias);
    }
    if trimmed.chars().count() > MAX_ALIAS_LEN {
        return Err(ValidationError::AliasTooLong(trimmed.to_string()));
    }
    if !is_alphanumeric_with_spaces(trimmed) {
        return Err(ValidationError::InvalidAliasChars(trimmed.to_string()));
    }

    let normalized = normalize_label(trimmed);
    if RESERVED_ALIASES.contains(&normalized.as_str()) {
        return Err(ValidationError::ReservedAlias(trimmed.to_string()));
    }
    if profiles.iter().any(|p| normalize_label(p.alias()) == normalized) {
        return Err(ValidationError::DuplicateAlias(trimmed.to_string()));
    }
    Ok(())
}

/// Validate a new custom profile and return it normalized: trimmed name and
/// UA, upper-cased alias.
pub fn validate_new_profile(draft: CustomProfile, profiles: &ProfileTable) -> Result<CustomProfile, ValidationError> {
    let id = draft.id.trim();
    if id.is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if is_reserved_id(id) {
        return Err(ValidationError::ReservedProfile(id.to_string()));
    }
    if profiles.contains(id) {
        return Err(ValidationError::DuplicateId(id.to_string()));
    }

    validate_name(&draft.name, profiles)?;
    validate_alias(&draft.alias, profiles)?;

    let user_agent = draft.user_agent.trim();
    if user_agent.is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    Ok(CustomProfile {
        id: id.to_string(),
        name: draft.name.trim().to_string(),
        alias: draft.alias.trim().to_uppercase(),
        user_agent: user_agent.to_string(),
        mode: draft.mode,
    })
}

// =============================================================================
// Domain Validation
// =============================================================================

/// Validate a user-authored domain pattern.
///
/// Accepted: optional `http(s)://`, optional `*.` or `*` prefix, one or more
/// dot-separated labels of letters, digits and hyphens (not starting with a
/// hyphen), then an optional `/path` without whitespace.
pub fn validate_domain_pattern(domain: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidDomain(domain.to_string());

    let trimmed = domain.trim();
    let rest = strip_http_scheme(trimmed);
    if rest.is_empty() {
        return Err(invalid());
    }

    let (host, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], Some(&rest[slash..])),
        None => (rest, None),
    };

    let host = host
        .strip_prefix("*.")
        .or_else(|| host.strip_prefix('*'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid());
    }

    for label in host.split('.') {
        let bytes = label.as_bytes();
        if bytes.is_empty() || !bytes[0].is_ascii_alphanumeric() {
            return Err(invalid());
        }
        if !bytes.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid());
        }
    }

    if let Some(path) = path {
        if path.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
    }

    Ok(())
}

/// Validate a new spoof against the existing list and profile table.
pub fn validate_new_spoof(
    draft: DomainSpoof,
    spoofs: &SpoofList,
    profiles: &ProfileTable,
) -> Result<DomainSpoof, ValidationError> {
    let id = draft.id.trim();
    if id.is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if spoofs.get(id).is_some() {
        return Err(ValidationError::DuplicateId(id.to_string()));
    }

    let domain = draft.domain.trim();
    validate_domain_pattern(domain)?;
    if spoofs.contains_domain(domain) {
        return Err(ValidationError::DuplicateDomain(domain.to_string()));
    }

    let target = draft.user_agent_id.as_str();
    if is_reserved_id(target) {
        return Err(ValidationError::ReservedProfile(target.to_string()));
    }
    if profiles.custom(target).is_none() {
        return Err(ValidationError::UnknownProfile(target.to_string()));
    }

    Ok(DomainSpoof {
        id: id.to_string(),
        domain: domain.to_string(),
        user_agent_id: draft.user_agent_id,
        enabled: draft.enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComposeMode;

    fn table() -> ProfileTable {
        ProfileTable::seeded("Default", "Auto")
    }

    fn draft(name: &str, alias: &str) -> CustomProfile {
        CustomProfile {
            id: "new".into(),
            name: name.into(),
            alias: alias.into(),
            user_agent: " UA-X ".into(),
            mode: ComposeMode::Replace,
        }
    }

    #[test]
    fn normalization_strips_case_and_diacritics() {
        assert_eq!(normalize_label("Déf"), "def");
        assert_eq!(normalize_label("ÀUTO"), "auto");
    }

    #[test]
    fn reserved_and_duplicate_aliases_rejected() {
        let profiles = table();
        assert_eq!(
            validate_alias("DEF", &profiles),
            Err(ValidationError::ReservedAlias("DEF".into()))
        );
        assert_eq!(
            validate_alias("ios", &profiles),
            Err(ValidationError::DuplicateAlias("ios".into()))
        );
        assert_eq!(
            validate_alias("TOOLONG", &profiles),
            Err(ValidationError::AliasTooLong("TOOLONG".into()))
        );
        assert!(validate_alias("TAB", &profiles).is_ok());
    }

    #[test]
    fn reserved_and_duplicate_names_rejected() {
        let profiles = table();
        assert_eq!(
            validate_name("default", &profiles),
            Err(ValidationError::ReservedName("default".into()))
        );
        assert_eq!(
            validate_name("ANDROID", &profiles),
            Err(ValidationError::DuplicateName("ANDROID".into()))
        );
        assert_eq!(
            validate_name("Two  spaces", &profiles),
            Err(ValidationError::InvalidNameChars("Two  spaces".into()))
        );
        assert!(validate_name("Tablet", &profiles).is_ok());
    }

    #[test]
    fn new_profile_is_normalized() {
        let profile = validate_new_profile(draft(" Tablet ", "tab"), &table()).unwrap();
        assert_eq!(profile.name, "Tablet");
        assert_eq!(profile.alias, "TAB");
        assert_eq!(profile.user_agent, "UA-X");
    }

    #[test]
    fn new_profile_requires_user_agent() {
        let mut d = draft("Tablet", "TAB");
        d.user_agent = "   ".into();
        assert_eq!(validate_new_profile(d, &table()), Err(ValidationError::EmptyUserAgent));
    }

    #[test]
    fn new_profile_cannot_take_reserved_id() {
        let mut d = draft("Tablet", "TAB");
        d.id = "auto".into();
        assert_eq!(
            validate_new_profile(d, &table()),
            Err(ValidationError::ReservedProfile("auto".into()))
        );
    }

    #[test]
    fn domain_patterns() {
        for ok in [
            "example.com",
            "*.example.com",
            "*example.com",
            "example.com/api/*",
            "https://example.com",
            "localhost/core/*",
            "localhost",
        ] {
            assert!(validate_domain_pattern(ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["", "*", "*.", "exa mple.com", "-bad.com", "a..com", "example.com/a b", "http://"] {
            assert!(validate_domain_pattern(bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn spoof_must_target_custom_profile() {
        let profiles = table();
        let spoofs = SpoofList::default();
        let spoof = DomainSpoof {
            id: "s1".into(),
            domain: "a.com".into(),
            user_agent_id: "default".into(),
            enabled: true,
        };
        assert_eq!(
            validate_new_spoof(spoof.clone(), &spoofs, &profiles),
            Err(ValidationError::ReservedProfile("default".into()))
        );
        let missing = DomainSpoof { user_agent_id: "gone".into(), ..spoof.clone() };
        assert_eq!(
            validate_new_spoof(missing, &spoofs, &profiles),
            Err(ValidationError::UnknownProfile("gone".into()))
        );
        let ok = DomainSpoof { user_agent_id: "iphone".into(), domain: " a.com ".into(), ..spoof };
        assert_eq!(validate_new_spoof(ok, &spoofs, &profiles).unwrap().domain, "a.com");
    }
}
