//! Domain Pattern Matcher
//!
//! Predicts, without issuing a request, whether a tab URL falls under a
//! user-authored domain pattern. The declarative engine evaluates the
//! compiled filter on its own; this matcher only drives badge display.
//!
//! Note the asymmetry with the compiled filter: `*.example.com` does not
//! match the bare `example.com` here, while a bare `example.com` pattern
//! matches itself and every subdomain.

use crate::url::{is_restricted_url, parse_url, strip_http_scheme};

/// Classified form of a user-authored domain pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainPattern<'a> {
    /// `example.com/api/*` - `domain` and `path` are split at the first '/'
    WithPath { domain: &'a str, path: &'a str },
    /// `*.example.com` - holds `example.com`
    WildcardSubdomain(&'a str),
    /// `*example.com` - holds `example.com`
    WildcardPrefix(&'a str),
    /// `example.com`
    Exact(&'a str),
}

impl<'a> DomainPattern<'a> {
    /// Classify a pattern after stripping an `http(s)://` prefix.
    pub fn parse(pattern: &'a str) -> Self {
        let pattern = strip_http_scheme(pattern);

        if let Some(slash) = pattern.find('/') {
            return Self::WithPath {
                domain: &pattern[..slash],
                path: &pattern[slash + 1..],
            };
        }

        if let Some(base) = pattern.strip_prefix("*.") {
            Self::WildcardSubdomain(base)
        } else if let Some(base) = pattern.strip_prefix('*') {
            Self::WildcardPrefix(base)
        } else {
            Self::Exact(pattern)
        }
    }

    /// Test a hostname/pathname pair against this pattern.
    pub fn matches_parts(&self, host: &str, path: &str) -> bool {
        match *self {
            Self::WithPath { domain, path: path_pattern } => {
                let domain = domain.strip_prefix("*.").unwrap_or(domain);
                if !host.contains(domain) {
                    return false;
                }
                if path_pattern.is_empty() || path_pattern == "*" {
                    return true;
                }
                let clean = path_pattern.replacen('*', "", 1);
                path.strip_prefix('/')
                    .map_or(false, |rest| rest.starts_with(clean.as_str()))
            }
            Self::WildcardSubdomain(base) => is_subdomain_of(host, base),
            Self::WildcardPrefix(base) => host.contains(base),
            Self::Exact(domain) => host == domain || is_subdomain_of(host, domain),
        }
    }
}

/// True when `host` is a strict subdomain of `base` (label boundary).
#[inline]
fn is_subdomain_of(host: &str, base: &str) -> bool {
    host.len() > base.len() && host.ends_with(base) && host.as_bytes()[host.len() - base.len() - 1] == b'.'
}

/// Does `url` fall under `pattern`? Malformed and browser-internal URLs
/// never match.
pub fn matches(url: &str, pattern: &str) -> bool {
    if is_restricted_url(url) {
        return false;
    }
    match parse_url(url) {
        Some(parts) => DomainPattern::parse(pattern).matches_parts(&parts.host, parts.path),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_subdomain_excludes_bare_domain() {
        assert!(matches("https://sub.example.com/x", "*.example.com"));
        assert!(matches("https://a.b.example.com", "*.example.com"));
        assert!(!matches("https://example.com", "*.example.com"));
        assert!(!matches("https://news.com/", "*.news.com"));
        assert!(!matches("https://badexample.com/", "*.example.com"));
    }

    #[test]
    fn bare_domain_matches_itself_and_subdomains() {
        assert!(matches("https://example.com/", "example.com"));
        assert!(matches("https://www.example.com/", "example.com"));
        assert!(matches("http://deep.sub.example.com/", "example.com"));
        assert!(!matches("https://notexample.com/", "example.com"));
        assert!(!matches("https://example.com.evil.net/", "example.com"));
    }

    #[test]
    fn wildcard_prefix_is_substring_match() {
        assert!(matches("https://myexample.com/", "*example.com"));
        assert!(matches("https://example.com/", "*example.com"));
        assert!(!matches("https://example.org/", "*example.com"));
    }

    #[test]
    fn path_patterns() {
        assert!(matches("https://example.com/api/v1", "example.com/api/*"));
        assert!(!matches("https://example.com/api", "example.com/api/*"));
        assert!(matches("https://example.com/apiary", "example.com/api*"));
        assert!(!matches("https://example.com/web", "example.com/api/*"));
        assert!(matches("http://localhost:8080/core/page", "localhost/core/*"));
        assert!(matches("https://x.example.com/anything", "*.example.com/*"));
        assert!(matches("https://example.com/anything", "example.com/"));
    }

    #[test]
    fn protocol_prefix_is_ignored() {
        assert!(matches("https://example.com/", "https://example.com"));
        assert!(matches("https://example.com/a/b", "http://example.com/a/*"));
    }

    #[test]
    fn hostname_is_normalized_to_lowercase() {
        assert!(matches("https://WWW.Example.com/", "example.com"));
    }

    #[test]
    fn malformed_urls_never_match() {
        assert!(!matches("", "example.com"));
        assert!(!matches("example.com", "example.com"));
        assert!(!matches("https://", "*"));
        assert!(!matches("about:blank", "*blank"));
        assert!(!matches("chrome://settings/", "settings"));
        assert!(!matches("chrome-extension://abc/popup.html", "*abc"));
    }

    #[test]
    fn classification() {
        assert_eq!(DomainPattern::parse("*.a.com"), DomainPattern::WildcardSubdomain("a.com"));
        assert_eq!(DomainPattern::parse("*a.com"), DomainPattern::WildcardPrefix("a.com"));
        assert_eq!(DomainPattern::parse("https://a.com"), DomainPattern::Exact("a.com"));
        assert_eq!(
            DomainPattern::parse("a.com/x/y/*"),
            DomainPattern::WithPath { domain: "a.com", path: "x/y/*" }
        );
    }
}
