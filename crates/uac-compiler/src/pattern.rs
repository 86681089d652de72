//! Pattern Compiler
//!
//! Translates a user-authored domain pattern into the declarative engine's
//! `urlFilter` syntax.

use uac_core::matcher::DomainPattern;
use uac_core::url::strip_http_scheme;

/// Compile a domain pattern to a `urlFilter`.
///
/// Bare domains widen to every subdomain (`example.com` and
/// `www.example.com` both become `*://*.example.com/*`); wildcard
/// patterns keep their wildcard; path patterns get a trailing `*`.
pub fn compile(pattern: &str) -> String {
    let stripped = strip_http_scheme(pattern.trim());

    if let DomainPattern::WithPath { .. } = DomainPattern::parse(stripped) {
        return if stripped.ends_with('*') {
            format!("*://{}", stripped)
        } else {
            format!("*://{}*", stripped)
        };
    }

    let domain = stripped.strip_suffix('/').unwrap_or(stripped);
    let domain = domain.strip_prefix("www.").unwrap_or(domain);

    match DomainPattern::parse(domain) {
        DomainPattern::WildcardSubdomain(_) | DomainPattern::WildcardPrefix(_) => {
            format!("*://{}/*", domain)
        }
        _ => format!("*://*.{}/*", domain),
    }
}
