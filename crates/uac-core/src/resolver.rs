//! User-Agent resolution
//!
//! Turns a profile id into the literal header value, and holds the
//! per-process cache of the browser's authentic UA string that `append`
//! profiles build on.

use std::fmt;
use std::sync::OnceLock;

use crate::catalog::ProfileTable;
use crate::types::{ComposeMode, CustomProfile};

/// Used only when the host environment cannot report its own UA.
pub const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// =============================================================================
// Resolution
// =============================================================================

/// Compose the header value for a custom profile. `None` when the profile
/// carries no UA string.
pub fn compose(profile: &CustomProfile, real_ua: &str) -> Option<String> {
    if profile.user_agent.is_empty() {
        return None;
    }
    Some(match profile.mode {
        ComposeMode::Replace => profile.user_agent.clone(),
        ComposeMode::Append => format!("{} {}", real_ua, profile.user_agent),
    })
}

/// Resolve a profile id to the header value to install.
///
/// `None` means "no override": the id is reserved, unknown, or the profile
/// has an empty UA. Callers treat it as a lookup miss, not an error.
pub fn resolve(profile_id: &str, profiles: &ProfileTable, real_ua: &str) -> Option<String> {
    profiles.custom(profile_id).and_then(|p| compose(p, real_ua))
}

// =============================================================================
// Real-UA Cache
// =============================================================================

/// Reads the UA string of the extension's own execution environment.
pub trait UserAgentSource {
    fn read_user_agent(&self) -> Option<String>;
}

impl<F> UserAgentSource for F
where
    F: Fn() -> Option<String>,
{
    fn read_user_agent(&self) -> Option<String> {
        self()
    }
}

/// A source that always reports the same string.
#[derive(Debug, Clone)]
pub struct FixedUserAgent(pub String);

impl UserAgentSource for FixedUserAgent {
    fn read_user_agent(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Memoized authentic UA. The first `get` reads the source; later calls
/// return the cached string for the life of the process.
pub struct RealUserAgent {
    source: Box<dyn UserAgentSource>,
    cached: OnceLock<String>,
}

impl RealUserAgent {
    pub fn new(source: impl UserAgentSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: OnceLock::new(),
        }
    }

    /// Cache pre-filled with a known string.
    pub fn fixed(ua: impl Into<String>) -> Self {
        Self::new(FixedUserAgent(ua.into()))
    }

    pub fn get(&self) -> &str {
        self.cached.get_or_init(|| match self.source.read_user_agent() {
            Some(ua) if !ua.trim().is_empty() => ua,
            _ => {
                log::warn!("could not read the browser user agent, using fallback");
                FALLBACK_USER_AGENT.to_string()
            }
        })
    }

    pub fn is_cached(&self) -> bool {
        self.cached.get().is_some()
    }
}

impl fmt::Debug for RealUserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealUserAgent")
            .field("cached", &self.cached.get())
            .finish()
    }
}
