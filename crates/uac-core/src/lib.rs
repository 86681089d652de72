//! UA Changer Core Library
//!
//! This crate holds the data model and the pure decision logic of the UA
//! Changer extension: which `User-Agent` value a profile resolves to, whether
//! a tab URL falls under a domain spoof, and which profile a tab's badge
//! should show. Nothing here performs I/O; the runtime crate feeds it an
//! immutable [`State`] snapshot per event.
//!
//! # Modules
//!
//! - `types`: Profiles, spoofs, global mode, resource types, state snapshot
//! - `catalog`: Ordered profile table and spoof list with insertion rules
//! - `url`: Hostname/pathname extraction for tab URLs
//! - `matcher`: Domain pattern matcher used for badge prediction
//! - `resolver`: Profile id to header value, real-UA cache
//! - `effective`: Active profile per tab and badge rendering
//! - `validate`: User input validation
//! - `settings`: Import/export bundle

pub mod catalog;
pub mod effective;
pub mod matcher;
pub mod resolver;
pub mod settings;
pub mod types;
pub mod url;
pub mod validate;

// Re-export commonly used types
pub use catalog::{ProfileTable, SpoofList};
pub use effective::{effective_profile_for, render_badge, Badge, BadgeStyle, Effective, SourceKind};
pub use matcher::{matches, DomainPattern};
pub use resolver::{resolve, RealUserAgent, UserAgentSource, FALLBACK_USER_AGENT};
pub use types::{
    ComposeMode, CustomProfile, DomainSpoof, GlobalMode, Profile, ResourceTypes, State, TabId, AUTO_ID,
    DEFAULT_ID,
};
pub use validate::ValidationError;
