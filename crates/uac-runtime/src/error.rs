use uac_core::settings::SettingsError;
use uac_core::validate::ValidationError;

use crate::substrate::SubstrateError;

/// Error type for controller entry points.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Substrate(#[from] SubstrateError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("A tab id is required to pick a user agent")]
    MissingTabId,
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
    #[error("Invalid value stored under '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
