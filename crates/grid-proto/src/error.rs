//! Error types for protocol-level validation.

use thiserror::Error;

/// Errors raised while parsing or validating protocol types.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A value failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// An unknown plugin name was requested.
    #[error("unknown {kind}: '{name}'")]
    UnknownPlugin {
        /// What kind of plugin was being selected (e.g. "capability matcher").
        kind: &'static str,
        /// The name that did not resolve.
        name: String,
    },
}
