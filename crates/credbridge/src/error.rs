//! Error types for credbridge

use thiserror::Error;

/// Errors raised while wiring the provider into a TLS stack
#[derive(Error, Debug)]
pub enum Error {
    /// Provider error
    #[error("Provider error: {0}")]
    Provider(#[from] credbridge_provider::Error),

    /// Native credential store error
    #[error("Native error: {0}")]
    Native(#[from] credbridge_native::Error),

    /// Crypto error
    #[error("Crypto error: {0}")]
    Crypto(#[from] credbridge_crypto::Error),

    /// Types error
    #[error("Types error: {0}")]
    Types(#[from] credbridge_types::Error),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Json(#[from] serde_json::Error),

    /// The crypto library host refused a lifecycle step
    #[error("Library host error: {0}")]
    Host(String),

    /// No certificate satisfied the search
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for credbridge operations
pub type Result<T> = std::result::Result<T, Error>;
