//! Error types for credbridge-provider

use thiserror::Error;

/// Errors raised by the provider operations before they collapse into the
/// host's success/failure convention
#[derive(Error, Debug)]
pub enum Error {
    /// Native credential store failure
    #[error("Native error: {0}")]
    Native(#[from] credbridge_native::Error),

    /// Key blob, digest or verification failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] credbridge_crypto::Error),

    /// Digest, padding, salt length or URI rejected
    #[error("Invalid value: {0}")]
    Types(#[from] credbridge_types::Error),

    /// Operation or selection not supported
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Parameter missing, mistyped or malformed
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation called out of order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Private key material was requested
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Key object has no native handle
    #[error("Key has no native handle")]
    EmptyKey,
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, Error>;
