//! Error types for credbridge-native

use thiserror::Error;

/// Errors reported by a platform credential store
#[derive(Error, Debug)]
pub enum Error {
    /// A platform API returned a failure status
    #[error("Native error: {operation} failed with status {status:#010x}")]
    Native {
        /// Platform call that failed
        operation: &'static str,
        /// Raw status code
        status: u32,
    },

    /// Output buffer cannot hold the result
    #[error("Buffer too small: {required} bytes required, {provided} provided")]
    BufferTooSmall {
        /// Bytes needed
        required: usize,
        /// Bytes offered
        provided: usize,
    },

    /// Object used after it was consumed
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Argument rejected by the platform
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Named key does not exist
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Named certificate store does not exist
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    /// Operation not available for this key or platform
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Signing error
    #[error("Signing error: {0}")]
    Signing(String),

    /// Verification error
    #[error("Verification error: {0}")]
    Verification(String),

    /// Key blob or key material error
    #[error("Crypto error: {0}")]
    Crypto(#[from] credbridge_crypto::Error),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, Error>;
