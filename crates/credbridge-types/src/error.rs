//! Error types for credbridge-types

use thiserror::Error;

/// Errors that can occur while parsing shared types
#[derive(Error, Debug)]
pub enum Error {
    /// Store URI is malformed
    #[error("Invalid store URI: {0}")]
    InvalidStoreUri(String),

    /// Digest name is not one of the supported algorithms
    #[error("Unsupported digest: {0}")]
    UnsupportedDigest(String),

    /// Padding mode is not recognized
    #[error("Unsupported padding mode: {0}")]
    UnsupportedPadding(String),

    /// Salt length token or value is not recognized
    #[error("Invalid salt length: {0}")]
    InvalidSaltLength(String),

    /// Certificate hash has the wrong size or encoding
    #[error("Invalid certificate hash: {0}")]
    InvalidCertificateHash(String),
}

/// Result type for credbridge-types operations
pub type Result<T> = std::result::Result<T, Error>;
