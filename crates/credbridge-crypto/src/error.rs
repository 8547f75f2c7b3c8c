//! Error types for credbridge-crypto

use thiserror::Error;

/// Errors that can occur in cryptographic helpers
#[derive(Error, Debug)]
pub enum Error {
    /// Key-storage blob is truncated or inconsistent with its header
    #[error("Malformed key blob: {0}")]
    MalformedBlob(String),

    /// Verification error
    #[error("Verification error: {0}")]
    Verification(String),

    /// Invalid key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Certificate parsing error
    #[error("Certificate error: {0}")]
    InvalidCertificate(String),

    /// Unsupported algorithm
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// AWS-LC-RS error
    #[error("Crypto error: {0}")]
    AwsLc(String),
}

impl From<aws_lc_rs::error::Unspecified> for Error {
    fn from(_: aws_lc_rs::error::Unspecified) -> Self {
        Error::AwsLc("unspecified error".to_string())
    }
}

impl From<rsa::Error> for Error {
    fn from(e: rsa::Error) -> Self {
        Error::InvalidKey(e.to_string())
    }
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, Error>;
