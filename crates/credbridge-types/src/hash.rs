//! Digest algorithms accepted by the signature operations

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Digest algorithms the signature context can drive through the native store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA2-256
    #[serde(rename = "SHA2-256")]
    Sha256,
    /// SHA2-384
    #[serde(rename = "SHA2-384")]
    Sha384,
    /// SHA2-512
    #[serde(rename = "SHA2-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Get the digest size in bytes for this algorithm
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Get the OID for this algorithm
    pub fn oid(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
            HashAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
            HashAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    /// Algorithm identifier understood by the platform hashing service
    pub fn native_id(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Map a digest name as handed over by the crypto host.
    ///
    /// Accepts the canonical `SHA2-256` spelling, the common `SHA256` and
    /// `SHA-256` aliases and the dotted OID. Names are case-insensitive.
    pub fn from_digest_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_uppercase();
        let algorithm = match normalized.as_str() {
            "SHA2-256" | "SHA-256" | "SHA256" | "2.16.840.1.101.3.4.2.1" => HashAlgorithm::Sha256,
            "SHA2-384" | "SHA-384" | "SHA384" | "2.16.840.1.101.3.4.2.2" => HashAlgorithm::Sha384,
            "SHA2-512" | "SHA-512" | "SHA512" | "2.16.840.1.101.3.4.2.3" => HashAlgorithm::Sha512,
            _ => return Err(Error::UnsupportedDigest(name.to_string())),
        };
        Ok(algorithm)
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "SHA2-256"),
            HashAlgorithm::Sha384 => write!(f, "SHA2-384"),
            HashAlgorithm::Sha512 => write!(f, "SHA2-512"),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_digest_name(s)
    }
}
