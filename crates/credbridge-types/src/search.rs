//! Parameters used to pick a client certificate out of a native store

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// SHA-1 thumbprint of a DER-encoded certificate
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertificateHash([u8; 20]);

impl CertificateHash {
    /// Thumbprint size in bytes
    pub const LEN: usize = 20;

    /// Wrap raw thumbprint bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, checking its length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 20] = bytes.try_into().map_err(|_| {
            Error::InvalidCertificateHash(format!("expected 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Parse a hex thumbprint; colons and whitespace are ignored
    pub fn from_hex(s: &str) -> Result<Self> {
        let cleaned: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let bytes = hex::decode(&cleaned)
            .map_err(|e| Error::InvalidCertificateHash(format!("invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Debug for CertificateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CertificateHash({})", self.to_hex())
    }
}

impl std::fmt::Display for CertificateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for CertificateHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CertificateHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Subject fields a client or CA certificate must carry.
///
/// Empty fields are not checked. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateFields {
    /// Subject common name (CN)
    pub common_name: String,
    /// Subject organizational unit (OU)
    pub organizational_unit: String,
}

impl CertificateFields {
    /// Create empty fields that match any subject
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a common name
    pub fn with_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = common_name.into();
        self
    }

    /// Require an organizational unit
    pub fn with_organizational_unit(mut self, organizational_unit: impl Into<String>) -> Self {
        self.organizational_unit = organizational_unit.into();
        self
    }
}

/// How a client certificate is located in the native store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSearchParameters {
    /// Exact SHA-1 thumbprint
    Hash(CertificateHash),
    /// Subject, validity and usage predicates
    Fields(CertificateFields),
}

impl From<CertificateHash> for CertificateSearchParameters {
    fn from(hash: CertificateHash) -> Self {
        CertificateSearchParameters::Hash(hash)
    }
}

impl From<CertificateFields> for CertificateSearchParameters {
    fn from(fields: CertificateFields) -> Self {
        CertificateSearchParameters::Fields(fields)
    }
}
