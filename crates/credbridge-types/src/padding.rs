//! Signature padding and PSS salt length negotiation

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Host enum value for PKCS#1 v1.5 padding
pub const PKCS1_PADDING_MODE: i64 = 1;
/// Host enum value for PSS padding
pub const PSS_PADDING_MODE: i64 = 6;

/// Padding used when producing or checking an RSA signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// PKCS#1 v1.5
    #[default]
    Pkcs1,
    /// RSASSA-PSS
    Pss,
    /// No padding; refused at finalization
    None,
}

impl Padding {
    /// Decode the host's integer padding enum
    pub fn from_mode(mode: i64) -> Result<Self> {
        match mode {
            PKCS1_PADDING_MODE => Ok(Padding::Pkcs1),
            PSS_PADDING_MODE => Ok(Padding::Pss),
            other => Err(Error::UnsupportedPadding(other.to_string())),
        }
    }

    /// Decode the host's string padding token
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "pkcs1" => Ok(Padding::Pkcs1),
            "pss" => Ok(Padding::Pss),
            other => Err(Error::UnsupportedPadding(other.to_string())),
        }
    }
}

/// Requested PSS salt length before it is resolved against a digest and key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaltLength {
    /// Explicit number of bytes
    Bytes(u32),
    /// Same as the digest output length
    Digest,
    /// Largest salt the key modulus allows
    Max,
}

impl SaltLength {
    /// Decode an integer salt length, including the host's negative sentinels
    pub fn from_value(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(SaltLength::Digest),
            -2 | -3 => Ok(SaltLength::Max),
            v if v >= 0 => u32::try_from(v)
                .map(SaltLength::Bytes)
                .map_err(|_| Error::InvalidSaltLength(v.to_string())),
            v => Err(Error::InvalidSaltLength(v.to_string())),
        }
    }

    /// Decode a string salt length token
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "digest" => Ok(SaltLength::Digest),
            "max" | "auto" => Ok(SaltLength::Max),
            other => Err(Error::InvalidSaltLength(other.to_string())),
        }
    }

    /// Resolve to a byte count.
    ///
    /// The maximum follows RFC 8017 section 9.1.1: `emLen - hLen - 2` with
    /// `emLen = ceil((modBits - 1) / 8)`. `modulus_bits` is only consulted
    /// for [`SaltLength::Max`].
    pub fn resolve(&self, digest_size: usize, modulus_bits: Option<u32>) -> Result<u32> {
        match self {
            SaltLength::Bytes(n) => Ok(*n),
            SaltLength::Digest => u32::try_from(digest_size)
                .map_err(|_| Error::InvalidSaltLength(digest_size.to_string())),
            SaltLength::Max => {
                let bits = modulus_bits.ok_or_else(|| {
                    Error::InvalidSaltLength("maximum salt needs a bound key".to_string())
                })?;
                let encoded_len = (u64::from(bits.saturating_sub(1)) + 7) / 8;
                encoded_len
                    .checked_sub(digest_size as u64 + 2)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        Error::InvalidSaltLength(format!(
                            "{bits}-bit modulus is too small for a {digest_size}-byte digest"
                        ))
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_decoding() {
        assert_eq!(Padding::default(), Padding::Pkcs1);
        assert_eq!(Padding::from_mode(1).unwrap(), Padding::Pkcs1);
        assert_eq!(Padding::from_mode(6).unwrap(), Padding::Pss);
        assert!(Padding::from_mode(3).is_err());
        assert_eq!(Padding::from_token("pss").unwrap(), Padding::Pss);
        assert_eq!(Padding::from_token("pkcs1").unwrap(), Padding::Pkcs1);
        assert!(Padding::from_token("x931").is_err());
    }

    #[test]
    fn test_salt_sentinels() {
        assert_eq!(SaltLength::from_value(-1).unwrap(), SaltLength::Digest);
        assert_eq!(SaltLength::from_value(-3).unwrap(), SaltLength::Max);
        assert_eq!(SaltLength::from_value(20).unwrap(), SaltLength::Bytes(20));
        assert!(SaltLength::from_value(-4).is_err());
        assert_eq!(SaltLength::from_token("digest").unwrap(), SaltLength::Digest);
        assert!(SaltLength::from_token("none").is_err());
    }

    #[test]
    fn test_salt_resolution() {
        assert_eq!(SaltLength::Digest.resolve(32, None).unwrap(), 32);
        assert_eq!(SaltLength::Bytes(7).resolve(32, None).unwrap(), 7);
        // 2048-bit modulus: emLen = 256
        assert_eq!(SaltLength::Max.resolve(32, Some(2048)).unwrap(), 222);
        assert_eq!(SaltLength::Max.resolve(64, Some(2048)).unwrap(), 190);
        // 2049-bit modulus still encodes into 256 bytes
        assert_eq!(SaltLength::Max.resolve(32, Some(2049)).unwrap(), 222);
        assert!(SaltLength::Max.resolve(32, None).is_err());
        assert!(SaltLength::Max.resolve(64, Some(512)).is_err());
    }
}
