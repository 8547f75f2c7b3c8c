//! RSA signature verification using aws-lc-rs
//!
//! Serves as the independent reference for signatures produced through a
//! native key store.

use crate::blob::RsaPublicComponents;
use crate::error::{Error, Result};
use aws_lc_rs::signature::{
    UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384,
    RSA_PKCS1_2048_8192_SHA512, RSA_PSS_2048_8192_SHA256, RSA_PSS_2048_8192_SHA384,
    RSA_PSS_2048_8192_SHA512,
};
use credbridge_types::{HashAlgorithm, Padding};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::BigUint;

/// RSA signature schemes the reference verifier understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaSignatureScheme {
    /// PKCS#1 v1.5 with SHA-256
    Pkcs1Sha256,
    /// PKCS#1 v1.5 with SHA-384
    Pkcs1Sha384,
    /// PKCS#1 v1.5 with SHA-512
    Pkcs1Sha512,
    /// PSS with SHA-256, salt length equal to the digest length
    PssSha256,
    /// PSS with SHA-384, salt length equal to the digest length
    PssSha384,
    /// PSS with SHA-512, salt length equal to the digest length
    PssSha512,
}

impl RsaSignatureScheme {
    /// Scheme for a padding and digest pair
    pub fn for_padding(padding: Padding, digest: HashAlgorithm) -> Result<Self> {
        let scheme = match (padding, digest) {
            (Padding::Pkcs1, HashAlgorithm::Sha256) => Self::Pkcs1Sha256,
            (Padding::Pkcs1, HashAlgorithm::Sha384) => Self::Pkcs1Sha384,
            (Padding::Pkcs1, HashAlgorithm::Sha512) => Self::Pkcs1Sha512,
            (Padding::Pss, HashAlgorithm::Sha256) => Self::PssSha256,
            (Padding::Pss, HashAlgorithm::Sha384) => Self::PssSha384,
            (Padding::Pss, HashAlgorithm::Sha512) => Self::PssSha512,
            (Padding::None, _) => {
                return Err(Error::UnsupportedAlgorithm(
                    "unpadded RSA signatures".to_string(),
                ))
            }
        };
        Ok(scheme)
    }

    fn parameters(&self) -> &'static aws_lc_rs::signature::RsaParameters {
        match self {
            Self::Pkcs1Sha256 => &RSA_PKCS1_2048_8192_SHA256,
            Self::Pkcs1Sha384 => &RSA_PKCS1_2048_8192_SHA384,
            Self::Pkcs1Sha512 => &RSA_PKCS1_2048_8192_SHA512,
            Self::PssSha256 => &RSA_PSS_2048_8192_SHA256,
            Self::PssSha384 => &RSA_PSS_2048_8192_SHA384,
            Self::PssSha512 => &RSA_PSS_2048_8192_SHA512,
        }
    }
}

/// Encode public components as a DER `RSAPublicKey`
pub fn rsa_public_key_der(components: &RsaPublicComponents) -> Result<Vec<u8>> {
    let key = rsa::RsaPublicKey::new(
        BigUint::from_bytes_be(&components.modulus),
        BigUint::from_bytes_be(&components.public_exponent),
    )?;
    let der = key
        .to_pkcs1_der()
        .map_err(|e| Error::InvalidKey(format!("failed to encode RSA key: {}", e)))?;
    Ok(der.as_bytes().to_vec())
}

/// Verify an RSA signature over `message` (not a digest)
pub fn verify_rsa_signature(
    public_key: &RsaPublicComponents,
    message: &[u8],
    signature: &[u8],
    scheme: RsaSignatureScheme,
) -> Result<()> {
    let der = rsa_public_key_der(public_key)?;
    UnparsedPublicKey::new(scheme.parameters(), &der)
        .verify(message, signature)
        .map_err(|_| Error::Verification(format!("{:?} signature invalid", scheme)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_selection() {
        assert_eq!(
            RsaSignatureScheme::for_padding(Padding::Pkcs1, HashAlgorithm::Sha256).unwrap(),
            RsaSignatureScheme::Pkcs1Sha256
        );
        assert_eq!(
            RsaSignatureScheme::for_padding(Padding::Pss, HashAlgorithm::Sha512).unwrap(),
            RsaSignatureScheme::PssSha512
        );
        assert!(RsaSignatureScheme::for_padding(Padding::None, HashAlgorithm::Sha256).is_err());
    }

    #[test]
    fn test_rejects_invalid_components() {
        let components = RsaPublicComponents::new(vec![], vec![]);
        assert!(verify_rsa_signature(
            &components,
            b"message",
            &[0u8; 256],
            RsaSignatureScheme::Pkcs1Sha256
        )
        .is_err());
    }
}
