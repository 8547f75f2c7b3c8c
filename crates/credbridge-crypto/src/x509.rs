//! X.509 inspection for certificate selection
//!
//! Extracts the fields the certificate selector filters on: subject names,
//! validity, key usage, extended key usage, extension flags and the RSA
//! public key.

use crate::blob::RsaPublicComponents;
use crate::error::{Error, Result};
use const_oid::db::rfc5912::RSA_ENCRYPTION;
use const_oid::ObjectIdentifier;
use der::{Decode, Tag, Tagged};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use std::collections::HashSet;
use x509_cert::ext::pkix::{CertificatePolicies, ExtendedKeyUsage, KeyUsage};
use x509_cert::Certificate;

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// TLS Web Client Authentication
pub const CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");
/// TLS Web Server Authentication
pub const SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
/// anyExtendedKeyUsage
pub const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

/// Extensions a TLS stack understands; any other critical extension makes
/// the certificate unusable.
const HANDLED_EXTENSIONS: &[ObjectIdentifier] = &[
    ObjectIdentifier::new_unwrap("2.5.29.15"),          // key usage
    ObjectIdentifier::new_unwrap("2.5.29.17"),          // subject alt name
    ObjectIdentifier::new_unwrap("2.5.29.19"),          // basic constraints
    ObjectIdentifier::new_unwrap("2.5.29.30"),          // name constraints
    ObjectIdentifier::new_unwrap("2.5.29.32"),          // certificate policies
    ObjectIdentifier::new_unwrap("2.5.29.33"),          // policy mappings
    ObjectIdentifier::new_unwrap("2.5.29.36"),          // policy constraints
    ObjectIdentifier::new_unwrap("2.5.29.37"),          // extended key usage
    ObjectIdentifier::new_unwrap("2.5.29.54"),          // inhibit any policy
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.7"),  // IP address blocks
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.8"),  // AS identifiers
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.14"), // proxy certificate info
    ObjectIdentifier::new_unwrap("2.16.840.1.113730.1.1"), // netscape cert type
];

/// Information extracted from a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// First subject common name
    pub common_name: Option<String>,
    /// First subject organizational unit
    pub organizational_unit: Option<String>,
    /// Not valid before (Unix timestamp)
    pub not_before: i64,
    /// Not valid after (Unix timestamp)
    pub not_after: i64,
    /// Key usage extension, if present
    pub key_usage: Option<KeyUsage>,
    /// Extended key usage purposes, if the extension is present
    pub extended_key_usage: Option<Vec<ObjectIdentifier>>,
    /// A critical extension outside [`HANDLED_EXTENSIONS`] is present
    pub has_unhandled_critical_extension: bool,
    /// The certificate policies extension is malformed or repeats a policy
    pub has_invalid_policy: bool,
    /// RSA public key, `None` for other key algorithms
    pub rsa_public_key: Option<RsaPublicComponents>,
}

impl CertificateInfo {
    /// Validity window strictly contains `now` (Unix timestamp)
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.not_before < now && now < self.not_after
    }

    /// Validity window contains the current time
    pub fn is_currently_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().timestamp())
    }

    /// Key usage is absent or includes digitalSignature
    pub fn allows_digital_signature(&self) -> bool {
        self.key_usage
            .as_ref()
            .map_or(true, |ku| ku.digital_signature())
    }

    /// Key usage is absent or includes keyCertSign
    pub fn allows_certificate_signing(&self) -> bool {
        self.key_usage
            .as_ref()
            .map_or(true, |ku| ku.key_cert_sign())
    }

    /// Extended key usage is absent or includes TLS client authentication
    pub fn allows_client_auth(&self) -> bool {
        self.extended_key_usage
            .as_ref()
            .map_or(true, |purposes| purposes.contains(&CLIENT_AUTH))
    }

    /// Extended key usage is absent, unrestricted or includes TLS server authentication
    pub fn allows_server_auth(&self) -> bool {
        self.extended_key_usage.as_ref().map_or(true, |purposes| {
            purposes.contains(&SERVER_AUTH) || purposes.contains(&ANY_EXTENDED_KEY_USAGE)
        })
    }
}

/// Parse certificate information from DER-encoded certificate
pub fn parse_certificate_info(cert_der: &[u8]) -> Result<CertificateInfo> {
    let cert = Certificate::from_der(cert_der)
        .map_err(|e| Error::InvalidCertificate(format!("failed to parse certificate: {}", e)))?;
    let tbs = &cert.tbs_certificate;

    let not_before = tbs.validity.not_before.to_unix_duration().as_secs() as i64;
    let not_after = tbs.validity.not_after.to_unix_duration().as_secs() as i64;

    let key_usage = tbs
        .get::<KeyUsage>()
        .map_err(|e| Error::InvalidCertificate(format!("failed to get key usage: {}", e)))?
        .map(|(_critical, ku)| ku);

    let extended_key_usage = tbs
        .get::<ExtendedKeyUsage>()
        .map_err(|e| {
            Error::InvalidCertificate(format!("failed to get extended key usage: {}", e))
        })?
        .map(|(_critical, eku)| eku.0);

    let has_unhandled_critical_extension = tbs.extensions.as_ref().map_or(false, |exts| {
        exts.iter()
            .any(|ext| ext.critical && !HANDLED_EXTENSIONS.contains(&ext.extn_id))
    });

    let has_invalid_policy = match tbs.get::<CertificatePolicies>() {
        Ok(Some((_critical, policies))) => {
            let mut seen = HashSet::new();
            !policies
                .0
                .iter()
                .all(|policy| seen.insert(policy.policy_identifier))
        }
        Ok(None) => false,
        Err(e) => {
            tracing::debug!("Certificate policies could not be decoded: {}", e);
            true
        }
    };

    Ok(CertificateInfo {
        common_name: subject_attribute(&cert, COMMON_NAME),
        organizational_unit: subject_attribute(&cert, ORGANIZATIONAL_UNIT),
        not_before,
        not_after,
        key_usage,
        extended_key_usage,
        has_unhandled_critical_extension,
        has_invalid_policy,
        rsa_public_key: rsa_public_key(&cert)?,
    })
}

/// First subject attribute with the given type, decoded as a directory string
fn subject_attribute(cert: &Certificate, oid: ObjectIdentifier) -> Option<String> {
    cert.tbs_certificate
        .subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|attribute| attribute.oid == oid)
        .and_then(|attribute| decode_directory_string(attribute.value.tag(), attribute.value.value()))
}

fn decode_directory_string(tag: Tag, bytes: &[u8]) -> Option<String> {
    match tag {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
        Tag::BmpString => {
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        other => {
            tracing::debug!("Skipping subject attribute with tag {}", other);
            None
        }
    }
}

fn rsa_public_key(cert: &Certificate) -> Result<Option<RsaPublicComponents>> {
    let spki = &cert.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != RSA_ENCRYPTION {
        return Ok(None);
    }
    let key = rsa::RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes())
        .map_err(|e| Error::InvalidCertificate(format!("failed to decode RSA key: {}", e)))?;
    Ok(Some(RsaPublicComponents::new(
        key.e().to_bytes_be(),
        key.n().to_bytes_be(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_strings() {
        assert_eq!(
            decode_directory_string(Tag::PrintableString, b"Fleet").as_deref(),
            Some("Fleet")
        );
        assert_eq!(
            decode_directory_string(Tag::BmpString, &[0x00, 0x46, 0x00, 0x6c]).as_deref(),
            Some("Fl")
        );
        assert_eq!(decode_directory_string(Tag::BmpString, &[0x00]), None);
        assert_eq!(decode_directory_string(Tag::OctetString, b"x"), None);
    }

    #[test]
    fn test_validity_window_is_strict() {
        let info = CertificateInfo {
            common_name: None,
            organizational_unit: None,
            not_before: 100,
            not_after: 200,
            key_usage: None,
            extended_key_usage: None,
            has_unhandled_critical_extension: false,
            has_invalid_policy: false,
            rsa_public_key: None,
        };
        assert!(info.is_valid_at(150));
        assert!(!info.is_valid_at(100));
        assert!(!info.is_valid_at(200));
        // no usage extensions: every purpose allowed
        assert!(info.allows_client_auth());
        assert!(info.allows_server_auth());
        assert!(info.allows_digital_signature());
        assert!(info.allows_certificate_signing());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            parse_certificate_info(b"not a certificate"),
            Err(Error::InvalidCertificate(_))
        ));
    }
}
