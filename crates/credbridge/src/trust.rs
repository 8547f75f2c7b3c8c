//! Trust anchors collected from native stores

use crate::error::Result;
use crate::selector::field_matches;
use credbridge_crypto::{parse_certificate_info, CertificateInfo};
use credbridge_native::Platform;
use credbridge_types::CertificateFields;
use rustls_pki_types::CertificateDer;

/// What certificates verified against a bundle are trusted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPurpose {
    /// Verifying a TLS server certificate
    TlsServer,
}

/// Certificate authorities usable to verify a TLS server
#[derive(Debug, Clone)]
pub struct TrustBundle {
    certificates: Vec<CertificateDer<'static>>,
    purpose: TrustPurpose,
}

impl TrustBundle {
    /// Anchors in the order they were found
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    /// Purpose the bundle verifies for
    pub fn purpose(&self) -> TrustPurpose {
        self.purpose
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Take the anchors out of the bundle
    pub fn into_certificates(self) -> Vec<CertificateDer<'static>> {
        self.certificates
    }
}

/// Collect every usable certificate authority from `store_names`.
///
/// A certificate is kept when it is currently valid, may sign certificates,
/// may be used for TLS server authentication and, if `fields` names an
/// organizational unit, carries exactly that unit. Failing to open any
/// store fails the whole bundle.
pub fn build_trust_bundle(
    platform: &dyn Platform,
    store_names: &[String],
    fields: &CertificateFields,
) -> Result<TrustBundle> {
    let mut certificates: Vec<CertificateDer<'static>> = Vec::new();

    for name in store_names {
        let store = platform.open_certificate_store(name)?;
        let mut added = 0usize;
        {
            let mut cursor = store.cursor()?;
            while cursor.advance() {
                let Some(der) = cursor.encoded() else {
                    continue;
                };
                let info = match parse_certificate_info(der) {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::debug!("Skipping unparseable certificate in {}: {}", name, e);
                        continue;
                    }
                };
                if !is_trust_anchor(&info, fields) {
                    continue;
                }
                if certificates.iter().any(|known| known.as_ref() == der) {
                    continue;
                }
                certificates.push(CertificateDer::from(der.to_vec()));
                added += 1;
            }
        }
        store.close()?;
        tracing::debug!("Added {} trust anchors from {}", added, name);
    }

    Ok(TrustBundle {
        certificates,
        purpose: TrustPurpose::TlsServer,
    })
}

/// Validity, usage and unit checks for a trust anchor
pub fn is_trust_anchor(info: &CertificateInfo, fields: &CertificateFields) -> bool {
    info.is_currently_valid()
        && info.allows_certificate_signing()
        && info.allows_server_auth()
        && field_matches(&fields.organizational_unit, info.organizational_unit.as_deref())
}
