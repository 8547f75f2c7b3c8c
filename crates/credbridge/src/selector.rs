//! Client certificate selection
//!
//! Both searches walk a [`Store`] in its natural order: every certificate
//! first, then every private key. The first certificate that satisfies the
//! search is chosen, and the first key afterwards whose public half matches
//! that certificate completes the credential.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use credbridge_crypto::{certificate_thumbprint, parse_certificate_info, CertificateInfo};
use credbridge_provider::{Provider, ProviderKey, Store, StoreEntry, StoreLoader};
use credbridge_types::{
    CertificateFields, CertificateHash, CertificateSearchParameters, KeySelection, StoreUri,
};
use rustls_pki_types::CertificateDer;

/// A certificate and the native key it was issued for
#[derive(Debug)]
pub struct ClientCredential {
    /// DER encoded client certificate
    pub certificate: CertificateDer<'static>,
    /// Handle to the matching private key
    pub key: ProviderKey,
}

/// Find the certificate whose SHA-1 thumbprint is `hash`, with its key
pub fn find_client_certificate_by_hash(
    store: &mut Store,
    hash: &CertificateHash,
) -> Result<Option<ClientCredential>> {
    select(store, |der| certificate_thumbprint(der) == *hash)
}

/// Find the first currently valid client authentication certificate whose
/// subject matches `fields`, with its key
pub fn find_client_certificate_by_fields(
    store: &mut Store,
    fields: &CertificateFields,
) -> Result<Option<ClientCredential>> {
    select(store, |der| match parse_certificate_info(der) {
        Ok(info) => is_client_certificate(&info, fields),
        Err(e) => {
            tracing::debug!("Skipping unparseable certificate: {}", e);
            false
        }
    })
}

/// Open the configured client store and run `search` over it.
///
/// Fails with [`Error::NotFound`] when no credential matches.
pub fn find_client_certificate(
    provider: &Provider,
    config: &ProviderConfig,
    search: &CertificateSearchParameters,
) -> Result<ClientCredential> {
    let uri = StoreUri::for_store(config.client_store.as_str());
    let mut store = provider.open_store(&uri.to_string())?;

    let found = match search {
        CertificateSearchParameters::Hash(hash) => find_client_certificate_by_hash(&mut store, hash),
        CertificateSearchParameters::Fields(fields) => {
            find_client_certificate_by_fields(&mut store, fields)
        }
    };
    let closed = store.close();
    let found = found?;
    closed?;

    found.ok_or_else(|| Error::NotFound(format!("client certificate in store {}", uri)))
}

/// Usage and subject checks for a client certificate
pub fn is_client_certificate(info: &CertificateInfo, fields: &CertificateFields) -> bool {
    info.is_currently_valid()
        && !info.has_invalid_policy
        && !info.has_unhandled_critical_extension
        && info.allows_digital_signature()
        && info.allows_client_auth()
        && field_matches(&fields.common_name, info.common_name.as_deref())
        && field_matches(&fields.organizational_unit, info.organizational_unit.as_deref())
}

/// Empty `wanted` matches anything; otherwise exact comparison
pub(crate) fn field_matches(wanted: &str, actual: Option<&str>) -> bool {
    wanted.is_empty() || actual == Some(wanted)
}

fn select(
    store: &mut Store,
    mut accept: impl FnMut(&[u8]) -> bool,
) -> Result<Option<ClientCredential>> {
    let mut selected: Option<CertificateDer<'static>> = None;

    while let Some(entry) = store.load_owned()? {
        match entry {
            StoreEntry::Certificate(der) => {
                if selected.is_none() && accept(&der) {
                    tracing::debug!("Selected client certificate {}", certificate_thumbprint(&der));
                    selected = Some(CertificateDer::from(der));
                }
            }
            StoreEntry::PrivateKey(key) => {
                let Some(certificate) = selected.as_ref() else {
                    tracing::debug!("Private keys reached without a matching certificate");
                    return Ok(None);
                };
                if key_matches(&key, certificate) {
                    return Ok(selected.map(|certificate| ClientCredential { certificate, key }));
                }
            }
        }
    }

    Ok(None)
}

fn key_matches(key: &ProviderKey, certificate: &CertificateDer<'_>) -> bool {
    let from_key = match key.export_public(KeySelection::PUBLIC_KEY) {
        Ok(components) => components,
        Err(e) => {
            tracing::debug!("Skipping key without exportable public half: {}", e);
            return false;
        }
    };
    match parse_certificate_info(certificate) {
        Ok(CertificateInfo {
            rsa_public_key: Some(from_certificate),
            ..
        }) => from_key.same_key(&from_certificate),
        Ok(_) => false,
        Err(e) => {
            tracing::debug!("Selected certificate no longer parses: {}", e);
            false
        }
    }
}
