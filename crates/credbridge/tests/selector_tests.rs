//! Client certificate selection over software stores

use credbridge::crypto::certificate_thumbprint;
use credbridge::native::SoftwarePlatform;
use credbridge::provider::{Provider, StoreLoader};
use credbridge::types::{CertificateFields, CertificateHash, CertificateSearchParameters};
use credbridge::{
    find_client_certificate, find_client_certificate_by_fields, find_client_certificate_by_hash,
    Error, ProviderConfig,
};
use rstest::rstest;
use std::path::PathBuf;
use std::sync::Arc;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-data")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
}

fn certificate_der(name: &str) -> Vec<u8> {
    pem::parse(fixture(name)).unwrap().into_contents()
}

fn thumbprint(name: &str) -> CertificateHash {
    certificate_thumbprint(&certificate_der(name))
}

/// Client certificates that share the endpoint-01 subject but fail one
/// check each, followed by the usable ones
fn provider() -> Provider {
    Provider::new(Arc::new(
        SoftwarePlatform::builder()
            .private_key_pem("endpoint", &fixture("endpoint.key.pem"))
            .unwrap()
            .private_key_pem("endpoint-alt", &fixture("endpoint-alt.key.pem"))
            .unwrap()
            .private_key_pem("endpoint-3072", &fixture("endpoint-3072.key.pem"))
            .unwrap()
            .certificate("MY", certificate_der("endpoint-expired.pem"), Some("endpoint"))
            .certificate("MY", certificate_der("endpoint-server-only.pem"), Some("endpoint-alt"))
            .certificate("MY", certificate_der("endpoint-no-signature.pem"), Some("endpoint-alt"))
            .certificate("MY", certificate_der("endpoint-critical.pem"), Some("endpoint-alt"))
            .certificate("MY", certificate_der("root-ca.pem"), None)
            .certificate("MY", certificate_der("endpoint.pem"), Some("endpoint"))
            .certificate("MY", certificate_der("endpoint-alt.pem"), Some("endpoint-alt"))
            .certificate("MY", certificate_der("endpoint-3072.pem"), Some("endpoint-3072"))
            .certificate("Personal", certificate_der("endpoint-3072.pem"), Some("endpoint-3072"))
            .certificate("CertsOnly", certificate_der("endpoint.pem"), None)
            .build(),
    ))
}

#[rstest]
#[case(CertificateFields::new().with_common_name("endpoint-01"), "endpoint.pem", 2048)]
#[case(
    CertificateFields::new()
        .with_common_name("endpoint-01")
        .with_organizational_unit("Fleet Devices"),
    "endpoint.pem",
    2048
)]
#[case(CertificateFields::new().with_organizational_unit("Fleet Servers"), "endpoint-alt.pem", 2048)]
#[case(CertificateFields::new().with_common_name("endpoint-03"), "endpoint-3072.pem", 3072)]
#[case(CertificateFields::new(), "endpoint.pem", 2048)]
fn test_find_by_fields(
    #[case] fields: CertificateFields,
    #[case] expected: &str,
    #[case] bits: u32,
) {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();

    let credential = find_client_certificate_by_fields(&mut store, &fields)
        .unwrap()
        .expect("a matching credential");
    assert_eq!(credential.certificate.as_ref(), &certificate_der(expected)[..]);
    assert_eq!(credential.key.bits().unwrap(), bits);
}

#[rstest]
#[case(CertificateFields::new().with_common_name("ENDPOINT-01"))]
#[case(CertificateFields::new().with_common_name("endpoint-01 "))]
#[case(CertificateFields::new().with_organizational_unit("fleet devices"))]
#[case(
    CertificateFields::new()
        .with_common_name("endpoint-02")
        .with_organizational_unit("Fleet Devices")
)]
#[case(CertificateFields::new().with_common_name("Credbridge Root CA"))]
fn test_find_by_fields_without_match(#[case] fields: CertificateFields) {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();
    assert!(find_client_certificate_by_fields(&mut store, &fields)
        .unwrap()
        .is_none());
}

#[rstest]
#[case("endpoint-3072.pem", 3072)]
#[case("endpoint-alt.pem", 2048)]
// Expired certificates are still found by thumbprint
#[case("endpoint-expired.pem", 2048)]
fn test_find_by_hash(#[case] name: &str, #[case] bits: u32) {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();

    let credential = find_client_certificate_by_hash(&mut store, &thumbprint(name))
        .unwrap()
        .expect("a matching credential");
    assert_eq!(credential.certificate.as_ref(), &certificate_der(name)[..]);
    assert_eq!(credential.key.bits().unwrap(), bits);
}

#[test]
fn test_matching_certificate_without_key() {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();
    assert!(find_client_certificate_by_hash(&mut store, &thumbprint("root-ca.pem"))
        .unwrap()
        .is_none());
}

#[test]
fn test_unknown_hash() {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();
    assert!(find_client_certificate_by_hash(&mut store, &CertificateHash::from_bytes([0; 20]))
        .unwrap()
        .is_none());
}

#[test]
fn test_store_without_keys() {
    let provider = provider();
    let mut store = provider.open_store("cng://CertsOnly").unwrap();
    assert!(find_client_certificate_by_hash(&mut store, &thumbprint("endpoint.pem"))
        .unwrap()
        .is_none());
}

#[test]
fn test_find_client_certificate_uses_configured_store() {
    let provider = provider();
    let config = ProviderConfig::default().with_client_store("Personal");

    let search = CertificateSearchParameters::from(thumbprint("endpoint-3072.pem"));
    let credential = find_client_certificate(&provider, &config, &search).unwrap();
    assert_eq!(credential.key.bits().unwrap(), 3072);

    let search = CertificateSearchParameters::from(thumbprint("endpoint.pem"));
    assert!(matches!(
        find_client_certificate(&provider, &config, &search),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_find_client_certificate_by_fields_in_default_store() {
    let provider = provider();
    let search = CertificateSearchParameters::from(
        CertificateFields::new().with_organizational_unit("Fleet Servers"),
    );
    let credential = find_client_certificate(&provider, &ProviderConfig::default(), &search).unwrap();
    assert_eq!(credential.certificate.as_ref(), &certificate_der("endpoint-alt.pem")[..]);
}

#[test]
fn test_find_client_certificate_in_missing_store() {
    let provider = provider();
    let config = ProviderConfig::default().with_client_store("Missing");
    let search = CertificateSearchParameters::from(CertificateFields::new());
    assert!(matches!(
        find_client_certificate(&provider, &config, &search),
        Err(Error::Provider(_))
    ));
}

#[test]
fn test_credential_key_outlives_store() {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();
    let credential = find_client_certificate_by_hash(&mut store, &thumbprint("endpoint.pem"))
        .unwrap()
        .unwrap();
    store.close().unwrap();
    drop(store);
    assert_eq!(credential.key.security_bits().unwrap(), 112);
}
