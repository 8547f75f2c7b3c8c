//! Trust bundles collected from software stores

use credbridge::native::SoftwarePlatform;
use credbridge::types::CertificateFields;
use credbridge::{build_trust_bundle, Error, ProviderConfig, TrustPurpose};
use rstest::rstest;
use std::path::PathBuf;

fn certificate_der(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-data")
        .join(name);
    let pem = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e));
    pem::parse(pem).unwrap().into_contents()
}

/// Root holds a usable root, an expired CA, a client-auth-only CA and a
/// leaf; CA holds intermediates and the root again
fn platform() -> SoftwarePlatform {
    SoftwarePlatform::builder()
        .certificate("Root", certificate_der("root-ca.pem"), None)
        .certificate("Root", certificate_der("expired-ca.pem"), None)
        .certificate("Root", certificate_der("client-auth-ca.pem"), None)
        .certificate("Root", certificate_der("endpoint.pem"), None)
        .certificate("CA", certificate_der("issuing-ca.pem"), None)
        .certificate("CA", certificate_der("partner-ca.pem"), None)
        .certificate("CA", certificate_der("root-ca.pem"), None)
        .certificate("CA", certificate_der("endpoint-3072.pem"), None)
        .store("Empty")
        .build()
}

fn names(stores: &[&str]) -> Vec<String> {
    stores.iter().map(|s| s.to_string()).collect()
}

#[rstest]
#[case(CertificateFields::new(), &["root-ca.pem", "issuing-ca.pem", "partner-ca.pem", "endpoint-3072.pem"])]
#[case(
    CertificateFields::new().with_organizational_unit("Trust Services"),
    &["root-ca.pem", "issuing-ca.pem"]
)]
#[case(CertificateFields::new().with_organizational_unit("Partners"), &["partner-ca.pem"])]
#[case(CertificateFields::new().with_organizational_unit("partners"), &[])]
fn test_trust_bundle_contents(#[case] fields: CertificateFields, #[case] expected: &[&str]) {
    let config = ProviderConfig::default();
    let bundle = build_trust_bundle(&platform(), &config.trust_stores, &fields).unwrap();

    let expected: Vec<Vec<u8>> = expected.iter().map(|name| certificate_der(name)).collect();
    let found: Vec<Vec<u8>> = bundle.certificates().iter().map(|c| c.to_vec()).collect();
    assert_eq!(found, expected);
    assert_eq!(bundle.len(), expected.len());
    assert_eq!(bundle.purpose(), TrustPurpose::TlsServer);
}

#[test]
fn test_common_name_is_not_checked() {
    let fields = CertificateFields::new().with_common_name("no such name");
    let bundle = build_trust_bundle(&platform(), &names(&["Root"]), &fields).unwrap();
    assert_eq!(bundle.into_certificates().len(), 1);
}

#[test]
fn test_empty_store_list_and_empty_store() {
    let fields = CertificateFields::new();
    assert!(build_trust_bundle(&platform(), &[], &fields).unwrap().is_empty());
    assert!(build_trust_bundle(&platform(), &names(&["Empty"]), &fields)
        .unwrap()
        .is_empty());
}

#[test]
fn test_missing_store_fails_bundle() {
    let result = build_trust_bundle(
        &platform(),
        &names(&["Root", "Missing"]),
        &CertificateFields::new(),
    );
    assert!(matches!(result, Err(Error::Native(_))));
}
