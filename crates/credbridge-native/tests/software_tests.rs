//! Software platform behavior against the shared certificate fixtures

use credbridge_crypto::{parse_certificate_info, RsaPublicComponents};
use credbridge_native::{
    usage, CertificateCursor, CertificateStore, Error, NativeKey, Platform, SignaturePadding,
    SoftwarePlatform,
};
use credbridge_types::HashAlgorithm;
use rstest::rstest;
use std::path::PathBuf;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-data")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
}

fn certificate_der(name: &str) -> Vec<u8> {
    pem::parse(fixture(name)).unwrap().into_contents()
}

fn platform() -> SoftwarePlatform {
    SoftwarePlatform::builder()
        .private_key_pem("endpoint", &fixture("endpoint.key.pem"))
        .unwrap()
        .private_key_pem("endpoint-3072", &fixture("endpoint-3072.key.pem"))
        .unwrap()
        .certificate("MY", certificate_der("endpoint.pem"), Some("endpoint"))
        .certificate("MY", certificate_der("endpoint-3072.pem"), Some("endpoint-3072"))
        .certificate("MY", certificate_der("root-ca.pem"), None)
        .build()
}

fn first_key(platform: &SoftwarePlatform) -> (Vec<u8>, Box<dyn NativeKey>) {
    let store = platform.open_certificate_store("MY").unwrap();
    let mut cursor = store.cursor().unwrap();
    assert!(cursor.advance());
    let der = cursor.encoded().unwrap().to_vec();
    let key = cursor.acquire_private_key().unwrap().unwrap();
    (der, key)
}

#[test]
fn test_exported_blob_matches_certificate_key() {
    let platform = platform();
    let (der, key) = first_key(&platform);

    let info = parse_certificate_info(&der).unwrap();
    let from_certificate = info.rsa_public_key.unwrap();
    let from_store = RsaPublicComponents::from_public_blob(&key.export_public_blob().unwrap())
        .unwrap();
    assert!(from_store.same_key(&from_certificate));
    assert_eq!(from_store.modulus_bits(), 2048);
}

#[test]
fn test_key_sizes_follow_store_order() {
    let platform = platform();
    let store = platform.open_certificate_store("MY").unwrap();
    let mut cursor = store.cursor().unwrap();

    let mut sizes = Vec::new();
    while cursor.advance() {
        if let Some(key) = cursor.acquire_private_key().unwrap() {
            sizes.push(key.length_bits().unwrap());
            assert_eq!(key.usage_flags().unwrap() & usage::ALLOW_SIGNING, usage::ALLOW_SIGNING);
        }
    }
    assert_eq!(sizes, vec![2048, 3072]);
}

#[rstest]
#[case(HashAlgorithm::Sha256)]
#[case(HashAlgorithm::Sha384)]
#[case(HashAlgorithm::Sha512)]
fn test_pkcs1_signature_verifies_after_reopen(#[case] digest: HashAlgorithm) {
    let platform = platform();
    let (_, key) = first_key(&platform);
    let reopened = key.reopen().unwrap();

    let hash = credbridge_crypto::digest(digest, b"credential check");
    let padding = SignaturePadding::Pkcs1 { digest };
    let mut signature = vec![0u8; 256];
    let written = key
        .sign_hash(Some(padding), &hash, Some(&mut signature))
        .unwrap();
    signature.truncate(written);

    reopened
        .verify_signature(padding, &hash, &signature)
        .unwrap();
}

#[test]
fn test_signing_disallowed_by_usage() {
    let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let platform = SoftwarePlatform::builder()
        .private_key_with_usage("decrypt-only", key, usage::ALLOW_DECRYPT)
        .certificate("MY", vec![0x30, 0x00], Some("decrypt-only"))
        .build();
    let store = platform.open_certificate_store("MY").unwrap();
    let mut cursor = store.cursor().unwrap();
    cursor.advance();
    let key = cursor.acquire_private_key().unwrap().unwrap();

    let hash = credbridge_crypto::digest(HashAlgorithm::Sha256, b"x");
    let mut signature = vec![0u8; 128];
    let result = key.sign_hash(
        Some(SignaturePadding::Pkcs1 {
            digest: HashAlgorithm::Sha256,
        }),
        &hash,
        Some(&mut signature),
    );
    assert!(matches!(result, Err(Error::Unsupported(_))));
}
