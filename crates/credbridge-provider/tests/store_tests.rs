//! Two-phase store enumeration

use credbridge_crypto::parse_certificate_info;
use credbridge_native::SoftwarePlatform;
use credbridge_provider::{KeyParams, Provider, StoreEntry, StoreLoader, StoreObject};
use credbridge_types::{KeySelection, KeyType};
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

/// Four certificates, two of them with a usable RSA key
fn provider() -> Provider {
    Provider::new(Arc::new(
        SoftwarePlatform::builder()
            .private_key_pem("endpoint", &fixture("endpoint.key.pem"))
            .unwrap()
            .private_key_pem("endpoint-3072", &fixture("endpoint-3072.key.pem"))
            .unwrap()
            .foreign_key("ecdsa", "ECDSA")
            .certificate("MY", certificate_der("endpoint.pem"), Some("endpoint"))
            .certificate("MY", certificate_der("root-ca.pem"), None)
            .certificate("MY", certificate_der("endpoint-alt.pem"), Some("ecdsa"))
            .certificate("MY", certificate_der("endpoint-3072.pem"), Some("endpoint-3072"))
            .store("Empty")
            .build(),
    ))
}

#[test]
fn test_certificates_then_keys() {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();

    let mut certificates = Vec::new();
    while store.load_next_certificate(|object| match object {
        StoreObject::Certificate(der) => {
            certificates.push(der.to_vec());
            true
        }
        StoreObject::PrivateKey { .. } => panic!("key delivered as certificate"),
    }) {}
    assert_eq!(certificates.len(), 4);
    assert_eq!(certificates[0], certificate_der("endpoint.pem"));
    assert!(!store.is_at_eof());

    let mut bits = Vec::new();
    while store.load_next_private_key(|object| match object {
        StoreObject::PrivateKey { data_type, key } => {
            assert_eq!(data_type, "rsaEncryption");
            assert_eq!(key.key_type(), KeyType::Private);
            bits.push(key.bits().unwrap());
            true
        }
        StoreObject::Certificate(_) => panic!("certificate delivered as key"),
    }) {}
    assert_eq!(bits, vec![2048, 3072]);
    assert!(store.is_at_eof());
    assert!(!store.load(|_| true));
}

#[test]
fn test_owned_entries_outlive_store() {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();

    let mut entries = Vec::new();
    while let Some(entry) = store.load_owned().unwrap() {
        entries.push(entry);
    }
    store.close().unwrap();
    drop(store);

    assert_eq!(entries.len(), 6);
    assert!(entries[..4]
        .iter()
        .all(|entry| matches!(entry, StoreEntry::Certificate(_))));

    let StoreEntry::PrivateKey(key) = &entries[4] else {
        panic!("expected a key after the certificates");
    };
    assert_eq!(
        key.params().unwrap(),
        KeyParams {
            bits: 2048,
            security_bits: 112,
            max_size: 16384,
        }
    );

    let StoreEntry::Certificate(der) = &entries[0] else {
        unreachable!()
    };
    let from_certificate = parse_certificate_info(der).unwrap().rsa_public_key.unwrap();
    let from_key = key.export_public(KeySelection::PUBLIC_KEY).unwrap();
    assert!(from_key.same_key(&from_certificate));
}

#[test]
fn test_empty_store() {
    let provider = provider();
    let mut store = provider.open_store("cng://Empty").unwrap();
    assert!(store.is_at_eof());
    assert!(!store.load_next_certificate(|_| true));
    assert!(!store.load_next_private_key(|_| true));
    assert!(store.load_owned().unwrap().is_none());
}

#[test]
fn test_closed_store_delivers_nothing() {
    let provider = provider();
    let mut store = provider.open_store("cng://MY").unwrap();
    store.close().unwrap();
    assert!(store.is_at_eof());
    assert!(!store.load(|_| true));
    store.close().unwrap();
}
