//! Reference verification of signatures produced with the fixture keys

use credbridge_crypto::{
    parse_certificate_info, verify_rsa_signature, RsaPublicComponents, RsaSignatureScheme,
};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use rstest::rstest;
use sha2::{Digest, Sha256};

const KEY_PEM: &str = include_str!("../../../test-data/endpoint.key.pem");
const CERT_PEM: &str = include_str!("../../../test-data/endpoint.pem");

fn certificate_key() -> RsaPublicComponents {
    let der = pem::parse(CERT_PEM).unwrap().into_contents();
    parse_certificate_info(&der).unwrap().rsa_public_key.unwrap()
}

fn sign_pkcs1_sha256(message: &[u8]) -> Vec<u8> {
    let key = RsaPrivateKey::from_pkcs8_pem(KEY_PEM).unwrap();
    let digest = Sha256::digest(message);
    key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap()
}

#[test]
fn test_verify_pkcs1_sha256() {
    let signature = sign_pkcs1_sha256(b"credbridge");
    verify_rsa_signature(
        &certificate_key(),
        b"credbridge",
        &signature,
        RsaSignatureScheme::Pkcs1Sha256,
    )
    .unwrap();
}

#[rstest]
#[case(0)]
#[case(17)]
#[case(255)]
fn test_flipped_byte_fails(#[case] index: usize) {
    let mut signature = sign_pkcs1_sha256(b"credbridge");
    signature[index] ^= 0x01;
    assert!(verify_rsa_signature(
        &certificate_key(),
        b"credbridge",
        &signature,
        RsaSignatureScheme::Pkcs1Sha256,
    )
    .is_err());
}

#[test]
fn test_wrong_message_fails() {
    let signature = sign_pkcs1_sha256(b"credbridge");
    assert!(verify_rsa_signature(
        &certificate_key(),
        b"credbridgf",
        &signature,
        RsaSignatureScheme::Pkcs1Sha256,
    )
    .is_err());
}
