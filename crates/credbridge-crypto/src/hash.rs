//! Hashing utilities using aws-lc-rs

use aws_lc_rs::digest::{self, Context, SHA1_FOR_LEGACY_USE_ONLY, SHA256, SHA384, SHA512};
use credbridge_types::{CertificateHash, HashAlgorithm};

fn algorithm_for(algorithm: HashAlgorithm) -> &'static digest::Algorithm {
    match algorithm {
        HashAlgorithm::Sha256 => &SHA256,
        HashAlgorithm::Sha384 => &SHA384,
        HashAlgorithm::Sha512 => &SHA512,
    }
}

/// Hash data using SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = digest::digest(&SHA256, data);
    let mut result = [0u8; 32];
    result.copy_from_slice(digest.as_ref());
    result
}

/// Hash data with one of the supported algorithms
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    digest::digest(algorithm_for(algorithm), data)
        .as_ref()
        .to_vec()
}

/// SHA-1 thumbprint of a DER-encoded certificate, as shown by certificate stores
pub fn certificate_thumbprint(certificate_der: &[u8]) -> CertificateHash {
    let digest = digest::digest(&SHA1_FOR_LEGACY_USE_ONLY, certificate_der);
    let mut result = [0u8; 20];
    result.copy_from_slice(digest.as_ref());
    CertificateHash::from_bytes(result)
}

/// Incremental hasher whose partial state can be cloned
#[derive(Clone)]
pub struct DigestContext {
    algorithm: HashAlgorithm,
    context: Context,
}

impl DigestContext {
    /// Start a new digest
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            context: Context::new(algorithm_for(algorithm)),
        }
    }

    /// Algorithm this context computes
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.context.update(data);
    }

    /// Finalize and get the digest
    pub fn finish(self) -> Vec<u8> {
        self.context.finish().as_ref().to_vec()
    }
}

impl std::fmt::Debug for DigestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestContext")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
