//! Cryptographic helpers for the native credential provider bridge
//!
//! This crate holds the pieces of the bridge that do not need a native key
//! store: the RSA security strength estimate, digests and certificate
//! thumbprints, the RSA public key-storage blob codec, X.509 inspection for
//! certificate selection, and an independent RSA verifier built on aws-lc-rs.

pub mod blob;
pub mod error;
pub mod hash;
pub mod strength;
pub mod verification;
pub mod x509;

pub use blob::{reverse_blob_integers, RsaBlobHeader, RsaPublicComponents};
pub use error::{Error, Result};
pub use hash::{certificate_thumbprint, digest, sha256, DigestContext};
pub use strength::estimate_security_bits;
pub use verification::{verify_rsa_signature, RsaSignatureScheme};
pub use x509::{parse_certificate_info, CertificateInfo};
