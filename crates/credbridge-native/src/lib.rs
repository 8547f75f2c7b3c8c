//! Platform credential store abstraction
//!
//! The provider core never talks to the operating system directly. It goes
//! through the traits in this crate, which model a key-storage service that
//! keeps private keys out of process memory, an incremental hashing service
//! and a certificate store whose certificates may be bound to a resident
//! private key.
//!
//! Two backends are available:
//!
//! - [`SoftwarePlatform`]: in-process keys and stores, used by tests and on
//!   hosts without a native key store
//! - `CngPlatform`: Windows CNG and CryptoAPI (Windows only)
//!
//! Handles returned by these traits are single-owner and are not shared
//! between threads; callers that need concurrent progress duplicate them.
//!
//! # Example
//!
//! ```
//! use credbridge_native::{CertificateCursor, CertificateStore, NativeHash, Platform, SoftwarePlatform};
//! use credbridge_types::HashAlgorithm;
//!
//! # fn example() -> credbridge_native::Result<()> {
//! let platform = SoftwarePlatform::builder().store("MY").build();
//!
//! let mut hash = platform.create_hash(HashAlgorithm::Sha256)?;
//! hash.update(b"hello")?;
//! let mut digest = vec![0u8; hash.hash_length()?];
//! hash.finish(&mut digest)?;
//!
//! let store = platform.open_certificate_store("MY")?;
//! let mut cursor = store.cursor()?;
//! assert!(!cursor.advance());
//! # Ok(())
//! # }
//! ```

mod error;
mod software;

#[cfg(windows)]
mod cng;

pub use error::{Error, Result};
pub use software::{SoftwarePlatform, SoftwarePlatformBuilder};

#[cfg(windows)]
pub use cng::CngPlatform;

use credbridge_types::HashAlgorithm;
use std::fmt;
use std::sync::Arc;

/// Key usage flags reported by the key store
pub mod usage {
    /// Key may decrypt
    pub const ALLOW_DECRYPT: u32 = 0x0000_0001;
    /// Key may sign
    pub const ALLOW_SIGNING: u32 = 0x0000_0002;
    /// Key may be used for key agreement
    pub const ALLOW_KEY_AGREEMENT: u32 = 0x0000_0004;
    /// Every usage
    pub const ALLOW_ALL: u32 = 0x00ff_ffff;
}

/// Decode a DWORD key-store property (length, usage flags).
///
/// The value must be exactly four little-endian bytes; any other size means
/// the property is not what was asked for.
pub fn decode_dword_property(name: &str, value: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| {
        Error::InvalidParameter(format!(
            "property {} is {} bytes, expected a DWORD",
            name,
            value.len()
        ))
    })?;
    Ok(u32::from_le_bytes(bytes))
}

/// Padding information handed to the key store when signing or verifying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePadding {
    /// PKCS#1 v1.5 over a digest of the given algorithm
    Pkcs1 {
        /// Digest the hash was produced with
        digest: HashAlgorithm,
    },
    /// PSS over a digest of the given algorithm
    Pss {
        /// Digest the hash was produced with
        digest: HashAlgorithm,
        /// Salt length in bytes
        salt_length: u32,
    },
}

/// A handle to a key held by the platform key store
pub trait NativeKey: Send + fmt::Debug {
    /// Modulus length in bits
    fn length_bits(&self) -> Result<u32>;

    /// Usage flags, see [`usage`]
    fn usage_flags(&self) -> Result<u32>;

    /// Algorithm group name, `"RSA"` for RSA keys
    fn algorithm_group(&self) -> Result<String>;

    /// Export the public half as a key-storage public blob
    /// (see [`credbridge_crypto::blob`])
    fn export_public_blob(&self) -> Result<Vec<u8>>;

    /// Open a second handle to the same persisted key through the storage
    /// provider that owns it
    fn reopen(&self) -> Result<Box<dyn NativeKey>>;

    /// Sign a digest.
    ///
    /// Without an output buffer this only reports the signature size and
    /// `padding` may be `None`. Returns the number of bytes written.
    fn sign_hash(
        &self,
        padding: Option<SignaturePadding>,
        hash: &[u8],
        signature: Option<&mut [u8]>,
    ) -> Result<usize>;

    /// Check a signature over a digest
    fn verify_signature(
        &self,
        padding: SignaturePadding,
        hash: &[u8],
        signature: &[u8],
    ) -> Result<()>;
}

/// An incremental hash computed by the platform
pub trait NativeHash: Send + fmt::Debug {
    /// Digest size in bytes
    fn hash_length(&self) -> Result<usize>;

    /// Feed more data
    fn update(&mut self, data: &[u8]) -> Result<()>;

    /// Write the digest into `out`, which must be exactly
    /// [`NativeHash::hash_length`] bytes. The hash cannot be used afterwards.
    fn finish(&mut self, out: &mut [u8]) -> Result<()>;

    /// Copy the hash including any data already fed into it
    fn duplicate(&self) -> Result<Box<dyn NativeHash>>;
}

/// A key-storage provider able to import ephemeral keys
pub trait KeyStorage: Send {
    /// Import a key-storage public blob as an ephemeral public key
    fn import_public_blob(&self, blob: &[u8]) -> Result<Box<dyn NativeKey>>;
}

/// Position inside a certificate store enumeration
pub trait CertificateCursor: Send {
    /// Move to the next certificate. Returns `false` once the store is
    /// exhausted; the cursor then stays exhausted.
    fn advance(&mut self) -> bool;

    /// DER encoding of the current certificate
    fn encoded(&self) -> Option<&[u8]>;

    /// Private key bound to the current certificate, if the store holds one
    fn acquire_private_key(&self) -> Result<Option<Box<dyn NativeKey>>>;
}

/// An open certificate store
pub trait CertificateStore: Send {
    /// Start a new enumeration positioned before the first certificate
    fn cursor(&self) -> Result<Box<dyn CertificateCursor>>;

    /// Close the store. Cursors created from it must be dropped first.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Entry point to a platform's credential services
pub trait Platform: Send + Sync + fmt::Debug {
    /// Open the platform's default key-storage provider
    fn open_key_storage(&self) -> Result<Box<dyn KeyStorage>>;

    /// Create an incremental hash
    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn NativeHash>>;

    /// Open an existing certificate store by name, read-only
    fn open_certificate_store(&self, name: &str) -> Result<Box<dyn CertificateStore>>;
}

/// Platform backing the provider when no backend is chosen explicitly.
///
/// CNG on Windows; an empty [`SoftwarePlatform`] elsewhere.
pub fn default_platform() -> Arc<dyn Platform> {
    #[cfg(windows)]
    {
        Arc::new(CngPlatform::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(SoftwarePlatform::builder().build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_decode_dword_property() {
        assert_eq!(decode_dword_property("Length", &[0x00, 0x08, 0, 0]).unwrap(), 2048);
        assert_eq!(
            decode_dword_property("Key Usage", &usage::ALLOW_ALL.to_le_bytes()).unwrap(),
            usage::ALLOW_ALL
        );
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x00, 0x08, 0x00])]
    #[case(&[0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])]
    fn test_decode_dword_property_rejects_other_sizes(#[case] value: &[u8]) {
        assert!(matches!(
            decode_dword_property("Length", value),
            Err(Error::InvalidParameter(_))
        ));
    }
}
