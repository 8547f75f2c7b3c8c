//! In-process credential store
//!
//! Keys and certificate stores are fixed when the platform is built, which
//! keeps every handle lock-free. Persisted keys are addressed by name so a
//! handle can be reopened the way a platform key store reopens a key.

use crate::error::{Error, Result};
use crate::{
    usage, CertificateCursor, CertificateStore, KeyStorage, NativeHash, NativeKey, Platform,
    SignaturePadding,
};
use credbridge_crypto::{DigestContext, RsaPublicComponents};
use credbridge_types::HashAlgorithm;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum StoredMaterial {
    Rsa(Arc<RsaPrivateKey>),
    /// Key of an algorithm the bridge does not drive
    Foreign { algorithm_group: String },
}

#[derive(Debug, Clone)]
struct StoredKey {
    material: StoredMaterial,
    usage: u32,
}

#[derive(Debug, Clone)]
struct StoredCertificate {
    der: Vec<u8>,
    key_name: Option<String>,
}

#[derive(Debug, Default)]
struct SoftwareState {
    keys: HashMap<String, StoredKey>,
    stores: HashMap<String, Vec<StoredCertificate>>,
}

impl SoftwareState {
    fn open_key(self: &Arc<Self>, name: &str) -> Result<SoftwareKey> {
        let stored = self
            .keys
            .get(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        let material = match &stored.material {
            StoredMaterial::Rsa(key) => KeyMaterial::Private(Arc::clone(key)),
            StoredMaterial::Foreign { algorithm_group } => KeyMaterial::Foreign {
                algorithm_group: algorithm_group.clone(),
            },
        };
        Ok(SoftwareKey {
            name: Some(name.to_string()),
            material,
            usage: stored.usage,
            state: Arc::clone(self),
        })
    }
}

/// In-process platform with fixed keys and certificate stores
#[derive(Debug, Clone)]
pub struct SoftwarePlatform {
    state: Arc<SoftwareState>,
}

impl SoftwarePlatform {
    /// Start describing a platform
    pub fn builder() -> SoftwarePlatformBuilder {
        SoftwarePlatformBuilder::default()
    }
}

/// Builder for [`SoftwarePlatform`]
#[derive(Debug, Default)]
pub struct SoftwarePlatformBuilder {
    state: SoftwareState,
}

impl SoftwarePlatformBuilder {
    /// Persist an RSA private key under `name`, usable for every purpose
    pub fn private_key(self, name: impl Into<String>, key: RsaPrivateKey) -> Self {
        self.private_key_with_usage(name, key, usage::ALLOW_ALL)
    }

    /// Persist an RSA private key under `name` with explicit usage flags
    pub fn private_key_with_usage(
        mut self,
        name: impl Into<String>,
        key: RsaPrivateKey,
        usage: u32,
    ) -> Self {
        self.state.keys.insert(
            name.into(),
            StoredKey {
                material: StoredMaterial::Rsa(Arc::new(key)),
                usage,
            },
        );
        self
    }

    /// Persist a PKCS#8 PEM encoded RSA private key under `name`
    pub fn private_key_pem(self, name: impl Into<String>, pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::InvalidParameter(format!("invalid PKCS#8 key: {}", e)))?;
        Ok(self.private_key(name, key))
    }

    /// Persist a key of another algorithm group; it can be acquired but not used
    pub fn foreign_key(mut self, name: impl Into<String>, algorithm_group: impl Into<String>) -> Self {
        self.state.keys.insert(
            name.into(),
            StoredKey {
                material: StoredMaterial::Foreign {
                    algorithm_group: algorithm_group.into(),
                },
                usage: usage::ALLOW_ALL,
            },
        );
        self
    }

    /// Create an empty certificate store
    pub fn store(mut self, name: impl Into<String>) -> Self {
        self.state.stores.entry(name.into()).or_default();
        self
    }

    /// Append a DER certificate to a store, optionally bound to a persisted key
    pub fn certificate(
        mut self,
        store: impl Into<String>,
        der: impl Into<Vec<u8>>,
        key_name: Option<&str>,
    ) -> Self {
        self.state
            .stores
            .entry(store.into())
            .or_default()
            .push(StoredCertificate {
                der: der.into(),
                key_name: key_name.map(str::to_string),
            });
        self
    }

    /// Finish the platform
    pub fn build(self) -> SoftwarePlatform {
        SoftwarePlatform {
            state: Arc::new(self.state),
        }
    }
}

impl Platform for SoftwarePlatform {
    fn open_key_storage(&self) -> Result<Box<dyn KeyStorage>> {
        Ok(Box::new(SoftwareKeyStorage {
            state: Arc::clone(&self.state),
        }))
    }

    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn NativeHash>> {
        Ok(Box::new(SoftwareHash {
            algorithm,
            context: Some(DigestContext::new(algorithm)),
        }))
    }

    fn open_certificate_store(&self, name: &str) -> Result<Box<dyn CertificateStore>> {
        if !self.state.stores.contains_key(name) {
            return Err(Error::StoreNotFound(name.to_string()));
        }
        Ok(Box::new(SoftwareCertificateStore {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct SoftwareKeyStorage {
    state: Arc<SoftwareState>,
}

impl KeyStorage for SoftwareKeyStorage {
    fn import_public_blob(&self, blob: &[u8]) -> Result<Box<dyn NativeKey>> {
        let components = RsaPublicComponents::from_public_blob(blob)?;
        let key = RsaPublicKey::new(
            BigUint::from_bytes_be(&components.modulus),
            BigUint::from_bytes_be(&components.public_exponent),
        )
        .map_err(|e| Error::InvalidParameter(format!("rejected RSA public key: {}", e)))?;

        Ok(Box::new(SoftwareKey {
            name: None,
            material: KeyMaterial::Public(key),
            usage: usage::ALLOW_ALL,
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
enum KeyMaterial {
    Private(Arc<RsaPrivateKey>),
    Public(RsaPublicKey),
    Foreign { algorithm_group: String },
}

#[derive(Debug)]
struct SoftwareKey {
    /// Set for persisted keys
    name: Option<String>,
    material: KeyMaterial,
    usage: u32,
    state: Arc<SoftwareState>,
}

impl SoftwareKey {
    fn public_key(&self) -> Result<RsaPublicKey> {
        match &self.material {
            KeyMaterial::Private(key) => Ok(key.to_public_key()),
            KeyMaterial::Public(key) => Ok(key.clone()),
            KeyMaterial::Foreign { algorithm_group } => Err(Error::Unsupported(format!(
                "{} keys cannot be used",
                algorithm_group
            ))),
        }
    }
}

fn pkcs1_scheme(digest: HashAlgorithm) -> Pkcs1v15Sign {
    match digest {
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

fn pss_scheme(digest: HashAlgorithm, salt_length: u32) -> Pss {
    let salt_length = salt_length as usize;
    match digest {
        HashAlgorithm::Sha256 => Pss::new_with_salt::<Sha256>(salt_length),
        HashAlgorithm::Sha384 => Pss::new_with_salt::<Sha384>(salt_length),
        HashAlgorithm::Sha512 => Pss::new_with_salt::<Sha512>(salt_length),
    }
}

fn check_hash_length(padding: SignaturePadding, hash: &[u8]) -> Result<()> {
    let digest = match padding {
        SignaturePadding::Pkcs1 { digest } | SignaturePadding::Pss { digest, .. } => digest,
    };
    if hash.len() != digest.digest_size() {
        return Err(Error::InvalidParameter(format!(
            "{} digest must be {} bytes, got {}",
            digest,
            digest.digest_size(),
            hash.len()
        )));
    }
    Ok(())
}

impl NativeKey for SoftwareKey {
    fn length_bits(&self) -> Result<u32> {
        Ok(self.public_key()?.n().bits() as u32)
    }

    fn usage_flags(&self) -> Result<u32> {
        Ok(self.usage)
    }

    fn algorithm_group(&self) -> Result<String> {
        match &self.material {
            KeyMaterial::Private(_) | KeyMaterial::Public(_) => Ok("RSA".to_string()),
            KeyMaterial::Foreign { algorithm_group } => Ok(algorithm_group.clone()),
        }
    }

    fn export_public_blob(&self) -> Result<Vec<u8>> {
        let key = self.public_key()?;
        let components = RsaPublicComponents::new(key.e().to_bytes_be(), key.n().to_bytes_be());
        Ok(components.to_public_blob())
    }

    fn reopen(&self) -> Result<Box<dyn NativeKey>> {
        let name = self
            .name
            .as_deref()
            .ok_or_else(|| Error::Unsupported("ephemeral keys cannot be reopened".to_string()))?;
        Ok(Box::new(self.state.open_key(name)?))
    }

    fn sign_hash(
        &self,
        padding: Option<SignaturePadding>,
        hash: &[u8],
        signature: Option<&mut [u8]>,
    ) -> Result<usize> {
        let key = match &self.material {
            KeyMaterial::Private(key) => key,
            KeyMaterial::Public(_) => {
                return Err(Error::Unsupported("public keys cannot sign".to_string()))
            }
            KeyMaterial::Foreign { algorithm_group } => {
                return Err(Error::Unsupported(format!(
                    "{} keys cannot be used",
                    algorithm_group
                )))
            }
        };
        if self.usage & usage::ALLOW_SIGNING == 0 {
            return Err(Error::Unsupported("key is not allowed to sign".to_string()));
        }

        let required = key.size();
        let Some(out) = signature else {
            return Ok(required);
        };
        if out.len() < required {
            return Err(Error::BufferTooSmall {
                required,
                provided: out.len(),
            });
        }

        let padding = padding
            .ok_or_else(|| Error::InvalidParameter("signing requires padding".to_string()))?;
        check_hash_length(padding, hash)?;

        let produced = match padding {
            SignaturePadding::Pkcs1 { digest } => key.sign(pkcs1_scheme(digest), hash),
            SignaturePadding::Pss {
                digest,
                salt_length,
            } => key.sign_with_rng(
                &mut rand::thread_rng(),
                pss_scheme(digest, salt_length),
                hash,
            ),
        }
        .map_err(|e| Error::Signing(e.to_string()))?;

        out[..produced.len()].copy_from_slice(&produced);
        Ok(produced.len())
    }

    fn verify_signature(
        &self,
        padding: SignaturePadding,
        hash: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        check_hash_length(padding, hash)?;
        let key = self.public_key()?;
        match padding {
            SignaturePadding::Pkcs1 { digest } => key.verify(pkcs1_scheme(digest), hash, signature),
            SignaturePadding::Pss {
                digest,
                salt_length,
            } => key.verify(pss_scheme(digest, salt_length), hash, signature),
        }
        .map_err(|e| Error::Verification(e.to_string()))
    }
}

#[derive(Debug)]
struct SoftwareHash {
    algorithm: HashAlgorithm,
    /// `None` once finished
    context: Option<DigestContext>,
}

impl NativeHash for SoftwareHash {
    fn hash_length(&self) -> Result<usize> {
        Ok(self.algorithm.digest_size())
    }

    fn update(&mut self, data: &[u8]) -> Result<()> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| Error::InvalidState("hash already finished".to_string()))?;
        context.update(data);
        Ok(())
    }

    fn finish(&mut self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.algorithm.digest_size() {
            return Err(Error::InvalidParameter(format!(
                "digest buffer must be {} bytes, got {}",
                self.algorithm.digest_size(),
                out.len()
            )));
        }
        let context = self
            .context
            .take()
            .ok_or_else(|| Error::InvalidState("hash already finished".to_string()))?;
        out.copy_from_slice(&context.finish());
        Ok(())
    }

    fn duplicate(&self) -> Result<Box<dyn NativeHash>> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| Error::InvalidState("hash already finished".to_string()))?;
        Ok(Box::new(SoftwareHash {
            algorithm: self.algorithm,
            context: Some(context),
        }))
    }
}

struct SoftwareCertificateStore {
    name: String,
    state: Arc<SoftwareState>,
}

impl CertificateStore for SoftwareCertificateStore {
    fn cursor(&self) -> Result<Box<dyn CertificateCursor>> {
        Ok(Box::new(SoftwareCursor {
            store: self.name.clone(),
            state: Arc::clone(&self.state),
            next: 0,
            current: None,
        }))
    }

    fn close(self: Box<Self>) -> Result<()> {
        tracing::debug!("Closing software certificate store {}", self.name);
        Ok(())
    }
}

struct SoftwareCursor {
    store: String,
    state: Arc<SoftwareState>,
    next: usize,
    current: Option<usize>,
}

impl SoftwareCursor {
    fn entries(&self) -> &[StoredCertificate] {
        self.state
            .stores
            .get(&self.store)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn current_entry(&self) -> Option<&StoredCertificate> {
        self.current.and_then(|index| self.entries().get(index))
    }
}

impl CertificateCursor for SoftwareCursor {
    fn advance(&mut self) -> bool {
        if self.next < self.entries().len() {
            self.current = Some(self.next);
            self.next += 1;
            true
        } else {
            self.current = None;
            false
        }
    }

    fn encoded(&self) -> Option<&[u8]> {
        self.current_entry().map(|entry| entry.der.as_slice())
    }

    fn acquire_private_key(&self) -> Result<Option<Box<dyn NativeKey>>> {
        let Some(key_name) = self.current_entry().and_then(|entry| entry.key_name.as_deref())
        else {
            return Ok(None);
        };
        match self.state.open_key(key_name) {
            Ok(key) => Ok(Some(Box::new(key))),
            Err(Error::KeyNotFound(name)) => {
                tracing::debug!("Certificate references missing key {}", name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_PEM: &str = include_str!("../../../test-data/endpoint.key.pem");

    fn platform() -> SoftwarePlatform {
        SoftwarePlatform::builder()
            .private_key_pem("endpoint", KEY_PEM)
            .unwrap()
            .foreign_key("ecdsa", "ECDSA")
            .certificate("MY", vec![1u8, 2, 3], Some("endpoint"))
            .certificate("MY", vec![4u8, 5], None)
            .certificate("MY", vec![6u8], Some("missing"))
            .store("Empty")
            .build()
    }

    fn sha256(data: &[u8]) -> Vec<u8> {
        credbridge_crypto::digest(HashAlgorithm::Sha256, data)
    }

    #[test]
    fn test_unknown_store() {
        assert!(matches!(
            platform().open_certificate_store("Nope"),
            Err(Error::StoreNotFound(_))
        ));
    }

    #[test]
    fn test_cursor_walk() {
        let store = platform().open_certificate_store("MY").unwrap();
        let mut cursor = store.cursor().unwrap();
        assert!(cursor.encoded().is_none());

        assert!(cursor.advance());
        assert_eq!(cursor.encoded(), Some(&[1u8, 2, 3][..]));
        assert!(cursor.acquire_private_key().unwrap().is_some());

        assert!(cursor.advance());
        assert!(cursor.acquire_private_key().unwrap().is_none());

        assert!(cursor.advance());
        // dangling key reference behaves like no key
        assert!(cursor.acquire_private_key().unwrap().is_none());

        assert!(!cursor.advance());
        assert!(!cursor.advance());
        assert!(cursor.encoded().is_none());
        drop(cursor);
        store.close().unwrap();
    }

    #[test]
    fn test_sign_and_verify() {
        let platform = platform();
        let store = platform.open_certificate_store("MY").unwrap();
        let mut cursor = store.cursor().unwrap();
        cursor.advance();
        let key = cursor.acquire_private_key().unwrap().unwrap();

        assert_eq!(key.length_bits().unwrap(), 2048);
        assert_eq!(key.algorithm_group().unwrap(), "RSA");
        assert_eq!(key.sign_hash(None, &[0u8; 32], None).unwrap(), 256);

        let hash = sha256(b"payload");
        let padding = SignaturePadding::Pkcs1 {
            digest: HashAlgorithm::Sha256,
        };
        let mut signature = vec![0u8; 256];
        let written = key
            .sign_hash(Some(padding), &hash, Some(&mut signature))
            .unwrap();
        assert_eq!(written, 256);
        key.verify_signature(padding, &hash, &signature).unwrap();

        signature[10] ^= 0xff;
        assert!(key.verify_signature(padding, &hash, &signature).is_err());
    }

    #[test]
    fn test_pss_round_trip_through_public_import() {
        let platform = platform();
        let private = platform.state.open_key("endpoint").unwrap();
        let storage = platform.open_key_storage().unwrap();
        let public = storage
            .import_public_blob(&private.export_public_blob().unwrap())
            .unwrap();

        let hash = credbridge_crypto::digest(HashAlgorithm::Sha384, b"payload");
        let padding = SignaturePadding::Pss {
            digest: HashAlgorithm::Sha384,
            salt_length: 48,
        };
        let mut signature = vec![0u8; 256];
        private
            .sign_hash(Some(padding), &hash, Some(&mut signature))
            .unwrap();
        public.verify_signature(padding, &hash, &signature).unwrap();

        // public keys never sign and are not persisted
        assert!(public.sign_hash(Some(padding), &hash, Some(&mut signature)).is_err());
        assert!(public.reopen().is_err());
    }

    #[test]
    fn test_sign_errors() {
        let platform = platform();
        let key = platform.state.open_key("endpoint").unwrap();
        let padding = SignaturePadding::Pkcs1 {
            digest: HashAlgorithm::Sha256,
        };

        let mut short = vec![0u8; 100];
        assert!(matches!(
            key.sign_hash(Some(padding), &sha256(b"x"), Some(&mut short)),
            Err(Error::BufferTooSmall {
                required: 256,
                provided: 100
            })
        ));

        let mut out = vec![0u8; 256];
        assert!(key.sign_hash(None, &sha256(b"x"), Some(&mut out)).is_err());
        assert!(key.sign_hash(Some(padding), &[0u8; 20], Some(&mut out)).is_err());
    }

    #[test]
    fn test_reopen_persisted_key() {
        let platform = platform();
        let key = platform.state.open_key("endpoint").unwrap();
        let reopened = key.reopen().unwrap();
        assert_eq!(
            reopened.export_public_blob().unwrap(),
            key.export_public_blob().unwrap()
        );
    }

    #[test]
    fn test_foreign_key() {
        let platform = platform();
        let key = platform.state.open_key("ecdsa").unwrap();
        assert_eq!(key.algorithm_group().unwrap(), "ECDSA");
        assert!(key.export_public_blob().is_err());
        assert!(key.length_bits().is_err());
    }

    #[test]
    fn test_hash_lifecycle() {
        let platform = platform();
        let mut hash = platform.create_hash(HashAlgorithm::Sha256).unwrap();
        hash.update(b"pay").unwrap();
        let mut copy = hash.duplicate().unwrap();
        hash.update(b"load").unwrap();
        copy.update(b"load").unwrap();

        let mut first = vec![0u8; 32];
        let mut second = vec![0u8; 32];
        hash.finish(&mut first).unwrap();
        copy.finish(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, sha256(b"payload"));

        assert!(hash.update(b"more").is_err());
        assert!(hash.duplicate().is_err());
        assert!(hash.finish(&mut first).is_err());
    }
}
