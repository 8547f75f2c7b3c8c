//! Certificate and key enumeration over a native store
//!
//! A [`Store`] walks the same native store twice: once to hand out every
//! certificate, and once to find the certificates that carry a usable
//! private key. Certificates always come first; keys are only handed out
//! after the certificate walk is exhausted.

use crate::error::Result;
use crate::key::ProviderKey;
use credbridge_native::{CertificateCursor, CertificateStore, Platform};
use credbridge_types::{KeyAlgorithm, KeySelection, KeyType};
use std::fmt;
use std::sync::Arc;

/// Object delivered to a load callback, borrowed from the store
#[derive(Debug)]
pub enum StoreObject<'a> {
    /// DER encoded certificate
    Certificate(&'a [u8]),
    /// Reference to a private key that stays owned by the store
    PrivateKey {
        /// Algorithm name of the key
        data_type: &'static str,
        /// The key itself
        key: &'a ProviderKey,
    },
}

/// Owned counterpart of [`StoreObject`]
#[derive(Debug)]
pub enum StoreEntry {
    /// DER encoded certificate
    Certificate(Vec<u8>),
    /// Independent handle to a private key
    PrivateKey(ProviderKey),
}

/// Two-phase enumerator over one native certificate store
pub struct Store {
    platform: Arc<dyn Platform>,
    store: Option<Box<dyn CertificateStore>>,
    certificates: Option<Box<dyn CertificateCursor>>,
    certificates_exhausted: bool,
    key_certificates: Option<Box<dyn CertificateCursor>>,
    current_private_key: ProviderKey,
    private_keys_exhausted: bool,
}

impl Store {
    /// Open a native store by name and position both cursors
    pub fn open(platform: Arc<dyn Platform>, store_name: &str) -> Result<Self> {
        let store = platform.open_certificate_store(store_name)?;

        let mut certificates = store.cursor()?;
        let certificates_exhausted = !certificates.advance();

        let mut key_certificates = store.cursor()?;
        let current_private_key = next_private_key(&platform, key_certificates.as_mut());
        let private_keys_exhausted = current_private_key.is_empty();

        tracing::debug!(
            "Opened store {} (certificates: {}, keys: {})",
            store_name,
            !certificates_exhausted,
            !private_keys_exhausted
        );

        Ok(Self {
            platform,
            store: Some(store),
            certificates: Some(certificates),
            certificates_exhausted,
            key_certificates: Some(key_certificates),
            current_private_key,
            private_keys_exhausted,
        })
    }

    /// Deliver the current certificate and advance.
    ///
    /// Returns `false` once certificates are exhausted. The callback's answer
    /// does not stop the walk.
    pub fn load_next_certificate(&mut self, callback: impl FnOnce(StoreObject<'_>) -> bool) -> bool {
        if self.certificates_exhausted {
            return false;
        }
        let Some(cursor) = self.certificates.as_mut() else {
            self.certificates_exhausted = true;
            return false;
        };

        match cursor.encoded() {
            Some(encoded) => {
                if !callback(StoreObject::Certificate(encoded)) {
                    tracing::debug!("Certificate callback reported failure");
                }
            }
            None => tracing::warn!("Certificate cursor positioned without a certificate"),
        }

        if !cursor.advance() {
            self.certificates_exhausted = true;
        }
        true
    }

    /// Deliver the current private key by reference and look for the next one.
    ///
    /// Returns `false` once keys are exhausted or when the callback refuses
    /// the key; a refused key stays current.
    pub fn load_next_private_key(&mut self, callback: impl FnOnce(StoreObject<'_>) -> bool) -> bool {
        if self.private_keys_exhausted {
            return false;
        }

        let object = StoreObject::PrivateKey {
            data_type: self.current_private_key.algorithm().name(),
            key: &self.current_private_key,
        };
        if !callback(object) {
            return false;
        }

        self.current_private_key = match self.key_certificates.as_mut() {
            Some(cursor) => next_private_key(&self.platform, cursor.as_mut()),
            None => ProviderKey::new(Arc::clone(&self.platform)),
        };
        if self.current_private_key.is_empty() {
            self.private_keys_exhausted = true;
        }
        true
    }

    /// Deliver the next certificate, or the next key once certificates are
    /// exhausted
    pub fn load(&mut self, mut callback: impl FnMut(StoreObject<'_>) -> bool) -> bool {
        self.load_next_certificate(&mut callback) || self.load_next_private_key(&mut callback)
    }

    /// Next object as an owned value; keys are duplicated out of the store
    pub fn load_owned(&mut self) -> Result<Option<StoreEntry>> {
        let mut entry: Option<Result<StoreEntry>> = None;
        let loaded = self.load(|object| {
            entry = Some(match object {
                StoreObject::Certificate(der) => Ok(StoreEntry::Certificate(der.to_vec())),
                StoreObject::PrivateKey { key, .. } => key
                    .duplicate(KeySelection::ALL)
                    .map(StoreEntry::PrivateKey),
            });
            true
        });
        match entry {
            Some(entry) if loaded => entry.map(Some),
            _ => Ok(None),
        }
    }

    /// True once both certificates and keys are exhausted
    pub fn is_at_eof(&self) -> bool {
        self.certificates_exhausted && self.private_keys_exhausted
    }

    /// Release both cursors, the current key and the native store.
    ///
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.certificates = None;
        self.key_certificates = None;
        self.current_private_key.take();
        self.certificates_exhausted = true;
        self.private_keys_exhausted = true;
        if let Some(store) = self.store.take() {
            store.close()?;
        }
        Ok(())
    }
}

/// Advance `cursor` to the next certificate with an acquirable key of a
/// supported algorithm. Returns an empty key when the store is exhausted.
fn next_private_key(platform: &Arc<dyn Platform>, cursor: &mut dyn CertificateCursor) -> ProviderKey {
    while cursor.advance() {
        let native = match cursor.acquire_private_key() {
            Ok(Some(native)) => native,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!("Skipping certificate whose key cannot be acquired: {}", e);
                continue;
            }
        };

        let algorithm = match native.algorithm_group() {
            Ok(group) => KeyAlgorithm::from_native_group(&group),
            Err(e) => {
                tracing::debug!("Skipping key without algorithm group: {}", e);
                continue;
            }
        };
        match algorithm {
            Some(algorithm) => {
                return ProviderKey::from_native(
                    Arc::clone(platform),
                    native,
                    KeyType::Private,
                    algorithm,
                )
            }
            None => tracing::debug!("Skipping key of unsupported algorithm"),
        }
    }
    ProviderKey::new(Arc::clone(platform))
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close certificate store: {}", e);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("open", &self.store.is_some())
            .field("certificates_exhausted", &self.certificates_exhausted)
            .field("private_keys_exhausted", &self.private_keys_exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credbridge_native::SoftwarePlatform;

    const KEY_PEM: &str = include_str!("../../../test-data/endpoint.key.pem");

    #[test]
    fn test_empty_store_is_eof() {
        let platform: Arc<dyn Platform> = Arc::new(SoftwarePlatform::builder().store("MY").build());
        let mut store = Store::open(platform, "MY").unwrap();
        assert!(store.is_at_eof());
        assert!(!store.load_next_certificate(|_| true));
        assert!(!store.load_next_private_key(|_| true));
        store.close().unwrap();
        store.close().unwrap();
    }

    #[test]
    fn test_unknown_store_fails() {
        let platform: Arc<dyn Platform> = Arc::new(SoftwarePlatform::builder().build());
        assert!(Store::open(platform, "Nope").is_err());
    }

    #[test]
    fn test_refused_key_stays_current() {
        let platform: Arc<dyn Platform> = Arc::new(
            SoftwarePlatform::builder()
                .private_key_pem("k", KEY_PEM)
                .unwrap()
                .certificate("MY", vec![0x30, 0x00], Some("k"))
                .build(),
        );
        let mut store = Store::open(platform, "MY").unwrap();
        assert!(store.load_next_certificate(|_| true));
        assert!(!store.load_next_certificate(|_| true));

        assert!(!store.load_next_private_key(|_| false));
        assert!(!store.is_at_eof());
        assert!(store.load_next_private_key(|object| matches!(
            object,
            StoreObject::PrivateKey {
                data_type: "rsaEncryption",
                ..
            }
        )));
        assert!(store.is_at_eof());
    }
}
