//! Opaque key objects handed to the crypto host

use crate::error::{Error, Result};
use crate::ffi::names;
use crate::params::ParamSet;
use credbridge_crypto::{estimate_security_bits, RsaPublicComponents};
use credbridge_native::{usage, NativeKey, Platform};
use credbridge_types::{KeyAlgorithm, KeySelection, KeyType};
use std::fmt;
use std::sync::Arc;

/// Parameters reported by key management for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParams {
    /// Modulus size in bits
    pub bits: u32,
    /// Estimated security strength in bits
    pub security_bits: u32,
    /// Largest signature the algorithm can produce, in bytes
    pub max_size: usize,
}

/// A key object owning at most one native key handle.
///
/// Keys are never cloned implicitly: [`ProviderKey::duplicate`] obtains a
/// fresh native handle, and [`ProviderKey::take`] moves the handle out and
/// leaves an empty key behind.
pub struct ProviderKey {
    handle: Option<Box<dyn NativeKey>>,
    key_type: KeyType,
    algorithm: KeyAlgorithm,
    platform: Arc<dyn Platform>,
}

impl ProviderKey {
    /// Empty RSA public key without a native handle
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            handle: None,
            key_type: KeyType::Public,
            algorithm: KeyAlgorithm::Rsa,
            platform,
        }
    }

    /// Wrap a native handle
    pub fn from_native(
        platform: Arc<dyn Platform>,
        handle: Box<dyn NativeKey>,
        key_type: KeyType,
        algorithm: KeyAlgorithm,
    ) -> Self {
        Self {
            handle: Some(handle),
            key_type,
            algorithm,
            platform,
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// True when no native handle is held
    pub fn is_empty(&self) -> bool {
        self.handle.is_none()
    }

    pub(crate) fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub(crate) fn native(&self) -> Result<&dyn NativeKey> {
        self.handle.as_deref().ok_or(Error::EmptyKey)
    }

    /// Move the native handle into a new key, leaving this one empty
    pub fn take(&mut self) -> ProviderKey {
        ProviderKey {
            handle: self.handle.take(),
            key_type: self.key_type,
            algorithm: self.algorithm,
            platform: Arc::clone(&self.platform),
        }
    }

    /// Obtain an independent handle to the same key.
    ///
    /// Public keys are exported and imported again as a new ephemeral key;
    /// private keys are reopened by name from the storage provider that owns
    /// them. An empty key duplicates to an empty key.
    pub fn duplicate(&self, selection: KeySelection) -> Result<ProviderKey> {
        let Some(handle) = self.handle.as_deref() else {
            return Ok(ProviderKey {
                handle: None,
                key_type: self.key_type,
                algorithm: self.algorithm,
                platform: Arc::clone(&self.platform),
            });
        };

        let duplicate = match self.key_type {
            KeyType::Public => {
                let blob = handle.export_public_blob()?;
                self.platform.open_key_storage()?.import_public_blob(&blob)?
            }
            KeyType::Private => handle.reopen()?,
        };
        tracing::trace!(
            "Duplicated {:?} {} key for selection {:#x}",
            self.key_type,
            self.algorithm,
            selection.bits()
        );

        Ok(ProviderKey::from_native(
            Arc::clone(&self.platform),
            duplicate,
            self.key_type,
            self.algorithm,
        ))
    }

    /// Modulus size in bits
    pub fn bits(&self) -> Result<u32> {
        Ok(self.native()?.length_bits()?)
    }

    /// Estimated security strength in bits
    pub fn security_bits(&self) -> Result<u32> {
        Ok(estimate_security_bits(self.bits()?))
    }

    /// Key management parameters, all derived from one length query
    pub fn params(&self) -> Result<KeyParams> {
        let bits = self.bits()?;
        Ok(KeyParams {
            bits,
            security_bits: estimate_security_bits(bits),
            max_size: self.algorithm.max_signature_size(),
        })
    }

    /// Check the native usage flags for the requested key parts.
    ///
    /// Private key selection needs decrypt usage and public key selection
    /// needs signing usage. Domain and other parameters do not apply to RSA
    /// and are always reported as present.
    ///
    /// A key the store only allows to sign therefore reports no private part,
    /// even though it signs fine. Hosts that probe with
    /// [`KeySelection::PRIVATE_KEY`] before signing should grant such keys
    /// decrypt usage or probe with [`KeySelection::PUBLIC_KEY`] instead.
    pub fn has(&self, selection: KeySelection) -> bool {
        let mut desired = 0;
        if selection.intersects(KeySelection::PRIVATE_KEY) {
            desired |= usage::ALLOW_DECRYPT;
        }
        if selection.intersects(KeySelection::PUBLIC_KEY) {
            desired |= usage::ALLOW_SIGNING;
        }
        if desired == 0 {
            return true;
        }

        match self.native().and_then(|key| Ok(key.usage_flags()?)) {
            Ok(flags) => flags & desired == desired,
            Err(e) => {
                tracing::debug!("Key usage query failed: {}", e);
                false
            }
        }
    }

    /// Public components of the key, big-endian.
    ///
    /// Any selection touching private material is refused.
    pub fn export_public(&self, selection: KeySelection) -> Result<RsaPublicComponents> {
        if selection.intersects(KeySelection::PRIVATE_KEY) {
            return Err(Error::PolicyViolation(
                "private key material never leaves the key store".to_string(),
            ));
        }
        if !selection.intersects(KeySelection::PUBLIC_KEY) {
            return Err(Error::Unsupported(format!(
                "export of selection {:#x}",
                selection.bits()
            )));
        }
        let blob = self.native()?.export_public_blob()?;
        Ok(RsaPublicComponents::from_public_blob(&blob)?)
    }

    /// Replace this key with an ephemeral public key built from `e` and `n`.
    ///
    /// On failure the key is left untouched.
    pub fn import_public(&mut self, selection: KeySelection, params: &ParamSet) -> Result<()> {
        if !selection.intersects(KeySelection::PUBLIC_KEY) {
            return Err(Error::Unsupported(format!(
                "import of selection {:#x}",
                selection.bits()
            )));
        }
        let exponent = params
            .unsigned_integer(&key_name(names::PKEY_RSA_E))?
            .ok_or_else(|| Error::InvalidParameter("missing RSA public exponent".to_string()))?;
        let modulus = params
            .unsigned_integer(&key_name(names::PKEY_RSA_N))?
            .ok_or_else(|| Error::InvalidParameter("missing RSA modulus".to_string()))?;

        let components = RsaPublicComponents::new(exponent.to_vec(), modulus.to_vec());
        let blob = components.to_public_blob();
        let handle = self.platform.open_key_storage()?.import_public_blob(&blob)?;

        self.handle = Some(handle);
        self.key_type = KeyType::Public;
        self.algorithm = KeyAlgorithm::Rsa;
        Ok(())
    }
}

pub(crate) fn key_name(name: &std::ffi::CStr) -> String {
    name.to_string_lossy().into_owned()
}

impl fmt::Debug for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKey")
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .field("empty", &self.handle.is_none())
            .finish()
    }
}
