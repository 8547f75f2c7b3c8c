//! Incremental digest-sign and digest-verify contexts
//!
//! A context hashes data through the platform and hands the digest to the
//! bound key at finalization. The key is borrowed from the host for contexts
//! it initializes and owned by contexts produced with
//! [`SignatureContext::try_clone`].

use crate::error::{Error, Result};
use crate::ffi::names;
use crate::key::{key_name, ProviderKey};
use crate::params::{ParamSet, ParamValue};
use credbridge_native::{NativeHash, Platform, SignaturePadding};
use credbridge_types::{HashAlgorithm, KeySelection, Padding, SaltLength};
use std::fmt;
use std::sync::Arc;

/// Progress of a signature context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureState {
    /// No digest operation started
    Idle,
    /// Hash created, no data yet
    HashInitialized,
    /// Data fed at least once
    Updating,
    /// Hash consumed by a sign or verify
    Finalized,
}

enum BoundKey<'k> {
    Borrowed(&'k ProviderKey),
    Owned(ProviderKey),
}

impl BoundKey<'_> {
    fn get(&self) -> &ProviderKey {
        match self {
            BoundKey::Borrowed(key) => key,
            BoundKey::Owned(key) => key,
        }
    }
}

/// Parameters a context applies atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    digest: Option<HashAlgorithm>,
    padding: Padding,
    salt_length: SaltLength,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            digest: None,
            padding: Padding::Pkcs1,
            salt_length: SaltLength::Digest,
        }
    }
}

/// State of one sign or verify operation
pub struct SignatureContext<'k> {
    platform: Arc<dyn Platform>,
    settings: Settings,
    hash: Option<Box<dyn NativeHash>>,
    hash_length: usize,
    key: Option<BoundKey<'k>>,
    state: SignatureState,
}

impl<'k> SignatureContext<'k> {
    /// Fresh context with PKCS#1 v1.5 padding
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            settings: Settings::default(),
            hash: None,
            hash_length: 0,
            key: None,
            state: SignatureState::Idle,
        }
    }

    pub fn state(&self) -> SignatureState {
        self.state
    }

    pub fn padding(&self) -> Padding {
        self.settings.padding
    }

    pub fn salt_length(&self) -> SaltLength {
        self.settings.salt_length
    }

    /// Digest chosen at initialization
    pub fn digest(&self) -> Option<HashAlgorithm> {
        self.settings.digest
    }

    /// Start a digest-sign operation with `key`
    pub fn init_sign(
        &mut self,
        digest_name: &str,
        key: &'k ProviderKey,
        params: Option<&ParamSet>,
    ) -> Result<()> {
        self.init(digest_name, key, params)
    }

    /// Start a digest-verify operation with `key`
    pub fn init_verify(
        &mut self,
        digest_name: &str,
        key: &'k ProviderKey,
        params: Option<&ParamSet>,
    ) -> Result<()> {
        self.init(digest_name, key, params)
    }

    fn init(
        &mut self,
        digest_name: &str,
        key: &'k ProviderKey,
        params: Option<&ParamSet>,
    ) -> Result<()> {
        let digest = HashAlgorithm::from_digest_name(digest_name)?;
        let mut settings = Settings {
            digest: Some(digest),
            ..self.settings
        };
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            settings = apply_params(settings, params)?;
        }

        let hash = self.platform.create_hash(digest)?;
        let hash_length = hash.hash_length()?;
        if hash_length != digest.digest_size() {
            return Err(Error::InvalidState(format!(
                "platform reports {} bytes for {}",
                hash_length, digest
            )));
        }

        self.settings = settings;
        self.hash = Some(hash);
        self.hash_length = hash_length;
        self.key = Some(BoundKey::Borrowed(key));
        self.state = SignatureState::HashInitialized;
        tracing::trace!("Initialized {} signature context", digest);
        Ok(())
    }

    fn bound_key(&self) -> Result<&ProviderKey> {
        self.key
            .as_ref()
            .map(BoundKey::get)
            .ok_or_else(|| Error::InvalidState("no key bound".to_string()))
    }

    fn active_hash(&mut self) -> Result<&mut Box<dyn NativeHash>> {
        match self.state {
            SignatureState::HashInitialized | SignatureState::Updating => self
                .hash
                .as_mut()
                .ok_or_else(|| Error::InvalidState("hash missing".to_string())),
            state => Err(Error::InvalidState(format!(
                "no digest operation in progress ({:?})",
                state
            ))),
        }
    }

    /// Feed message bytes into the hash
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        self.active_hash()?.update(data)?;
        self.state = SignatureState::Updating;
        Ok(())
    }

    /// Size of the signature the bound key produces.
    ///
    /// Asks the key store to size a signature over a zeroed digest; the hash
    /// state is not touched.
    pub fn signature_length(&self) -> Result<usize> {
        if self.hash_length == 0 {
            return Err(Error::InvalidState("context not initialized".to_string()));
        }
        let dummy = vec![0u8; self.hash_length];
        Ok(self.bound_key()?.native()?.sign_hash(None, &dummy, None)?)
    }

    fn native_padding(&self) -> Result<SignaturePadding> {
        let digest = self
            .settings
            .digest
            .ok_or_else(|| Error::InvalidState("no digest selected".to_string()))?;
        match self.settings.padding {
            Padding::Pkcs1 => Ok(SignaturePadding::Pkcs1 { digest }),
            Padding::Pss => {
                let modulus_bits = match self.settings.salt_length {
                    SaltLength::Max => Some(self.bound_key()?.bits()?),
                    _ => None,
                };
                let salt_length = self
                    .settings
                    .salt_length
                    .resolve(digest.digest_size(), modulus_bits)?;
                Ok(SignaturePadding::Pss {
                    digest,
                    salt_length,
                })
            }
            Padding::None => Err(Error::Unsupported(
                "signatures without padding".to_string(),
            )),
        }
    }

    fn finish_hash(&mut self) -> Result<Vec<u8>> {
        let hash_length = self.hash_length;
        let hash = self.active_hash()?;
        let mut digest = vec![0u8; hash_length];
        let finished = hash.finish(&mut digest);
        self.hash = None;
        self.state = SignatureState::Finalized;
        finished?;
        Ok(digest)
    }

    /// Finish the hash and sign it into `signature`.
    ///
    /// Returns the number of bytes written.
    pub fn finalize_sign(&mut self, signature: &mut [u8]) -> Result<usize> {
        let padding = self.native_padding()?;
        self.bound_key()?;
        let digest = self.finish_hash()?;
        let written = self
            .bound_key()?
            .native()?
            .sign_hash(Some(padding), &digest, Some(signature))?;
        Ok(written)
    }

    /// Finish the hash and check `signature` against it
    pub fn finalize_verify(&mut self, signature: &[u8]) -> Result<()> {
        let padding = self.native_padding()?;
        self.bound_key()?;
        let digest = self.finish_hash()?;
        self.bound_key()?
            .native()?
            .verify_signature(padding, &digest, signature)?;
        Ok(())
    }

    /// Apply padding, salt length and digest parameters.
    ///
    /// `None` is accepted and changes nothing. A list must contain at least
    /// one recognized parameter, and nothing changes unless every
    /// parameter is valid.
    pub fn set_params(&mut self, params: Option<&ParamSet>) -> Result<()> {
        let Some(params) = params else {
            return Ok(());
        };
        self.settings = apply_params(self.settings, params)?;
        Ok(())
    }

    /// Independent copy of this context.
    ///
    /// The partial hash and the bound key are both duplicated, so the copy
    /// and the original can be finalized separately.
    pub fn try_clone<'a>(&self) -> Result<SignatureContext<'a>> {
        let hash = match &self.hash {
            Some(hash) => Some(hash.duplicate()?),
            None => None,
        };
        let key = match &self.key {
            Some(bound) => Some(BoundKey::Owned(bound.get().duplicate(KeySelection::ALL)?)),
            None => None,
        };
        Ok(SignatureContext {
            platform: Arc::clone(&self.platform),
            settings: self.settings,
            hash,
            hash_length: self.hash_length,
            key,
            state: self.state,
        })
    }
}

fn apply_params(mut settings: Settings, params: &ParamSet) -> Result<Settings> {
    let mut recognized = false;

    if let Some(value) = params.get(&key_name(names::SIGNATURE_PAD_MODE)) {
        recognized = true;
        settings.padding = match value {
            ParamValue::Integer(mode) => Padding::from_mode(*mode)?,
            ParamValue::Utf8(token) => Padding::from_token(token)?,
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unexpected pad-mode value {:?}",
                    other
                )))
            }
        };
    }

    if let Some(value) = params.get(&key_name(names::SIGNATURE_PSS_SALTLEN)) {
        recognized = true;
        settings.salt_length = match value {
            ParamValue::Integer(length) => SaltLength::from_value(*length)?,
            ParamValue::Utf8(token) => match token.parse::<i64>() {
                Ok(length) => SaltLength::from_value(length)?,
                Err(_) => SaltLength::from_token(token)?,
            },
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unexpected saltlen value {:?}",
                    other
                )))
            }
        };
    }

    if let Some(name) = params.utf8(&key_name(names::SIGNATURE_DIGEST))? {
        recognized = true;
        let digest = HashAlgorithm::from_digest_name(name)?;
        match settings.digest {
            Some(current) if current != digest => {
                return Err(Error::Unsupported(format!(
                    "switching digest from {} to {} mid-operation",
                    current, digest
                )))
            }
            _ => settings.digest = Some(digest),
        }
    }

    if let Some(name) = params.utf8(&key_name(names::SIGNATURE_MGF1_DIGEST))? {
        recognized = true;
        let mgf1 = HashAlgorithm::from_digest_name(name)?;
        if settings.digest.is_some_and(|digest| digest != mgf1) {
            return Err(Error::Unsupported(format!(
                "MGF1 digest {} differs from the signature digest",
                mgf1
            )));
        }
    }

    for ignored in [names::SIGNATURE_PROPERTIES, names::SIGNATURE_MGF1_PROPERTIES] {
        if params.utf8(&key_name(ignored))?.is_some() {
            recognized = true;
        }
    }

    if !recognized {
        return Err(Error::InvalidParameter(
            "no recognized signature parameter".to_string(),
        ));
    }
    Ok(settings)
}

impl fmt::Debug for SignatureContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureContext")
            .field("settings", &self.settings)
            .field("hash_length", &self.hash_length)
            .field("state", &self.state)
            .field("owns_key", &matches!(self.key, Some(BoundKey::Owned(_))))
            .finish()
    }
}
