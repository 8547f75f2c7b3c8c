//! Operation categories offered to the crypto host
//!
//! Each trait covers the constructor of one operation table. [`Provider`]
//! implements all of them over a platform backend, and the `extern "C"`
//! tables in [`crate::abi`] reach it through the provider context.

use crate::error::Result;
use crate::key::ProviderKey;
use crate::signature::SignatureContext;
use crate::store::Store;
use credbridge_native::Platform;
use credbridge_types::StoreUri;
use std::sync::Arc;

/// Key management table
pub trait KeyManagement {
    /// Empty key of the default algorithm and type
    fn new_key(&self) -> ProviderKey;
}

/// Signature table
pub trait SignatureOperations {
    /// Context with default settings and no key
    fn new_signature_context<'k>(&self) -> SignatureContext<'k>;
}

/// Store loader table
pub trait StoreLoader {
    /// Open the store named by a `cng://` URI
    fn open_store(&self, uri: &str) -> Result<Store>;
}

/// Provider instance handed to the host as its provider context
#[derive(Debug, Clone)]
pub struct Provider {
    platform: Arc<dyn Platform>,
}

impl Provider {
    /// Provider over `platform`
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }
}

impl KeyManagement for Provider {
    fn new_key(&self) -> ProviderKey {
        ProviderKey::new(Arc::clone(&self.platform))
    }
}

impl SignatureOperations for Provider {
    fn new_signature_context<'k>(&self) -> SignatureContext<'k> {
        SignatureContext::new(Arc::clone(&self.platform))
    }
}

impl StoreLoader for Provider {
    fn open_store(&self, uri: &str) -> Result<Store> {
        let uri = StoreUri::parse(uri)?;
        Store::open(Arc::clone(&self.platform), uri.store_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credbridge_native::SoftwarePlatform;
    use rstest::rstest;

    fn provider() -> Provider {
        Provider::new(Arc::new(SoftwarePlatform::builder().store("MY").build()))
    }

    #[rstest]
    #[case("cng://MY", true)]
    #[case("cng://Missing", false)]
    #[case("cng://", false)]
    #[case("file://MY", false)]
    #[case("MY", false)]
    fn test_open_store_uri(#[case] uri: &str, #[case] opens: bool) {
        assert_eq!(provider().open_store(uri).is_ok(), opens);
    }

    #[test]
    fn test_new_objects_are_empty() {
        let provider = provider();
        assert!(provider.new_key().is_empty());
        assert!(provider.new_signature_context().digest().is_none());
    }
}
