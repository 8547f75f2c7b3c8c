//! Native credential store bridge for TLS stacks
//!
//! This crate ties the provider to an application: it sets up the
//! process-wide [`ProviderContext`], picks the client certificate and key to
//! present from the native store, and collects native trust anchors for
//! verifying servers.
//!
//! # Example
//!
//! ```
//! use credbridge::{find_client_certificate, ProviderConfig, Error};
//! use credbridge::native::SoftwarePlatform;
//! use credbridge::provider::Provider;
//! use credbridge::types::{CertificateFields, CertificateSearchParameters};
//! use std::sync::Arc;
//!
//! let platform = Arc::new(SoftwarePlatform::builder().store("MY").build());
//! let provider = Provider::new(platform);
//! let search = CertificateSearchParameters::from(CertificateFields::new().with_common_name("client"));
//!
//! let result = find_client_certificate(&provider, &ProviderConfig::default(), &search);
//! assert!(matches!(result, Err(Error::NotFound(_))));
//! ```

pub mod config;
pub mod context;
pub mod error;
#[cfg(feature = "libcrypto")]
pub mod libcrypto;
pub mod selector;
pub mod trust;

// Re-export core crates
pub use credbridge_crypto as crypto;
pub use credbridge_native as native;
pub use credbridge_provider as provider;
pub use credbridge_types as types;

pub use config::{NativeTlsParameters, ProviderConfig, PROPERTY_QUERY};
pub use context::{LibraryHost, ProviderContext};
pub use error::{Error, Result};
#[cfg(feature = "libcrypto")]
pub use libcrypto::OpenSslHost;
pub use selector::{
    find_client_certificate, find_client_certificate_by_fields, find_client_certificate_by_hash,
    is_client_certificate, ClientCredential,
};
pub use trust::{build_trust_bundle, is_trust_anchor, TrustBundle, TrustPurpose};
