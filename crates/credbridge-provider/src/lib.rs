//! Crypto-engine provider backed by a native credential store
//!
//! The provider offers three operation tables to an OpenSSL 3 style host:
//! key management for `rsaEncryption`, digest signatures for
//! `RSA:rsaEncryption` and a store loader for `cng://` URIs. Private keys
//! stay in the native store; the provider only ever holds handles to them.
//!
//! The safe core ([`ProviderKey`], [`SignatureContext`], [`Store`]) works on
//! typed values. The [`abi`] module adapts it to the host's function tables
//! and parameter arrays, and [`registration`] hands those tables out.
//!
//! # Example
//!
//! ```
//! use credbridge_native::SoftwarePlatform;
//! use credbridge_provider::{Provider, StoreLoader};
//! use std::sync::Arc;
//!
//! let platform = Arc::new(SoftwarePlatform::builder().store("MY").build());
//! let provider = Provider::new(platform);
//! let store = provider.open_store("cng://MY").unwrap();
//! assert!(store.is_at_eof());
//! ```

pub mod abi;
pub mod error;
pub mod ffi;
pub mod key;
pub mod operation;
pub mod params;
pub mod registration;
pub mod signature;
pub mod store;

pub use error::{Error, Result};
pub use key::{KeyParams, ProviderKey};
pub use operation::{KeyManagement, Provider, SignatureOperations, StoreLoader};
pub use params::{ParamSet, ParamValue};
pub use registration::{credbridge_provider_init, init_provider, provider_init_fn};
pub use signature::{SignatureContext, SignatureState};
pub use store::{Store, StoreEntry, StoreObject};
