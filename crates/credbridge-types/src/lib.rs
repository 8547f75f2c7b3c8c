//! Core types shared by the native credential provider bridge
//!
//! This crate holds the vocabulary that every layer of the bridge agrees on:
//! digest algorithms, key type and selection bits, signature padding,
//! certificate search parameters and store URIs.

pub mod error;
pub mod hash;
pub mod key;
pub mod padding;
pub mod search;
pub mod uri;

pub use error::{Error, Result};
pub use hash::HashAlgorithm;
pub use key::{KeyAlgorithm, KeySelection, KeyType};
pub use padding::{Padding, SaltLength};
pub use search::{CertificateFields, CertificateHash, CertificateSearchParameters};
pub use uri::StoreUri;
