//! Store URIs of the form `cng://<store name>`

use crate::error::{Error, Result};

/// A parsed native store URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreUri {
    store_name: String,
}

impl StoreUri {
    /// Scheme served by the store loader
    pub const SCHEME: &'static str = "cng";
    /// Prefix every URI must start with
    pub const PREFIX: &'static str = "cng://";

    /// Parse a URI, requiring the scheme prefix and a non-empty store name
    pub fn parse(uri: &str) -> Result<Self> {
        let store_name = uri
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| Error::InvalidStoreUri(format!("missing {} prefix: {uri}", Self::PREFIX)))?;
        if store_name.is_empty() {
            return Err(Error::InvalidStoreUri(format!("missing store name: {uri}")));
        }
        Ok(Self {
            store_name: store_name.to_string(),
        })
    }

    /// Build the URI for a store name
    pub fn for_store(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
        }
    }

    /// Platform store name
    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

impl std::fmt::Display for StoreUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.store_name)
    }
}

impl std::str::FromStr for StoreUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cng://MY", "MY")]
    #[case("cng://Root", "Root")]
    #[case("cng://A", "A")]
    fn test_parse_valid(#[case] uri: &str, #[case] store: &str) {
        let parsed = StoreUri::parse(uri).unwrap();
        assert_eq!(parsed.store_name(), store);
        assert_eq!(parsed.to_string(), uri);
    }

    #[rstest]
    #[case("cng://")]
    #[case("cng:/MY")]
    #[case("file://MY")]
    #[case("MY")]
    #[case("")]
    fn test_parse_invalid(#[case] uri: &str) {
        assert!(matches!(StoreUri::parse(uri), Err(Error::InvalidStoreUri(_))));
    }
}
