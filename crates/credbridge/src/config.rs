//! Provider and TLS configuration

use crate::error::Result;
use credbridge_types::{CertificateFields, CertificateSearchParameters};
use serde::{Deserialize, Serialize};

/// Property query that makes the host prefer this provider's algorithms
pub const PROPERTY_QUERY: &str = "?provider=cng_provider";

/// Names used when registering the provider and locating native stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name the provider is registered under as a built-in
    pub provider_name: String,
    /// Provider loaded alongside for everything the native store cannot do
    pub baseline_provider: String,
    /// Native store holding client certificates
    pub client_store: String,
    /// Native stores scanned for trust anchors
    pub trust_stores: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_name: "cng_provider".to_string(),
            baseline_provider: "default".to_string(),
            client_store: "MY".to_string(),
            trust_stores: vec!["Root".to_string(), "CA".to_string()],
        }
    }
}

impl ProviderConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the built-in provider name
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Set the baseline provider name
    pub fn with_baseline_provider(mut self, name: impl Into<String>) -> Self {
        self.baseline_provider = name.into();
        self
    }

    /// Set the client certificate store
    pub fn with_client_store(mut self, name: impl Into<String>) -> Self {
        self.client_store = name.into();
        self
    }

    /// Replace the trust store list
    pub fn with_trust_stores<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trust_stores = names.into_iter().map(Into::into).collect();
        self
    }
}

/// What a TLS connection asks of the native store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeTlsParameters {
    /// Client certificate to present, if any
    pub client_certificate: Option<CertificateSearchParameters>,
    /// Restrict trust anchors for the server certificate, if set
    pub server_certificate_fields: Option<CertificateFields>,
}

impl NativeTlsParameters {
    /// Parameters that neither present a client certificate nor load trust anchors
    pub fn new() -> Self {
        Self::default()
    }

    /// Present a client certificate found by `search`
    pub fn with_client_certificate(mut self, search: impl Into<CertificateSearchParameters>) -> Self {
        self.client_certificate = Some(search.into());
        self
    }

    /// Verify the server against native trust anchors matching `fields`
    pub fn with_server_certificate_fields(mut self, fields: CertificateFields) -> Self {
        self.server_certificate_fields = Some(fields);
        self
    }

    /// Property query to use for algorithm fetches on this connection
    pub fn property_query(&self) -> &'static str {
        PROPERTY_QUERY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credbridge_types::CertificateHash;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.provider_name, "cng_provider");
        assert_eq!(config.baseline_provider, "default");
        assert_eq!(config.client_store, "MY");
        assert_eq!(config.trust_stores, vec!["Root", "CA"]);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ProviderConfig::from_json(r#"{"client_store": "Personal"}"#).unwrap();
        assert_eq!(config.client_store, "Personal");
        assert_eq!(config.provider_name, "cng_provider");
        assert_eq!(config.trust_stores.len(), 2);
    }

    #[test]
    fn test_invalid_json() {
        assert!(ProviderConfig::from_json("{\"trust_stores\": 5}").is_err());
        assert!(ProviderConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new()
            .with_provider_name("native")
            .with_baseline_provider("base")
            .with_client_store("Personal")
            .with_trust_stores(["Root"]);
        assert_eq!(config.provider_name, "native");
        assert_eq!(config.baseline_provider, "base");
        assert_eq!(config.client_store, "Personal");
        assert_eq!(config.trust_stores, vec!["Root"]);
    }

    #[test]
    fn test_tls_parameters_equality_and_json() {
        let hash = CertificateHash::from_bytes([0xab; 20]);
        let params = NativeTlsParameters::new()
            .with_client_certificate(hash)
            .with_server_certificate_fields(CertificateFields::new().with_organizational_unit("Ops"));

        let json = serde_json::to_string(&params).unwrap();
        let parsed: NativeTlsParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, params);
        assert_ne!(parsed, NativeTlsParameters::new());
        assert_eq!(params.property_query(), "?provider=cng_provider");
    }
}
