use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder for endpoints the upstream issuer does not provide but which
/// OIDC discovery validators require. They are never served.
const PLACEHOLDER_ENDPOINT: &str = "nonexistent";

/// OpenID Connect discovery document.
///
/// Well-known fields are typed; anything else the upstream advertises is kept
/// in `other` and written back out untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ProviderMetadata {
    fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }

    /// Point `jwks_uri` at this service and fill in the endpoints strict
    /// validators insist on.
    pub fn republish(mut self, jwks_path: &str) -> Self {
        let base = self.issuer_base().to_string();

        self.jwks_uri = format!("{base}{jwks_path}");
        self.authorization_endpoint
            .get_or_insert_with(|| format!("{base}/{PLACEHOLDER_ENDPOINT}"));
        self.token_endpoint
            .get_or_insert_with(|| format!("{base}/{PLACEHOLDER_ENDPOINT}"));

        self
    }
}
