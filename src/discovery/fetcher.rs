use crate::discovery::{Error, FetchStage, ProviderMetadata};
use crate::upstream::UpstreamClient;
use bytes::Bytes;
use hyper::Uri;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const WELL_KNOWN_OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";

/// Result of one successful fetch cycle, as published by the upstream.
#[derive(Clone, Debug)]
pub struct FetchedDiscovery {
    pub metadata: ProviderMetadata,
    pub jwks: Bytes,
}

#[derive(Deserialize)]
struct JwkSetEnvelope {
    #[allow(dead_code)]
    keys: Vec<Value>,
}

/// Retrieves the discovery document and the key set it references.
///
/// No retries: the refresh schedule owns retry policy.
pub struct DiscoveryFetcher {
    client: Arc<dyn UpstreamClient>,
}

impl DiscoveryFetcher {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<FetchedDiscovery, Error> {
        let metadata = self.fetch_metadata().await?;
        let jwks_path = jwks_request_path(&metadata.jwks_uri)?;
        let jwks = self.fetch_jwks(&jwks_path).await?;

        Ok(FetchedDiscovery { metadata, jwks })
    }

    async fn fetch_metadata(&self) -> Result<ProviderMetadata, Error> {
        let path = WELL_KNOWN_OPENID_CONFIGURATION;

        let body = self
            .client
            .get(path)
            .await
            .map_err(|source| Error::Transport {
                stage: FetchStage::Metadata,
                path: path.to_string(),
                source,
            })?;

        let parse_error = |reason: String| Error::Parse {
            stage: FetchStage::Metadata,
            path: path.to_string(),
            reason,
        };

        let metadata: ProviderMetadata =
            serde_json::from_slice(&body).map_err(|e| parse_error(e.to_string()))?;

        if metadata.issuer.trim().is_empty() {
            return Err(parse_error("empty issuer".to_string()));
        }
        if metadata.jwks_uri.trim().is_empty() {
            return Err(parse_error("empty jwks_uri".to_string()));
        }

        debug!("Discovered issuer {}", metadata.issuer);
        Ok(metadata)
    }

    async fn fetch_jwks(&self, path: &str) -> Result<Bytes, Error> {
        let body = self
            .client
            .get(path)
            .await
            .map_err(|source| Error::Transport {
                stage: FetchStage::Jwks,
                path: path.to_string(),
                source,
            })?;

        serde_json::from_slice::<JwkSetEnvelope>(&body).map_err(|e| Error::Parse {
            stage: FetchStage::Jwks,
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(body)
    }
}

/// Path and query of `jwks_uri`, to be requested against the same upstream.
fn jwks_request_path(jwks_uri: &str) -> Result<String, Error> {
    let parse_error = |reason: String| Error::Parse {
        stage: FetchStage::UrlParse,
        path: jwks_uri.to_string(),
        reason,
    };

    let uri: Uri = jwks_uri.parse().map_err(|e| parse_error(format!("{e}")))?;

    match uri.path_and_query() {
        Some(path) if path.path().starts_with('/') && path.path().len() > 1 => {
            Ok(path.as_str().to_string())
        }
        _ => Err(parse_error("no path in jwks_uri".to_string())),
    }
}
