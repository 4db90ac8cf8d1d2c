use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

mod error;
pub mod in_cluster;
pub mod kubeconfig;
mod kubernetes_client;

pub use error::Error;
pub use kubernetes_client::KubernetesClient;

/// Authenticated, path-relative GET access to the Kubernetes API server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetch `path` (path and optional query) relative to the API server base URL
    /// and return the raw response body of a successful response.
    async fn get(&self, path: &str) -> Result<Bytes, Error>;
}

/// How requests to the API server are authenticated.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Credential {
    #[default]
    None,
    BearerToken(String),
    /// Re-read before every request: projected service account tokens rotate.
    BearerTokenFile(PathBuf),
    Basic {
        username: String,
        password: String,
    },
}

/// Connection settings resolved from a kubeconfig or the in-cluster environment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientConfig {
    pub server: String,
    pub ca_bundle: Option<Vec<u8>>,
    pub client_certificate: Option<Vec<u8>>,
    pub client_private_key: Option<Vec<u8>>,
    pub credential: Credential,
}

impl ClientConfig {
    /// Resolve connection settings from `kubeconfig` when given, from the
    /// in-cluster service account otherwise.
    pub fn resolve(kubeconfig: Option<&str>) -> Result<Self, Error> {
        match kubeconfig {
            Some(path) => kubeconfig::load(path),
            None => in_cluster::load(),
        }
    }
}
