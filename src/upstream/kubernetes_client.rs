use crate::upstream::{ClientConfig, Credential, Error, UpstreamClient};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, instrument, warn};

pub struct KubernetesClient {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    server: String,
    credential: Credential,
    max_body_size: usize,
}

impl KubernetesClient {
    pub fn new(config: ClientConfig, max_body_size: usize) -> Result<Self, Error> {
        let server = config.server.trim_end_matches('/').to_string();
        let uri: Uri = server
            .parse()
            .map_err(|err| Error::Config(format!("invalid API server URL '{server}': {err}")))?;
        if uri.scheme_str() != Some("https") {
            return Err(Error::Config(format!(
                "API server URL '{server}' must use https"
            )));
        }

        let tls_config = build_tls_config(
            config.ca_bundle.as_deref(),
            config.client_certificate.as_deref(),
            config.client_private_key.as_deref(),
        )?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_only()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            server,
            credential: config.credential,
            max_body_size,
        })
    }

    fn authorization(&self) -> Result<Option<HeaderValue>, Error> {
        let value = match &self.credential {
            Credential::None => return Ok(None),
            Credential::BearerToken(token) => format!("Bearer {token}"),
            Credential::BearerTokenFile(path) => {
                let token = std::fs::read_to_string(path).map_err(|err| {
                    Error::Transport(format!("unable to read token {}: {err}", path.display()))
                })?;
                format!("Bearer {}", token.trim())
            }
            Credential::Basic { username, password } => {
                let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
                format!("Basic {encoded}")
            }
        };

        let mut value = HeaderValue::from_str(&value)?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

#[async_trait]
impl UpstreamClient for KubernetesClient {
    #[instrument(skip(self))]
    async fn get(&self, path: &str) -> Result<Bytes, Error> {
        let url = join_url(&self.server, path);
        debug!("GET {url}");

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(ACCEPT, "application/json")
            .body(Empty::new())?;

        if let Some(authorization) = self.authorization()? {
            request.headers_mut().insert(AUTHORIZATION, authorization);
        }

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::Transport(format!("HTTP request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = Limited::new(response.into_body(), self.max_body_size)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    Error::BodyTooLarge(self.max_body_size)
                } else {
                    Error::Transport(format!("reading response from {url} failed: {e}"))
                }
            })?;

        Ok(body.to_bytes())
    }
}

fn join_url(server: &str, path: &str) -> String {
    let server = server.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{server}{path}")
    } else {
        format!("{server}/{path}")
    }
}

fn build_tls_config(
    ca_bundle: Option<&[u8]>,
    client_cert: Option<&[u8]>,
    client_key: Option<&[u8]>,
) -> Result<rustls::ClientConfig, Error> {
    if client_cert.is_some() != client_key.is_some() {
        return Err(Error::Config(
            "client certificate and key must both be provided".to_string(),
        ));
    }

    let mut root_store = RootCertStore::empty();

    let certs = if let Some(bundle) = ca_bundle {
        CertificateDer::pem_slice_iter(bundle).collect::<Result<Vec<_>, _>>()?
    } else {
        rustls_native_certs::load_native_certs().certs
    };

    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::Config("no usable CA certificate".to_string()));
    }
    if ignored > 0 {
        warn!("Ignored {ignored} unparsable CA certificates");
    }

    let config = rustls::ClientConfig::builder().with_root_certificates(root_store);

    match (client_cert, client_key) {
        (Some(cert), Some(key)) => {
            let certs = CertificateDer::pem_slice_iter(cert).collect::<Result<Vec<_>, _>>()?;
            let key = PrivateKeyDer::from_pem_slice(key)?;
            Ok(config.with_client_auth_cert(certs, key)?)
        }
        _ => Ok(config.with_no_client_auth()),
    }
}
