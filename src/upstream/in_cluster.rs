use crate::upstream::{ClientConfig, Credential, Error};
use std::env;
use std::fs;
use std::path::Path;
use tracing::info;

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub fn load() -> Result<ClientConfig, Error> {
    let host = env::var(SERVICE_HOST_ENV).ok();
    let port = env::var(SERVICE_PORT_ENV).ok();

    match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() && !port.is_empty() => {
            load_from(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
        }
        _ => Err(Error::Config(format!(
            "not running in a cluster: {SERVICE_HOST_ENV} and {SERVICE_PORT_ENV} must be set"
        ))),
    }
}

pub fn load_from(host: &str, port: &str, service_account_dir: &Path) -> Result<ClientConfig, Error> {
    let server = if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };

    let token_file = service_account_dir.join("token");
    if !token_file.is_file() {
        return Err(Error::Config(format!(
            "service account token not found at {}",
            token_file.display()
        )));
    }

    let ca_file = service_account_dir.join("ca.crt");
    let ca_bundle = fs::read(&ca_file).map_err(|err| {
        Error::Config(format!(
            "unable to read service account CA bundle {}: {err}",
            ca_file.display()
        ))
    })?;

    info!("Using in-cluster configuration for {server}");

    Ok(ClientConfig {
        server,
        ca_bundle: Some(ca_bundle),
        client_certificate: None,
        client_private_key: None,
        credential: Credential::BearerTokenFile(token_file),
    })
}
