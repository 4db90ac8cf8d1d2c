use crate::upstream::{ClientConfig, Credential, Error};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub current_context: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    pub server: String,
    #[serde(default)]
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Deserialize)]
pub struct Context {
    pub cluster: String,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    pub token_file: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub exec: Option<serde_yaml::Value>,
    #[serde(default)]
    pub auth_provider: Option<serde_yaml::Value>,
}

pub fn load(path: &str) -> Result<ClientConfig, Error> {
    info!("Loading kubeconfig from {path}");
    let content = fs::read_to_string(path)
        .map_err(|err| Error::Config(format!("unable to read kubeconfig {path}: {err}")))?;

    let kubeconfig: Kubeconfig = serde_yaml::from_str(&content)?;
    let base_dir = Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    kubeconfig.to_client_config(&base_dir)
}

impl Kubeconfig {
    /// Resolve the current context into connection settings. Relative file
    /// references are resolved against `base_dir`.
    pub fn to_client_config(&self, base_dir: &Path) -> Result<ClientConfig, Error> {
        let context_name = self
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Config("kubeconfig has no current-context".to_string()))?;

        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| Error::Config(format!("context '{context_name}' not found")))?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| Error::Config(format!("cluster '{}' not found", context.cluster)))?;

        if cluster.server.is_empty() {
            return Err(Error::Config(format!(
                "cluster '{}' has no server",
                context.cluster
            )));
        }

        if cluster.insecure_skip_tls_verify {
            return Err(Error::Config(
                "insecure-skip-tls-verify is not supported".to_string(),
            ));
        }

        let user = match &context.user {
            Some(name) => Some(
                self.users
                    .iter()
                    .find(|u| &u.name == name)
                    .map(|u| &u.user)
                    .ok_or_else(|| Error::Config(format!("user '{name}' not found")))?,
            ),
            None => None,
        };

        let ca_bundle = read_data_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
        )?;

        let mut config = ClientConfig {
            server: cluster.server.clone(),
            ca_bundle,
            ..ClientConfig::default()
        };

        if let Some(user) = user {
            config.client_certificate = read_data_or_file(
                user.client_certificate_data.as_deref(),
                user.client_certificate.as_deref(),
                base_dir,
            )?;
            config.client_private_key = read_data_or_file(
                user.client_key_data.as_deref(),
                user.client_key.as_deref(),
                base_dir,
            )?;
            config.credential = user.credential(base_dir)?;

            let has_client_certificate =
                config.client_certificate.is_some() && config.client_private_key.is_some();
            if config.credential == Credential::None && !has_client_certificate {
                if user.exec.is_some() || user.auth_provider.is_some() {
                    return Err(Error::Config(
                        "exec and auth-provider credential plugins are not supported".to_string(),
                    ));
                }
                warn!("Kubeconfig user has no credentials, requests will be anonymous");
            }
        }

        Ok(config)
    }
}

impl AuthInfo {
    fn credential(&self, base_dir: &Path) -> Result<Credential, Error> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Credential::BearerToken(token.clone()));
        }

        if let Some(token_file) = self.token_file.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Credential::BearerTokenFile(resolve_path(
                token_file, base_dir,
            )));
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Credential::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (Some(_), None) | (None, Some(_)) => Err(Error::Config(
                "username and password must be both provided".to_string(),
            )),
            (None, None) => Ok(Credential::None),
        }
    }
}

fn resolve_path(path: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_data_or_file(
    data: Option<&str>,
    file: Option<&str>,
    base_dir: &Path,
) -> Result<Option<Vec<u8>>, Error> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        return Ok(Some(BASE64_STANDARD.decode(data.trim())?));
    }

    match file.filter(|f| !f.is_empty()) {
        Some(file) => {
            let path = resolve_path(file, base_dir);
            let content = fs::read(&path).map_err(|err| {
                Error::Config(format!("unable to read {}: {err}", path.display()))
            })?;
            Ok(Some(content))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    static KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
current-context: admin@kind
clusters:
- name: kind
  cluster:
    server: https://127.0.0.1:6443
    certificate-authority-data: Y2EtYnVuZGxl
contexts:
- name: admin@kind
  context:
    cluster: kind
    user: admin
- name: reader@kind
  context:
    cluster: kind
    user: reader
users:
- name: admin
  user:
    token: admin-token
- name: reader
  user:
    tokenFile: reader.token
";

    fn parse(content: &str) -> Kubeconfig {
        serde_yaml::from_str(content).unwrap()
    }

    #[test]
    fn test_current_context_with_inline_data() {
        let kubeconfig = parse(KUBECONFIG);

        let config = kubeconfig.to_client_config(Path::new("/tmp")).unwrap();

        assert_eq!(config.server, "https://127.0.0.1:6443");
        assert_eq!(config.ca_bundle, Some(b"ca-bundle".to_vec()));
        assert_eq!(
            config.credential,
            Credential::BearerToken("admin-token".to_string())
        );
        assert!(config.client_certificate.is_none());
    }

    #[test]
    fn test_token_file_is_relative_to_kubeconfig() {
        let mut kubeconfig = parse(KUBECONFIG);
        kubeconfig.current_context = Some("reader@kind".to_string());

        let config = kubeconfig
            .to_client_config(Path::new("/etc/kube"))
            .unwrap();

        assert_eq!(
            config.credential,
            Credential::BearerTokenFile(PathBuf::from("/etc/kube/reader.token"))
        );
    }

    #[test]
    fn test_missing_context() {
        let mut kubeconfig = parse(KUBECONFIG);
        kubeconfig.current_context = Some("unknown".to_string());

        let result = kubeconfig.to_client_config(Path::new("/tmp"));

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("unknown")));
    }

    #[test]
    fn test_no_current_context() {
        let mut kubeconfig = parse(KUBECONFIG);
        kubeconfig.current_context = None;

        assert!(kubeconfig.to_client_config(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_insecure_skip_tls_verify_is_rejected() {
        let kubeconfig = parse(
            r"
current-context: dev
clusters:
- name: dev
  cluster:
    server: https://dev.example:6443
    insecure-skip-tls-verify: true
contexts:
- name: dev
  context:
    cluster: dev
",
        );

        let result = kubeconfig.to_client_config(Path::new("/tmp"));

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("insecure")));
    }

    #[test]
    fn test_exec_plugin_is_rejected() {
        let kubeconfig = parse(
            r"
current-context: eks
clusters:
- name: eks
  cluster:
    server: https://eks.example
contexts:
- name: eks
  context:
    cluster: eks
    user: eks
users:
- name: eks
  user:
    exec:
      command: aws
",
        );

        let result = kubeconfig.to_client_config(Path::new("/tmp"));

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("exec")));
    }

    #[test]
    fn test_load_reads_files_next_to_kubeconfig() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ca.crt"), "file-ca").unwrap();
        fs::write(dir.path().join("client.crt"), "client-cert").unwrap();
        fs::write(dir.path().join("client.key"), "client-key").unwrap();
        fs::write(
            dir.path().join("config"),
            r"
current-context: local
clusters:
- name: local
  cluster:
    server: https://api.example:6443/prefix
    certificate-authority: ca.crt
contexts:
- name: local
  context:
    cluster: local
    user: local
users:
- name: local
  user:
    client-certificate: client.crt
    client-key: client.key
",
        )
        .unwrap();

        let path = dir.path().join("config");
        let config = load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.server, "https://api.example:6443/prefix");
        assert_eq!(config.ca_bundle, Some(b"file-ca".to_vec()));
        assert_eq!(config.client_certificate, Some(b"client-cert".to_vec()));
        assert_eq!(config.client_private_key, Some(b"client-key".to_vec()));
        assert_eq!(config.credential, Credential::None);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load("/nonexistent/kubeconfig");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
