//! Turns a configuration file or service-account material into a [`ResolvedConfig`]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use cluster_core::pem::{self, PemKind};
use cluster_core::{
    ClusterEndpoint, ClusterError, Missing, ParseSource, ResolvedConfig, Result, UserAuth,
};
use tracing::{debug, info, warn};

use crate::env::{resolve_relative, ResolverEnv};
use crate::exec::{fetch_exec_token, CommandRunner, ExecRequest, TokioCommandRunner, DEFAULT_EXEC_TIMEOUT};
use crate::format::{TextFormat, YamlFormat};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::kubeconfig::{ExecConfig, RawCluster, RawConfig, RawUser};

/// Resolves connection bundles from configuration files or in-cluster material.
///
/// Each call is a single linear attempt; nothing is retried.
#[derive(Clone)]
pub struct ConfigResolver {
    env: ResolverEnv,
    fs: Arc<dyn FileSystem>,
    format: Arc<dyn TextFormat>,
    runner: Arc<dyn CommandRunner>,
    exec_timeout: Duration,
}

impl ConfigResolver {
    /// Create a resolver using tokio I/O, YAML parsing and the default exec timeout
    pub fn new(env: ResolverEnv) -> Self {
        Self {
            env,
            fs: Arc::new(TokioFileSystem),
            format: Arc::new(YamlFormat),
            runner: Arc::new(TokioCommandRunner),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Create a resolver from the current process environment
    pub fn from_process_env() -> Self {
        Self::new(ResolverEnv::from_process())
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: Arc<dyn TextFormat>) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    #[must_use]
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn env(&self) -> &ResolverEnv {
        &self.env
    }

    /// Resolve the current context of a configuration file.
    ///
    /// Without a path the file comes from `KUBECONFIG` or `~/.kube/config`.
    pub async fn get_config(&self, path: Option<&Path>) -> Result<ResolvedConfig> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.env.default_config_path().ok_or_else(|| {
                ClusterError::ConfigFileNotFound(Missing::File {
                    path: PathBuf::from("~/.kube/config"),
                    reason: "no KUBECONFIG and no home directory".to_string(),
                })
            })?,
        };
        debug!("Loading cluster configuration from {}", path.display());

        let text = self.fs.read_to_string(&path).await.map_err(|e| {
            debug!("Cannot read configuration file {}: {}", path.display(), e);
            ClusterError::ConfigFileNotFound(Missing::File {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;

        let value = self.format.parse(&text).map_err(|e| {
            warn!("Failed to parse {} as {}: {}", path.display(), self.format.name(), e);
            ClusterError::parsing(
                ParseSource::ConfigFile,
                format!("config file {}", path.display()),
                e,
                text.clone(),
            )
        })?;
        let raw = RawConfig::from_value(value)?;

        let context_name = raw
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ClusterError::InvalidConfig(format!(
                    "current-context is not set in {}",
                    path.display()
                ))
            })?;

        let context = raw.context(context_name)?;
        let raw_cluster = raw.cluster(&context.cluster)?;
        let raw_user = raw.user(&context.user)?;
        info!(
            "Using context {} (cluster: {}, user: {})",
            context_name, context.cluster, context.user
        );

        let cluster = self.resolve_cluster(raw_cluster, &path).await?;
        let user = self.resolve_user(&context.user, raw_user, &path).await?;

        Ok(ResolvedConfig {
            cluster,
            user,
            namespace: context.namespace.clone().filter(|ns| !ns.is_empty()),
        })
    }

    /// Resolve the service-account identity of a pod running inside the cluster
    pub async fn get_in_cluster_config(&self) -> Result<ResolvedConfig> {
        let (host, port) = match (&self.env.service_host, &self.env.service_port) {
            (Some(host), Some(port)) => (host, port),
            _ => {
                return Err(ClusterError::NotInCluster(
                    "KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be set".to_string(),
                ))
            }
        };

        let token_path = self.env.token_path();
        let ca_path = self.env.ca_path();
        let (token, ca) = tokio::join!(
            self.fs.read_to_string(&token_path),
            self.fs.read(&ca_path)
        );
        let token = token.map_err(|e| missing_file(&token_path, e))?;
        let ca = ca.map_err(|e| missing_file(&ca_path, e))?;

        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(ClusterError::InvalidConfig(format!(
                "service account token {} is empty",
                token_path.display()
            )));
        }
        if ca.is_empty() {
            return Err(ClusterError::InvalidConfig(format!(
                "service account CA {} is empty",
                ca_path.display()
            )));
        }

        let ca_data = STANDARD.encode(&ca);
        let ca_pem = pem::convert_base64_to_pem(&ca_data, PemKind::Certificate)?;

        let namespace = match self.fs.read_to_string(&self.env.namespace_path()).await {
            Ok(ns) => Some(ns.trim().to_string()).filter(|ns| !ns.is_empty()),
            Err(e) => {
                debug!("No service account namespace available: {}", e);
                None
            }
        };

        let server = if host.contains(':') {
            format!("https://[{}]:{}", host, port)
        } else {
            format!("https://{}:{}", host, port)
        };
        info!("Using in-cluster configuration for {}", server);

        Ok(ResolvedConfig {
            cluster: ClusterEndpoint {
                server,
                certificate_authority_data: Some(pem::pem_to_base64(&ca_pem)),
                certificate_authority_pem: Some(ca_pem),
                insecure_skip_tls_verify: false,
            },
            user: UserAuth::Token { token },
            namespace,
        })
    }

    /// Resolve from the default configuration file, falling back to in-cluster
    /// material only when that file is missing, unreadable or unparseable
    pub async fn load_default(&self) -> Result<ResolvedConfig> {
        match self.get_config(None).await {
            Ok(config) => Ok(config),
            Err(e) if e.is_config_file_failure() => {
                info!("No usable configuration file ({}), trying in-cluster configuration", e);
                self.get_in_cluster_config().await
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_cluster(&self, raw: &RawCluster, config_path: &Path) -> Result<ClusterEndpoint> {
        let mut endpoint = ClusterEndpoint::new(raw.server.clone());
        endpoint.insecure_skip_tls_verify = raw.insecure_skip_tls_verify.unwrap_or(false);

        if let Some((data, pem)) = self
            .load_pem(
                raw.certificate_authority_data.as_deref(),
                raw.certificate_authority.as_deref(),
                config_path,
                PemKind::Certificate,
            )
            .await?
        {
            endpoint.certificate_authority_data = Some(data);
            endpoint.certificate_authority_pem = Some(pem);
        } else {
            debug!("Cluster {} has no certificate authority configured", raw.server);
        }

        Ok(endpoint)
    }

    async fn resolve_user(&self, name: &str, raw: &RawUser, config_path: &Path) -> Result<UserAuth> {
        if let Some(exec) = &raw.exec {
            debug!("User {} authenticates with exec plugin {}", name, exec.command);
            let token = fetch_exec_token(self.runner.as_ref(), &exec_request(exec), self.exec_timeout).await?;
            return Ok(UserAuth::Token { token });
        }

        if let Some(token) = raw.token.as_deref().filter(|t| !t.is_empty()) {
            debug!("User {} authenticates with a static token", name);
            return Ok(UserAuth::Token {
                token: token.to_string(),
            });
        }

        if let Some(token_file) = raw.token_file.as_deref() {
            let path = resolve_relative(config_path, token_file);
            let token = self
                .fs
                .read_to_string(&path)
                .await
                .map_err(|e| missing_referenced_file(&path, e))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(ClusterError::InvalidConfig(format!(
                    "token file {} for user '{}' is empty",
                    path.display(),
                    name
                )));
            }
            debug!("User {} authenticates with token file {}", name, path.display());
            return Ok(UserAuth::Token {
                token: token.to_string(),
            });
        }

        let cert = self
            .load_pem(
                raw.client_certificate_data.as_deref(),
                raw.client_certificate.as_deref(),
                config_path,
                PemKind::Certificate,
            )
            .await?;
        let key = self
            .load_pem(
                raw.client_key_data.as_deref(),
                raw.client_key.as_deref(),
                config_path,
                PemKind::PrivateKey,
            )
            .await?;

        match (cert, key) {
            (Some((cert_data, cert_pem)), Some((key_data, key_pem))) => {
                debug!("User {} authenticates with a client certificate", name);
                Ok(UserAuth::ClientCertificate {
                    client_certificate_data: cert_data,
                    client_key_data: key_data,
                    client_certificate_pem: cert_pem,
                    client_key_pem: key_pem,
                })
            }
            (Some(_), None) | (None, Some(_)) => Err(ClusterError::InvalidConfig(format!(
                "user '{}' must set both a client certificate and a client key",
                name
            ))),
            (None, None) => Err(ClusterError::InvalidConfig(format!(
                "user '{}' has no exec plugin, token or client certificate",
                name
            ))),
        }
    }

    /// Load key material given inline as base64 or as a file path.
    ///
    /// Returns the base64 form and the PEM text.
    async fn load_pem(
        &self,
        data: Option<&str>,
        file: Option<&str>,
        config_path: &Path,
        kind: PemKind,
    ) -> Result<Option<(String, String)>> {
        if let Some(data) = data {
            if data.trim().is_empty() {
                return Err(ClusterError::InvalidConfig(format!(
                    "inline {} data in {} is empty",
                    kind,
                    config_path.display()
                )));
            }
            let pem = pem::convert_base64_to_pem(data, kind)?;
            return Ok(Some((data.to_string(), pem)));
        }

        let Some(file) = file.filter(|f| !f.is_empty()) else {
            return Ok(None);
        };
        let path = resolve_relative(config_path, file);
        let bytes = self
            .fs
            .read(&path)
            .await
            .map_err(|e| missing_referenced_file(&path, e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ClusterError::InvalidConfig(format!(
                "{} file {} is empty",
                kind,
                path.display()
            )));
        }
        debug!("Read {} from {}", kind, path.display());

        let encoded = STANDARD.encode(&bytes);
        let pem = pem::convert_base64_to_pem(&encoded, kind)?;
        Ok(Some((pem::pem_to_base64(&pem), pem)))
    }
}

fn exec_request(exec: &ExecConfig) -> ExecRequest {
    let mut env: Vec<(String, String)> = exec
        .env
        .iter()
        .map(|var| (var.name.clone(), var.value.clone()))
        .collect();

    if let Some(api_version) = &exec.api_version {
        let info = serde_json::json!({
            "apiVersion": api_version,
            "kind": "ExecCredential",
            "spec": { "interactive": false }
        });
        env.push(("KUBERNETES_EXEC_INFO".to_string(), info.to_string()));
    }

    ExecRequest {
        command: exec.command.clone(),
        args: exec.args.clone(),
        env,
    }
}

fn missing_file(path: &Path, err: std::io::Error) -> ClusterError {
    ClusterError::ConfigFileNotFound(Missing::File {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn missing_referenced_file(path: &Path, err: std::io::Error) -> ClusterError {
    ClusterError::ConfigFileNotFound(Missing::ReferencedFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
