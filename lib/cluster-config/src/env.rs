//! Process environment the resolver reads from
//!
//! Environment variables and the home directory are captured once into a
//! [`ResolverEnv`] value and passed to the resolver explicitly.

use std::path::{Path, PathBuf};

pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
pub const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Directory the service-account volume is mounted at inside a pod
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub const TOKEN_FILE: &str = "token";
pub const CA_FILE: &str = "ca.crt";
pub const NAMESPACE_FILE: &str = "namespace";

/// Inputs the resolver takes from the surrounding process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverEnv {
    /// Home directory, used for the default `~/.kube/config` location
    pub home: Option<PathBuf>,
    /// Value of `KUBECONFIG`
    pub kubeconfig: Option<String>,
    /// Value of `KUBERNETES_SERVICE_HOST`
    pub service_host: Option<String>,
    /// Value of `KUBERNETES_SERVICE_PORT`
    pub service_port: Option<String>,
    /// Where the service-account token, CA and namespace files live
    pub service_account_dir: PathBuf,
}

impl Default for ResolverEnv {
    fn default() -> Self {
        Self {
            home: None,
            kubeconfig: None,
            service_host: None,
            service_port: None,
            service_account_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
        }
    }
}

impl ResolverEnv {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let home = var("HOME")
            .or_else(|| var("USERPROFILE"))
            .map(PathBuf::from);

        Self {
            home,
            kubeconfig: var(KUBECONFIG_ENV),
            service_host: var(SERVICE_HOST_ENV),
            service_port: var(SERVICE_PORT_ENV),
            service_account_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
        }
    }

    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    #[must_use]
    pub fn with_service(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.service_host = Some(host.into());
        self.service_port = Some(port.into());
        self
    }

    #[must_use]
    pub fn with_service_account_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.service_account_dir = dir.into();
        self
    }

    /// Default configuration file: first entry of `KUBECONFIG`, else `<home>/.kube/config`
    pub fn default_config_path(&self) -> Option<PathBuf> {
        if let Some(list) = &self.kubeconfig {
            let separator = if cfg!(windows) { ';' } else { ':' };
            if let Some(first) = list.split(separator).find(|p| !p.is_empty()) {
                return Some(PathBuf::from(first));
            }
        }
        self.home.as_ref().map(|home| home.join(".kube").join("config"))
    }

    pub fn token_path(&self) -> PathBuf {
        self.service_account_dir.join(TOKEN_FILE)
    }

    pub fn ca_path(&self) -> PathBuf {
        self.service_account_dir.join(CA_FILE)
    }

    pub fn namespace_path(&self) -> PathBuf {
        self.service_account_dir.join(NAMESPACE_FILE)
    }
}

/// Resolve a path found inside a configuration file against the file's directory
pub fn resolve_relative(config_path: &Path, referenced: &str) -> PathBuf {
    let referenced = Path::new(referenced);
    if referenced.is_absolute() {
        return referenced.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(referenced),
        None => referenced.to_path_buf(),
    }
}
