//! TLS material for connections to the API server
//!
//! The CA bundle and client identity come from a [`ResolvedConfig`] and are
//! checked with `rustls-pemfile` before they are handed to the HTTP client.

use cluster_core::{ClusterError, PemKind, ResolvedConfig, Result};
use reqwest::{Certificate, ClientBuilder, Identity};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::io::BufReader;
use tracing::{debug, info, warn};

/// TLS settings derived from a resolved configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsClientConfig {
    /// PEM-encoded CA bundle used to verify the server
    pub ca_cert_pem: Option<Vec<u8>>,
    /// PEM-encoded client certificate
    pub cert_pem: Option<Vec<u8>>,
    /// PEM-encoded client private key
    pub key_pem: Option<Vec<u8>>,
    /// Whether to verify the server certificate
    pub verify_server_cert: bool,
}

impl TlsClientConfig {
    /// Derive TLS settings from the bound configuration
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let ca_cert_pem = config
            .cluster
            .certificate_authority_pem
            .as_ref()
            .map(|pem| pem.as_bytes().to_vec());
        if ca_cert_pem.is_none() {
            warn!(
                "No certificate authority configured for {}, using system roots",
                config.cluster.server
            );
        }

        let (cert_pem, key_pem) = match config.user.client_identity() {
            Some((cert, key)) => (Some(cert.as_bytes().to_vec()), Some(key.as_bytes().to_vec())),
            None => (None, None),
        };

        Self {
            ca_cert_pem,
            cert_pem,
            key_pem,
            verify_server_cert: !config.cluster.insecure_skip_tls_verify,
        }
    }

    /// Check if a client certificate is presented
    pub fn has_client_identity(&self) -> bool {
        self.cert_pem.is_some() && self.key_pem.is_some()
    }

    /// Install roots and client identity on an HTTP client builder
    pub fn apply(&self, mut builder: ClientBuilder) -> Result<ClientBuilder> {
        if let Some(ca_pem) = &self.ca_cert_pem {
            let roots = load_certificates(ca_pem)?;
            debug!("Adding {} CA certificate(s) to trust roots", roots.len());
            for root in roots {
                let cert = Certificate::from_der(root.as_ref()).map_err(|e| {
                    ClusterError::PemConversion {
                        kind: PemKind::Certificate,
                        detail: format!("unusable CA certificate: {}", e),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        if let (Some(cert_pem), Some(key_pem)) = (&self.cert_pem, &self.key_pem) {
            load_certificates(cert_pem)?;
            load_private_key(key_pem)?;

            let mut bundle = cert_pem.clone();
            bundle.push(b'\n');
            bundle.extend_from_slice(key_pem);
            let identity = Identity::from_pem(&bundle).map_err(|e| ClusterError::PemConversion {
                kind: PemKind::PrivateKey,
                detail: format!("unusable client identity: {}", e),
            })?;
            builder = builder.identity(identity);
            info!("Client certificate authentication enabled");
        }

        if !self.verify_server_cert {
            warn!("Server certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(builder)
    }
}

/// Load certificates from PEM-encoded data
pub fn load_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem_data);
    let parsed = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ClusterError::PemConversion {
            kind: PemKind::Certificate,
            detail: format!("failed to parse certificates: {}", e),
        })?;

    if parsed.is_empty() {
        return Err(ClusterError::PemFormat {
            kind: PemKind::Certificate,
            material: String::from_utf8_lossy(pem_data).into_owned(),
        });
    }
    Ok(parsed)
}

/// Load the first private key from PEM-encoded data
pub fn load_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem_data);
    private_key(&mut reader)
        .map_err(|e| ClusterError::PemConversion {
            kind: PemKind::PrivateKey,
            detail: format!("failed to parse private key: {}", e),
        })?
        .ok_or_else(|| ClusterError::PemFormat {
            kind: PemKind::PrivateKey,
            material: "<no private key found>".to_string(),
        })
}
