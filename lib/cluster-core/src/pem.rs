//! PEM encoding and validation for certificate and key material
//!
//! Cluster configuration files carry key material either as base64 of a PEM
//! document or as base64 of raw DER bytes. [`convert_base64_to_pem`] accepts
//! both without double-wrapping an already PEM-encoded certificate.

use std::fmt;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use tracing::debug;

use crate::error::{ClusterError, Result};

/// Base64 line width used when wrapping raw bytes
const PEM_LINE_WIDTH: usize = 64;

/// Kind of PEM block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PemKind {
    Certificate,
    PrivateKey,
}

impl PemKind {
    /// Label written into the BEGIN/END markers
    pub fn label(&self) -> &'static str {
        match self {
            PemKind::Certificate => "CERTIFICATE",
            PemKind::PrivateKey => "PRIVATE KEY",
        }
    }

    // RSA and EC keys keep their algorithm in the label
    fn label_pattern(&self) -> &'static str {
        match self {
            PemKind::Certificate => "CERTIFICATE",
            PemKind::PrivateKey => "(?:RSA |EC |ENCRYPTED )?PRIVATE KEY",
        }
    }

    fn block_regex(&self) -> &'static Regex {
        static CERTIFICATE: OnceLock<Regex> = OnceLock::new();
        static PRIVATE_KEY: OnceLock<Regex> = OnceLock::new();

        let cell = match self {
            PemKind::Certificate => &CERTIFICATE,
            PemKind::PrivateKey => &PRIVATE_KEY,
        };
        cell.get_or_init(|| {
            let label = self.label_pattern();
            let pattern = format!(
                r"-----BEGIN (?P<begin>{label})-----\s+(?P<body>[A-Za-z0-9+/=\s]+?)\s*-----END (?P<end>{label})-----"
            );
            Regex::new(&pattern).expect("PEM block pattern is a valid regex")
        })
    }
}

impl fmt::Display for PemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// PEM text that passed [`is_valid_pem`] for its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemMaterial {
    kind: PemKind,
    text: String,
}

impl PemMaterial {
    /// Validate PEM text for the given kind
    pub fn parse(text: impl Into<String>, kind: PemKind) -> Result<Self> {
        let text = text.into();
        if !is_valid_pem(&text, kind) {
            return Err(ClusterError::PemFormat {
                kind,
                material: text,
            });
        }
        Ok(Self { kind, text })
    }

    /// Build from base64 that holds either PEM text or raw DER bytes
    pub fn from_base64(data: &str, kind: PemKind) -> Result<Self> {
        let text = convert_base64_to_pem(data, kind)?;
        Ok(Self { kind, text })
    }

    pub fn kind(&self) -> PemKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Decode the DER bytes of every block
    pub fn to_der(&self) -> Result<Vec<u8>> {
        pem_to_buffer(&self.text, self.kind)
    }
}

/// Wrap raw bytes as base64 inside BEGIN/END markers for `kind`
pub fn buffer_to_pem(bytes: &[u8], kind: PemKind) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut lines = Vec::with_capacity(encoded.len() / PEM_LINE_WIDTH + 3);
    lines.push(format!("-----BEGIN {}-----", kind.label()));
    // base64 output is ASCII, so byte chunks are valid str boundaries
    for chunk in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        lines.push(String::from_utf8_lossy(chunk).into_owned());
    }
    lines.push(format!("-----END {}-----", kind.label()));
    lines.join("\n")
}

/// Structural check: one or more complete blocks of `kind` and nothing else
pub fn is_valid_pem(text: &str, kind: PemKind) -> bool {
    let mut matched = false;
    let mut last = 0;

    for caps in kind.block_regex().captures_iter(text) {
        let (Some(block), Some(begin), Some(end)) =
            (caps.get(0), caps.name("begin"), caps.name("end"))
        else {
            return false;
        };
        if !text[last..block.start()].trim().is_empty() || begin.as_str() != end.as_str() {
            return false;
        }
        matched = true;
        last = block.end();
    }

    matched && text[last..].trim().is_empty()
}

/// Strip markers and decode the base64 body of every block
pub fn pem_to_buffer(text: &str, kind: PemKind) -> Result<Vec<u8>> {
    if !is_valid_pem(text, kind) {
        return Err(ClusterError::PemFormat {
            kind,
            material: text.to_string(),
        });
    }

    let mut der = Vec::new();
    for caps in kind.block_regex().captures_iter(text) {
        let body: String = caps["body"]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let decoded = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| ClusterError::PemConversion {
                kind,
                detail: format!("invalid base64 in PEM body: {}", e),
            })?;
        der.extend_from_slice(&decoded);
    }
    Ok(der)
}

/// Convert base64 data from a configuration file into PEM text.
///
/// If the decoded bytes are already a PEM document for `kind` they are returned
/// verbatim; otherwise they are treated as DER and wrapped.
pub fn convert_base64_to_pem(data: &str, kind: PemKind) -> Result<String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ClusterError::PemConversion {
            kind,
            detail: format!("invalid base64 data: {}", e),
        })?;

    if let Ok(text) = std::str::from_utf8(&decoded) {
        if is_valid_pem(text, kind) {
            debug!("{} data is already PEM encoded", kind);
            return Ok(text.to_string());
        }
    }

    let pem = buffer_to_pem(&decoded, kind);
    if !is_valid_pem(&pem, kind) {
        return Err(ClusterError::PemFormat {
            kind,
            material: compact,
        });
    }
    debug!("Wrapped {} bytes of {} DER data as PEM", decoded.len(), kind);
    Ok(pem)
}

/// Base64 of the PEM text, the form used by `*-data` configuration fields
pub fn pem_to_base64(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}
