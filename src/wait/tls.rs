//! Transport security settings for HTTPS probes.

use std::path::PathBuf;

use reqwest::Certificate;

use crate::wait::error::{Result, WaitError};

#[derive(Debug, Clone)]
enum RootSource {
    Pem(Vec<u8>),
    File(PathBuf),
}

/// Root certificates and server name for HTTPS probes.
///
/// Nothing is read or parsed until a wait starts; unreadable files and
/// malformed PEM surface as configuration errors from `wait_until_ready`.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    roots: Vec<RootSource>,
    server_name: Option<String>,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust the certificates in a PEM bundle. Once any root is added, the
    /// platform trust store is no longer consulted.
    pub fn with_root_certificate_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.roots.push(RootSource::Pem(pem.into()));
        self
    }

    /// Trust the certificates in a PEM file, read when the wait starts.
    pub fn with_root_certificate_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(RootSource::File(path.into()));
        self
    }

    /// Name to present for SNI and to verify the certificate against,
    /// instead of the host the target resolves to.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn has_custom_roots(&self) -> bool {
        !self.roots.is_empty()
    }

    /// Load and parse every configured root.
    pub(crate) fn load_roots(&self) -> Result<Vec<Certificate>> {
        let mut certificates = Vec::new();

        for source in &self.roots {
            let (pem, origin) = match source {
                RootSource::Pem(pem) => (pem.clone(), "inline PEM".to_string()),
                RootSource::File(path) => {
                    let pem = std::fs::read(path).map_err(|e| {
                        WaitError::config(format!(
                            "cannot read root certificate {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    (pem, path.display().to_string())
                }
            };

            let parsed = Certificate::from_pem_bundle(&pem).map_err(|e| {
                WaitError::config(format!("invalid root certificate in {origin}: {e}"))
            })?;
            if parsed.is_empty() {
                return Err(WaitError::config(format!(
                    "no certificates found in {origin}"
                )));
            }
            certificates.extend(parsed);
        }

        Ok(certificates)
    }
}
