//! Optional HTTPS for the query service.
//!
//! Connection strings travel in request bodies, so anything beyond localhost
//! should be served over TLS.

use anyhow::{bail, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_TLS_PORT: u16 = 8443;

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub port: u16,
}

impl TlsConfig {
    /// `Ok(None)` unless `TLS_ENABLED` is true. Once enabled, both PEM paths
    /// are required.
    pub fn from_env() -> Result<Option<Self>> {
        let enabled = env::var("TLS_ENABLED")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !enabled {
            return Ok(None);
        }

        let port = match env::var("TLS_PORT") {
            Ok(v) => v.parse().context("Invalid TLS_PORT")?,
            Err(_) => DEFAULT_TLS_PORT,
        };

        Ok(Some(Self {
            cert_path: env::var("TLS_CERT_PATH")
                .context("TLS_CERT_PATH must be set when TLS is enabled")?
                .into(),
            key_path: env::var("TLS_KEY_PATH")
                .context("TLS_KEY_PATH must be set when TLS is enabled")?
                .into(),
            port,
        }))
    }

    pub fn bind_address(&self, host: &str) -> Result<SocketAddr> {
        format!("{}:{}", host, self.port)
            .parse()
            .with_context(|| format!("Invalid TLS bind address {}:{}", host, self.port))
    }

    pub async fn load(&self) -> Result<RustlsConfig> {
        for (label, path) in [("certificate", &self.cert_path), ("private key", &self.key_path)] {
            if !path.exists() {
                bail!("TLS {} not found at {:?}", label, path);
            }
        }

        let config = RustlsConfig::from_pem_file(&self.cert_path, &self.key_path)
            .await
            .context("Failed to load TLS certificates")?;

        tracing::info!("TLS certificate loaded from {:?}", self.cert_path);

        Ok(config)
    }
}
