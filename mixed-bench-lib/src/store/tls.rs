use std::path::{Path, PathBuf};

use rama::{
    error::{ErrorContext as _, OpaqueError},
    telemetry::tracing,
};
use redis::{ClientTlsConfig, TlsCertificates};

/// PEM files used to set up a TLS connection to the store.
#[derive(Debug, Clone, Default)]
pub struct TlsFiles {
    /// CA bundle used to verify the server (system roots when absent)
    pub ca: Option<PathBuf>,
    /// client certificate, requires `key`
    pub cert: Option<PathBuf>,
    /// client private key, requires `cert`
    pub key: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    /// skip verification of the server certificate
    pub insecure: bool,
}

impl TlsFiles {
    /// Whether any certificate material needs to be loaded from disk.
    pub fn has_certificates(&self) -> bool {
        self.ca.is_some() || self.cert.is_some() || self.key.is_some()
    }

    pub async fn load_certificates(&self) -> Result<TlsCertificates, OpaqueError> {
        if self.key_passphrase.is_some() {
            return Err(OpaqueError::from_display(
                "encrypted private keys are not supported: provide a decrypted PEM key",
            ));
        }

        let client_tls = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some(ClientTlsConfig {
                client_cert: read_pem(cert).await?,
                client_key: read_pem(key).await?,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(OpaqueError::from_display(
                    "a client certificate requires a client key (--tls-key)",
                ));
            }
            (None, Some(_)) => {
                return Err(OpaqueError::from_display(
                    "a client key requires a client certificate (--tls-cert)",
                ));
            }
        };

        let root_cert = match &self.ca {
            Some(ca) => Some(read_pem(ca).await?),
            None => None,
        };

        tracing::debug!(
            client_auth = client_tls.is_some(),
            custom_ca = root_cert.is_some(),
            "tls certificates loaded"
        );

        Ok(TlsCertificates {
            client_tls,
            root_cert,
        })
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, OpaqueError> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read PEM file at path '{}'", path.display()))?;
    if bytes.is_empty() {
        return Err(OpaqueError::from_display(format!(
            "PEM file at path '{}' is empty",
            path.display()
        )));
    }
    Ok(bytes)
}
