//! TLS listener configuration from operator-supplied PEM files

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::types::{GatewayError, Result};

/// Parse PEM-encoded certificates
fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Config(format!("Failed to parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(GatewayError::Config("No certificates found".to_string()));
    }
    Ok(certs)
}

/// Parse a PEM-encoded private key
fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| GatewayError::Config(format!("Failed to parse private key: {e}")))
}

/// Build the acceptor for the HTTPS listener
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|e| {
            GatewayError::Config(format!("Couldn't read {}: {}", path.display(), e))
        })
    };
    let certs = parse_certificates(&read(cert_path)?)?;
    let key = parse_private_key(&read(key_path)?)?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| GatewayError::Config(format!("TLS config error: {e}")))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| GatewayError::Config(format!("TLS config error: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
