//! TLS context assembly from the configured PEM material.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::info;

use crate::config::SslConfig;
use crate::error::AppError;

/// Build the rustls server config. Protocol floor is TLS 1.2 (rustls does
/// not negotiate anything older), key exchange is ECDHE, so the DH
/// parameters file is validated for existence at config load but has no
/// runtime role here.
pub fn build_tls_config(ssl: &SslConfig) -> Result<Arc<rustls::ServerConfig>, AppError> {
    let cert_file = File::open(&ssl.certificate_file).map_err(|e| {
        AppError::Tls(format!(
            "cannot open certificate file {}: {e}",
            ssl.certificate_file.display()
        ))
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| AppError::Tls(format!("failed to parse certificate chain: {e}")))?;

    if certs.is_empty() {
        return Err(AppError::Tls(format!(
            "no certificates found in {}",
            ssl.certificate_file.display()
        )));
    }

    let key_file = File::open(&ssl.private_key_file).map_err(|e| {
        AppError::Tls(format!(
            "cannot open private key file {}: {e}",
            ssl.private_key_file.display()
        ))
    })?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| AppError::Tls(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| {
            AppError::Tls(format!(
                "no private key found in {}",
                ssl.private_key_file.display()
            ))
        })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| AppError::Tls(format!("invalid certificate/key pair: {e}")))?;

    info!("TLS context initialized successfully");
    Ok(Arc::new(config))
}
