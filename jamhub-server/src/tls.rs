//! TLS material for the hub's HTTPS listener.
//!
//! Certificates come from `SSL_CERTFILE`/`SSL_KEYFILE` when configured.
//! Otherwise a self-signed pair is generated under the data directory on
//! first run and reused afterwards.

use std::{fs, path::PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use jamhub_hub::HubConfig;
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Could not read TLS material: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not generate a self-signed certificate: {0}")]
    Generate(#[from] rcgen::Error),
}

/// Resolves the certificate pair and loads it into a rustls config.
pub async fn load_or_generate(config: &HubConfig) -> Result<RustlsConfig, TlsError> {
    let (cert, key) = match (&config.ssl_certfile, &config.ssl_keyfile) {
        (Some(cert), Some(key)) => (cert.clone(), key.clone()),
        _ => self_signed_pair(config)?,
    };

    Ok(RustlsConfig::from_pem_file(&cert, &key).await?)
}

fn self_signed_pair(config: &HubConfig) -> Result<(PathBuf, PathBuf), TlsError> {
    let certs_dir = config.certs_dir();
    let cert = certs_dir.join("cert.pem");
    let key = certs_dir.join("key.pem");

    if cert.exists() && key.exists() {
        info!("Using existing self-signed certificate at {}", cert.display());
        return Ok((cert, key));
    }

    warn!("No TLS material configured, generating a self-signed certificate");
    warn!("Browsers will warn about it; use a real certificate in production");

    fs::create_dir_all(&certs_dir)?;

    let subject_alt_names = vec![
        config.host.clone(),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ];

    let rcgen::CertifiedKey { cert: generated, key_pair } =
        rcgen::generate_simple_self_signed(subject_alt_names)?;

    fs::write(&cert, generated.pem())?;
    fs::write(&key, key_pair.serialize_pem())?;

    info!("Self-signed certificate written to {}", cert.display());

    Ok((cert, key))
}
