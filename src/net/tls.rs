//! TLS key material loading.
//!
//! The keystore is one PEM file with the certificate chain followed by the
//! private key. A truststore, when configured, is a PEM bundle of CA
//! certificates; it is checked for readability and parsed, but client
//! certificates are not requested.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::{resolve_location, TlsConfig};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS file [{0}] is not a file URI or path")]
    Location(String),

    #[error("Failed to read TLS file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported {store} type [{kind}], only PEM is supported")]
    UnsupportedType { store: &'static str, kind: String },

    #[error("{0:?} contains no certificates")]
    NoCertificates(PathBuf),

    #[error("{0:?} contains no private key")]
    NoPrivateKey(PathBuf),

    #[error("Failed to build TLS configuration: {0}")]
    Config(#[source] std::io::Error),
}

/// Parsed key material, ready for the listener.
#[derive(Debug)]
pub struct KeyMaterial {
    pub keystore: PathBuf,
    pub pem: Vec<u8>,
    pub certificates: usize,
    pub trusted_roots: usize,
}

/// Read and check the keystore and truststore named by `config`.
pub fn load_key_material(config: &TlsConfig) -> Result<KeyMaterial, TlsError> {
    check_type("keystore", &config.keystore_type)?;
    let keystore = locate(&config.keystore)?;
    let pem = read(&keystore)?;

    let certificates = count_certificates(&keystore, &pem)?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(pem.as_slice())).map_err(|source| TlsError::Read {
        path: keystore.clone(),
        source,
    })?;
    if key.is_none() {
        return Err(TlsError::NoPrivateKey(keystore));
    }
    if config.keystore_password.is_some() {
        tracing::warn!(path = ?keystore, "Keystore password ignored, PEM keys must be unencrypted");
    }

    let trusted_roots = match &config.truststore {
        Some(truststore) => {
            check_type("truststore", &config.truststore_type)?;
            let path = locate(truststore)?;
            let bundle = read(&path)?;
            count_certificates(&path, &bundle)?
        }
        None => 0,
    };

    Ok(KeyMaterial {
        keystore,
        pem,
        certificates,
        trusted_roots,
    })
}

/// Load TLS configuration for the listener.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let material = load_key_material(config)?;
    tracing::info!(
        keystore = ?material.keystore,
        certificates = material.certificates,
        trusted_roots = material.trusted_roots,
        "TLS key material loaded"
    );
    RustlsConfig::from_pem(material.pem.clone(), material.pem)
        .await
        .map_err(TlsError::Config)
}

fn check_type(store: &'static str, kind: &str) -> Result<(), TlsError> {
    if kind.eq_ignore_ascii_case("PEM") {
        Ok(())
    } else {
        Err(TlsError::UnsupportedType {
            store,
            kind: kind.to_string(),
        })
    }
}

fn locate(value: &str) -> Result<PathBuf, TlsError> {
    resolve_location(value).ok_or_else(|| TlsError::Location(value.to_string()))
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn count_certificates(path: &Path, pem: &[u8]) -> Result<usize, TlsError> {
    let mut count = 0;
    for cert in rustls_pemfile::certs(&mut BufReader::new(pem)) {
        cert.map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        count += 1;
    }
    if count == 0 {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(count)
}
