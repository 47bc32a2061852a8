//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that directories and key material exist
//! - Validate value ranges (port, limits, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use url::Url;

use crate::config::schema::{ServiceConfig, TlsConfig};
use crate::observability::logging;

/// One failed check, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Resolve a `file://` URI or plain path to a filesystem path.
pub fn resolve_location(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        return None;
    }
    match Url::parse(value) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => None,
        _ => Some(PathBuf::from(value)),
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be between 1 and 65535"));
    }
    if config.listener.bind_address().parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_host",
            format!("[{}] is not a valid IP address", config.listener.bind_host),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        validate_tls(tls, &mut errors);
    }

    match resolve_location(&config.service_root) {
        Some(path) if path.is_dir() => {}
        Some(path) => errors.push(ValidationError::new(
            "service_root",
            format!("[{}] is not a directory", path.display()),
        )),
        None => errors.push(ValidationError::new(
            "service_root",
            format!("[{}] is not a file URI or path", config.service_root),
        )),
    }

    if !config.deployment.directory.is_empty() {
        match resolve_location(&config.deployment.directory) {
            Some(path) if path.is_dir() => {}
            Some(path) => errors.push(ValidationError::new(
                "deployment.directory",
                format!("[{}] is not a directory", path.display()),
            )),
            None => errors.push(ValidationError::new(
                "deployment.directory",
                format!("[{}] is not a file URI or path", config.deployment.directory),
            )),
        }
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than zero"));
    }
    if config.limits.request_timeout_secs == 0 {
        errors.push(ValidationError::new("limits.request_timeout_secs", "must be greater than zero"));
    }

    if tracing_subscriber::EnvFilter::try_new(logging::default_directive(&config.observability.log_level)).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("[{}] is not a valid level", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("[{}] is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("[{}] is not a socket address", config.admin.bind_address),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tls(tls: &TlsConfig, errors: &mut Vec<ValidationError>) {
    if !tls.keystore_type.eq_ignore_ascii_case("PEM") {
        errors.push(ValidationError::new(
            "listener.tls.keystore_type",
            format!("unsupported keystore type [{}]", tls.keystore_type),
        ));
    }
    check_file("listener.tls.keystore", &tls.keystore, errors);

    if let Some(truststore) = &tls.truststore {
        if !tls.truststore_type.eq_ignore_ascii_case("PEM") {
            errors.push(ValidationError::new(
                "listener.tls.truststore_type",
                format!("unsupported truststore type [{}]", tls.truststore_type),
            ));
        }
        check_file("listener.tls.truststore", truststore, errors);
    }
}

fn check_file(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    match resolve_location(value) {
        Some(path) if Path::new(&path).is_file() => {}
        _ => errors.push(ValidationError::new(field, format!("[{value}] is not a readable file"))),
    }
}
