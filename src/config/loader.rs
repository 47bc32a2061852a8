//! Configuration loading from disk or from flat properties.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::schema::{ServiceConfig, TlsConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ServiceConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub const PORT: &str = "nanoservicePort";
pub const ROOT: &str = "nanoserviceRoot";
pub const DISABLE_LOOPBACK: &str = "nanoserviceDisableLoopback";
pub const USE_SSL: &str = "nanoserviceUseSSL";
pub const SSL_KEYSTORE: &str = "nanoserviceSSLKeyStore";
pub const SSL_KEYSTORE_TYPE: &str = "nanoserviceSSLKeyStoreType";
pub const SSL_KEYSTORE_PASSWD: &str = "nanoserviceSSLKeyStorePasswd";
pub const SSL_TRUSTSTORE: &str = "nanoserviceSSLTrustStore";
pub const SSL_TRUSTSTORE_TYPE: &str = "nanoserviceSSLTrustStoreType";
pub const SSL_TRUSTSTORE_PASSWD: &str = "nanoserviceSSLTrustStorePasswd";
pub const DEPLOYMENT_DIR: &str = "nanoserviceDeploymentDir";
pub const DEPLOYMENT_PERIOD: &str = "nanoserviceDeploymentPeriod";
pub const DEPLOYMENT_CLASS_PREFIX: &str = "nanoserviceDeploymentClassPrefix";

/// Build configuration from the flat string-keyed property form.
///
/// Missing mandatory keys are reported together, and unparseable values are
/// reported alongside them. The result then goes through the same
/// validation as a TOML file.
pub fn from_properties(properties: &HashMap<String, String>) -> Result<ServiceConfig, ConfigError> {
    let mut errors = Vec::new();
    let mut config = ServiceConfig::default();

    let get = |key: &str| properties.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    match get(PORT) {
        Some(value) => match value.parse::<u16>() {
            Ok(port) => config.listener.port = port,
            Err(_) => errors.push(property_error(PORT, format!("[{value}] is not a port number"))),
        },
        None => errors.push(property_error(PORT, "is mandatory")),
    }
    match get(ROOT) {
        Some(value) => config.service_root = value.to_string(),
        None => errors.push(property_error(ROOT, "is mandatory")),
    }

    if let Some(value) = get(DISABLE_LOOPBACK) {
        config.disable_loopback = parse_flag(value);
    }

    if get(USE_SSL).map(parse_flag).unwrap_or(false) {
        match get(SSL_KEYSTORE) {
            Some(keystore) => {
                config.listener.tls = Some(TlsConfig {
                    keystore: keystore.to_string(),
                    keystore_type: get(SSL_KEYSTORE_TYPE).unwrap_or("PEM").to_string(),
                    keystore_password: get(SSL_KEYSTORE_PASSWD).map(str::to_string),
                    truststore: get(SSL_TRUSTSTORE).map(str::to_string),
                    truststore_type: get(SSL_TRUSTSTORE_TYPE).unwrap_or("PEM").to_string(),
                    truststore_password: get(SSL_TRUSTSTORE_PASSWD).map(str::to_string),
                });
            }
            None => errors.push(property_error(SSL_KEYSTORE, "is mandatory when SSL is enabled")),
        }
    }

    if let Some(value) = get(DEPLOYMENT_DIR) {
        config.deployment.directory = value.to_string();
    }
    if let Some(value) = get(DEPLOYMENT_PERIOD) {
        match value.parse::<u64>() {
            Ok(period) => config.deployment.period_ms = period,
            Err(_) => errors.push(property_error(
                DEPLOYMENT_PERIOD,
                format!("[{value}] is not a number of milliseconds"),
            )),
        }
    }
    if let Some(value) = get(DEPLOYMENT_CLASS_PREFIX) {
        config.deployment.class_prefix = value.to_string();
    }

    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse `key=value` (or `key: value`) lines. `#` and `!` start comments.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}

/// Load and validate configuration from a properties file.
pub fn load_properties(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    from_properties(&parse_properties(&content))
}

fn property_error(key: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: key.to_string(),
        message: message.into(),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_missing_mandatory_keys_reported_together() {
        let err = from_properties(&props(&[(DEPLOYMENT_PERIOD, "100")])).unwrap_err();
        let ConfigError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec![PORT, ROOT]);
    }

    #[test]
    fn test_properties_map_onto_sections() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let config = from_properties(&props(&[
            (PORT, "9000"),
            (ROOT, &root),
            (DISABLE_LOOPBACK, "true"),
            (DEPLOYMENT_DIR, &root),
            (DEPLOYMENT_PERIOD, "0"),
            (DEPLOYMENT_CLASS_PREFIX, "com.acme"),
        ]))
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert!(config.disable_loopback);
        assert_eq!(config.deployment.period_ms, 0);
        assert_eq!(config.deployment.class_prefix, "com.acme");
        assert!(config.listener.tls.is_none());
    }

    #[test]
    fn test_absent_period_means_manual_trigger_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let config = from_properties(&props(&[(PORT, "9000"), (ROOT, &root), (DEPLOYMENT_DIR, &root)])).unwrap();

        assert_eq!(config.deployment.directory, root);
        assert_eq!(config.deployment.period_ms, 0);
    }

    #[test]
    fn test_ssl_requires_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let err = from_properties(&props(&[(PORT, "9000"), (ROOT, &root), (USE_SSL, "true")])).unwrap_err();
        assert!(err.to_string().contains(SSL_KEYSTORE));
    }

    #[test]
    fn test_bad_port_is_a_validation_error() {
        let err = from_properties(&props(&[(PORT, "http"), (ROOT, "/")])).unwrap_err();
        assert!(err.to_string().starts_with("Validation failed: nanoservicePort"));
    }

    #[test]
    fn test_parse_properties() {
        let parsed = parse_properties(
            "# comment\n! also comment\nnanoservicePort = 8080\nnanoserviceRoot: file:///srv\n\nbroken line\n",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[PORT], "8080");
        assert_eq!(parsed[ROOT], "file:///srv");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nanoservice.toml");
        fs::write(
            &path,
            format!("service_root = {:?}\n[listener]\nport = 7070\n", dir.path().display().to_string()),
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.port, 7070);
    }

    #[test]
    fn test_load_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[listener\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}
