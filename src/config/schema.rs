//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the nanoservice container.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (host, port, TLS).
    pub listener: ListenerConfig,

    /// Service root directory (URI or path). Validated and reported only.
    pub service_root: String,

    /// Turn off the built-in `/loopback` diagnostic.
    pub disable_loopback: bool,

    /// Hot deployment settings.
    pub deployment: DeploymentConfig,

    /// Request limits enforced by the transport.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operator endpoints.
    pub admin: AdminConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            service_root: ".".to_string(),
            disable_loopback: false,
            deployment: DeploymentConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// TCP port.
    pub port: u16,

    /// Optional TLS configuration. Present means TLS is on.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
        }
    }
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// TLS key material for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Keystore holding the certificate chain and private key.
    pub keystore: String,

    /// Keystore format. Only "PEM" is supported.
    #[serde(default = "default_store_type")]
    pub keystore_type: String,

    #[serde(default)]
    pub keystore_password: Option<String>,

    /// Optional CA bundle for peer verification.
    #[serde(default)]
    pub truststore: Option<String>,

    #[serde(default = "default_store_type")]
    pub truststore_type: String,

    #[serde(default)]
    pub truststore_password: Option<String>,
}

fn default_store_type() -> String {
    "PEM".to_string()
}

/// Deployment directory and cycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Deployment root (URI or path). Empty disables hot deployment.
    pub directory: String,

    /// Scan period in milliseconds. Zero (the default) leaves cycles to manual triggers.
    pub period_ms: u64,

    /// Prefix applied to bare unit symbols.
    pub class_prefix: String,

    /// Trigger cycles on filesystem events as well.
    pub watch_events: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            period_ms: 0,
            class_prefix: String::new(),
            watch_events: false,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted request body.
    pub max_body_bytes: usize,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 4 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin listener bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("service_root = \"/srv\"").unwrap();
        assert_eq!(config.service_root, "/srv");
        assert_eq!(config.listener.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.deployment.period_ms, 0);
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_tls_store_types_default_to_pem() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [listener]
            port = 8443
            [listener.tls]
            keystore = "server.pem"
            "#,
        )
        .unwrap();
        let tls = config.listener.tls.unwrap();
        assert_eq!(tls.keystore_type, "PEM");
        assert_eq!(tls.truststore_type, "PEM");
        assert!(tls.truststore.is_none());
    }
}
