//! Nanoservice container.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, TLS, limits, request ID)
//!                          │
//!                          ▼
//!                     routing::Router ── lifecycle gate, loopback
//!                          │
//!                          ▼  longest mount, first matching route
//!                     plugin::Handler
//!
//!     deployment dir ──▶ deploy::trigger ──▶ deploy::DeploymentManager
//!                                               │ scan, diff, load units
//!                                               ▼
//!                                          Router::deploy / undeploy
//!
//!     operator ──▶ admin (status, mounts, suspend, resume, redeploy)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use nanoservice::admin::{setup_admin_router, AdminState};
use nanoservice::config::{self, resolve_location, ServiceConfig};
use nanoservice::deploy::{trigger, DeploymentManager};
use nanoservice::lifecycle::{listen_for_signals, ServiceLifecycle, Shutdown};
use nanoservice::observability::{logging, metrics};
use nanoservice::plugin::HandlerCatalog;
use nanoservice::routing::Router;
use nanoservice::NanoServer;

#[derive(Parser)]
#[command(name = "nanoservice")]
#[command(about = "Hot-deploying nanoservice container", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, conflicts_with = "properties")]
    config: Option<PathBuf>,

    /// Flat `nanoservice*` properties file.
    #[arg(short, long)]
    properties: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match (&cli.config, &cli.properties) {
        (Some(path), _) => config::load_config(path)?,
        (None, Some(path)) => config::load_properties(path)?,
        (None, None) => ServiceConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nanoservice starting");

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        tls = config.listener.tls.is_some(),
        service_root = %config.service_root,
        loopback = !config.disable_loopback,
        deployment_dir = %config.deployment.directory,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let lifecycle = Arc::new(ServiceLifecycle::new());
    let router = Arc::new(Router::new(lifecycle.clone()).with_loopback(!config.disable_loopback));

    let manager = match resolve_location(&config.deployment.directory) {
        Some(root) => {
            let manager = Arc::new(DeploymentManager::new(
                root,
                config.deployment.class_prefix.clone(),
                router.clone(),
                HandlerCatalog::with_builtins(),
            ));
            let initial = manager.clone();
            match tokio::task::spawn_blocking(move || initial.redeploy()).await? {
                Ok(net) => tracing::info!(net, "Initial deployment complete"),
                Err(e) => tracing::error!(error = %e, "Initial deployment failed"),
            }
            Some(manager)
        }
        None => {
            tracing::info!("No deployment directory configured, hot deployment disabled");
            None
        }
    };

    let triggers = match &manager {
        Some(manager) => trigger::spawn(
            manager.clone(),
            Duration::from_millis(config.deployment.period_ms),
            config.deployment.watch_events,
            &shutdown,
        ),
        None => Vec::new(),
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin listener started");
        let app = setup_admin_router(AdminState {
            router: router.clone(),
            manager: manager.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let stop = shutdown.wait();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
                tracing::error!(error = %e, "Admin listener failed");
            }
        });
    }

    tokio::spawn(listen_for_signals(shutdown.clone()));

    lifecycle.start()?;
    tracing::info!("Service started");

    let server = NanoServer::new(config, router.clone(), shutdown.clone());
    let result = server.run().await;

    // Stop accepting work even if the server exited on its own.
    shutdown.trigger();
    if let Err(e) = lifecycle.stop() {
        tracing::debug!(error = %e, "Lifecycle already stopped");
    }
    for handle in triggers {
        let _ = handle.await;
    }
    if let Some(manager) = manager {
        let removed = manager.undeploy_all();
        tracing::info!(removed, "Plugins undeployed");
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
