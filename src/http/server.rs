//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with one catch-all handler
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Buffer each request and hand it to `Router::dispatch`
//! - Bind plain TCP or TLS and shut down gracefully

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::http::request::{ServiceRequest, UuidRequestId, X_REQUEST_ID};
use crate::http::response::ServiceResponse;
use crate::lifecycle::Shutdown;
use crate::net::{load_tls_config, TlsError};
use crate::routing::Router as ServiceRouter;

const SERVER_NAME: &str = concat!("nanoservice/", env!("CARGO_PKG_VERSION"));
const GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid listen address [{0}]")]
    Address(String),

    #[error("Failed to bind [{address}]: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ServiceRouter>,
    pub max_body_bytes: usize,
}

/// HTTP front end of the service router.
pub struct NanoServer {
    app: Router,
    config: ServiceConfig,
    shutdown: Shutdown,
}

impl NanoServer {
    pub fn new(config: ServiceConfig, router: Arc<ServiceRouter>, shutdown: Shutdown) -> Self {
        let state = AppState {
            router,
            max_body_bytes: config.limits.max_body_bytes,
        };
        let app = Self::build_router(&config, state);
        Self { app, config, shutdown }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.limits.request_timeout_secs)))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static(SERVER_NAME),
            ))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, UuidRequestId))
    }

    /// The fully layered router, for in-process use.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.config.listener.bind_address();
        match self.config.listener.tls.clone() {
            Some(tls) => {
                let addr: SocketAddr = address
                    .parse()
                    .map_err(|_| ServerError::Address(address.clone()))?;
                let rustls = load_tls_config(&tls).await?;

                let handle = axum_server::Handle::new();
                let stopper = handle.clone();
                let wait = self.shutdown.wait();
                tokio::spawn(async move {
                    wait.await;
                    stopper.graceful_shutdown(Some(GRACE_PERIOD));
                });

                tracing::info!(address = %addr, tls = true, "HTTP server starting");
                axum_server::bind_rustls(addr, rustls)
                    .handle(handle)
                    .serve(self.app.into_make_service())
                    .await?;
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            None => {
                let listener = TcpListener::bind(&address)
                    .await
                    .map_err(|source| ServerError::Bind { address, source })?;
                self.serve(listener).await
            }
        }
    }

    /// Serve plain HTTP on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = false, "HTTP server starting");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(self.shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// Catch-all handler: buffer, dispatch on the blocking pool, convert.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Failed to read request body");
            return ServiceResponse::fail(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                .into_response();
        }
    };

    let request = ServiceRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };
    let request_id = request.request_id().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %request.method,
        path = %request.path,
        "Dispatching request"
    );

    let router = state.router.clone();
    match tokio::task::spawn_blocking(move || router.dispatch(&request)).await {
        Ok(Ok(response)) => response.into_response(),
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch failed");
            ServiceResponse::fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Handler panicked");
            ServiceResponse::fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ServiceLifecycle;
    use crate::plugin::builtin::EchoPlugin;
    use tower::ServiceExt;

    fn app() -> Router {
        let lifecycle = Arc::new(ServiceLifecycle::new());
        lifecycle.start().unwrap();
        let router = Arc::new(ServiceRouter::new(lifecycle));
        router.deploy("/echo", Arc::new(EchoPlugin::at("/echo"))).unwrap();
        NanoServer::new(ServiceConfig::default(), router, Shutdown::new()).app()
    }

    #[tokio::test]
    async fn test_dispatch_through_axum() {
        let response = app()
            .oneshot(Request::get("/echo/hello/world").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(response.headers()[header::SERVER], SERVER_NAME);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello/world");
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let response = app()
            .oneshot(
                Request::get("/nowhere")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let lifecycle = Arc::new(ServiceLifecycle::new());
        lifecycle.start().unwrap();
        let router = Arc::new(ServiceRouter::new(lifecycle));
        router.deploy("/echo", Arc::new(EchoPlugin::at("/echo"))).unwrap();
        let mut config = ServiceConfig::default();
        config.limits.max_body_bytes = 4;
        let app = NanoServer::new(config, router, Shutdown::new()).app();

        let response = app
            .oneshot(Request::post("/echo/x").body(Body::from("too long")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
