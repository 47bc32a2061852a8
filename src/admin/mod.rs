//! Operator endpoints on a separate listener.
//!
//! # Design Decisions
//! - Every route sits behind the bearer-key middleware
//! - Lifecycle transitions that are not allowed answer 409
//! - `POST /admin/redeploy` is the manual trigger when the timer is off

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::deploy::DeploymentManager;
use crate::routing::Router as ServiceRouter;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub router: Arc<ServiceRouter>,
    pub manager: Option<Arc<DeploymentManager>>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/mounts", get(get_mounts))
        .route("/admin/suspend", post(suspend))
        .route("/admin/resume", post(resume))
        .route("/admin/redeploy", post(redeploy))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ServiceLifecycle;
    use crate::plugin::HandlerCatalog;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const KEY: &str = "secret";

    fn state(manager: bool) -> (AdminState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = Arc::new(ServiceLifecycle::new());
        lifecycle.start().unwrap();
        let router = Arc::new(ServiceRouter::new(lifecycle));
        let manager = manager.then(|| {
            Arc::new(DeploymentManager::new(
                dir.path(),
                "",
                router.clone(),
                HandlerCatalog::with_builtins(),
            ))
        });
        let state = AdminState {
            router,
            manager,
            api_key: Arc::from(KEY),
        };
        (state, dir)
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let (state, _dir) = state(false);
        let app = setup_admin_router(state);

        let missing = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app.clone().oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app.oneshot(request("GET", "/admin/status", Some(KEY))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json(ok).await["state"], "running");
    }

    #[tokio::test]
    async fn test_suspend_resume_conflicts() {
        let (state, _dir) = state(false);
        let app = setup_admin_router(state);

        let first = app.clone().oneshot(request("POST", "/admin/suspend", Some(KEY))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(json(first).await["state"], "suspended");

        let again = app.clone().oneshot(request("POST", "/admin/suspend", Some(KEY))).await.unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let resumed = app.oneshot(request("POST", "/admin/resume", Some(KEY))).await.unwrap();
        assert_eq!(json(resumed).await["state"], "running");
    }

    #[tokio::test]
    async fn test_redeploy_reports_net_change() {
        let (state, dir) = state(true);
        std::fs::write(
            dir.path().join("Hello.unit"),
            "mount = \"/hello\"\n[[route]]\npattern = \"*\"\nbody = \"hi\"\n",
        )
        .unwrap();
        let app = setup_admin_router(state);

        let response = app.clone().oneshot(request("POST", "/admin/redeploy", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["net"], 1);
        assert_eq!(body["deployed"][0], "/hello");

        let mounts = json(app.oneshot(request("GET", "/admin/mounts", Some(KEY))).await.unwrap()).await;
        assert_eq!(mounts[0]["mount"], "/hello");
    }

    #[tokio::test]
    async fn test_redeploy_without_manager() {
        let (state, _dir) = state(false);
        let response = setup_admin_router(state)
            .oneshot(request("POST", "/admin/redeploy", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
