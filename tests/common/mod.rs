//! Shared utilities for integration tests.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use tower::ServiceExt;

use nanoservice::config::ServiceConfig;
use nanoservice::deploy::DeploymentManager;
use nanoservice::lifecycle::{ServiceLifecycle, Shutdown};
use nanoservice::plugin::HandlerCatalog;
use nanoservice::routing::Router;
use nanoservice::NanoServer;

/// A router, its lifecycle and the axum app in front of them.
pub struct Harness {
    pub lifecycle: Arc<ServiceLifecycle>,
    pub router: Arc<Router>,
    pub app: axum::Router,
}

impl Harness {
    /// Started service with loopback enabled.
    pub fn started() -> Self {
        let harness = Self::stopped(ServiceConfig::default());
        harness.lifecycle.start().unwrap();
        harness
    }

    pub fn stopped(config: ServiceConfig) -> Self {
        let lifecycle = Arc::new(ServiceLifecycle::new());
        let router = Arc::new(Router::new(lifecycle.clone()).with_loopback(!config.disable_loopback));
        let app = NanoServer::new(config, router.clone(), Shutdown::new()).app();
        Self { lifecycle, router, app }
    }

    /// Deployment manager over `root` feeding this harness's router.
    #[allow(dead_code)]
    pub fn manager(&self, root: &Path, class_prefix: &str) -> DeploymentManager {
        DeploymentManager::new(root, class_prefix, self.router.clone(), HandlerCatalog::with_builtins())
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    #[allow(dead_code)]
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[allow(dead_code)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Write `text` to `dir/name` and pin its modification time.
#[allow(dead_code)]
pub fn write_unit(dir: &Path, name: &str, text: &str, secs: u64) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, text).unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// A self-declared unit answering every GET under `mount` with `body`.
#[allow(dead_code)]
pub fn simple_unit(mount: &str, body: &str) -> String {
    format!("mount = \"{mount}\"\n\n[[route]]\npattern = \"*\"\nproduces = [\"text/plain\"]\nbody = \"{body}\"\n")
}
