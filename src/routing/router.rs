//! Route table and per-request dispatch.
//!
//! # Responsibilities
//! - Hold the mount → descriptors table and replace it atomically on
//!   deploy/undeploy
//! - Resolve the longest matching mount for a request path
//! - Pick the first matching descriptor and run its handler
//! - Shape the response: status mapping, headers, content encoding, HEAD
//!
//! # Design Decisions
//! - Copy-on-write table behind `ArcSwap`: dispatch never takes a lock, and
//!   in-flight calls keep the table snapshot they started with
//! - Writers serialize on a mutex; compilation happens before the swap so a
//!   failing route leaves the table untouched
//! - First match wins in registration order; no specificity ranking
//! - O(n) mount scan, longest first (acceptable for typical mount counts)

use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};

use crate::http::encoding::CodecRegistry;
use crate::http::loopback;
use crate::http::request::ServiceRequest;
use crate::http::response::ServiceResponse;
use crate::lifecycle::ServiceLifecycle;
use crate::observability::metrics;
use crate::plugin::{Call, HandlerError, Plugin, Verb};
use crate::routing::cache::MatcherCache;
use crate::routing::descriptor::MethodDescriptor;
use crate::routing::error::{DispatchError, RouterError};
use crate::routing::mime::{self, MediaType};

const UNSUCCESSFUL: &str = "Unsuccessful processing your request";

/// One deployed plugin and its compiled routes.
struct Mount {
    path: String,
    plugin: Arc<dyn Plugin>,
    descriptors: Vec<Arc<MethodDescriptor>>,
}

/// Immutable snapshot of every mount, longest path first.
#[derive(Default)]
struct RouteTable {
    mounts: Vec<Arc<Mount>>,
}

impl RouteTable {
    fn find(&self, mount: &str) -> Option<&Arc<Mount>> {
        self.mounts.iter().find(|m| m.path == mount)
    }

    /// Longest mount covering `path`, with the remaining path (no leading `/`).
    fn resolve<'a>(&self, path: &'a str) -> Option<(&Arc<Mount>, &'a str)> {
        self.mounts.iter().find_map(|mount| {
            if mount.path == "/" {
                return Some((mount, path.strip_prefix('/').unwrap_or(path)));
            }
            let rest = path.strip_prefix(mount.path.as_str())?;
            if rest.is_empty() {
                Some((mount, rest))
            } else {
                rest.strip_prefix('/').map(|tail| (mount, tail))
            }
        })
    }
}

/// The service router.
pub struct Router {
    table: ArcSwap<RouteTable>,
    write_lock: Mutex<()>,
    cache: MatcherCache,
    lifecycle: Arc<ServiceLifecycle>,
    codecs: CodecRegistry,
    loopback_enabled: bool,
}

impl Router {
    pub fn new(lifecycle: Arc<ServiceLifecycle>) -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
            write_lock: Mutex::new(()),
            cache: MatcherCache::new(),
            lifecycle,
            codecs: CodecRegistry::default(),
            loopback_enabled: true,
        }
    }

    pub fn with_loopback(mut self, enabled: bool) -> Self {
        self.loopback_enabled = enabled;
        self
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn lifecycle(&self) -> &Arc<ServiceLifecycle> {
        &self.lifecycle
    }

    /// Register every route of `plugin` under `mount`.
    ///
    /// All routes are compiled before anything becomes visible; any failure
    /// leaves the table as it was.
    pub fn deploy(&self, mount: &str, plugin: Arc<dyn Plugin>) -> Result<(), RouterError> {
        let mount = normalize_mount(mount)?;

        let descriptors = match plugin
            .routes()
            .iter()
            .map(|route| MethodDescriptor::compile(&mount, route, &self.cache).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(descriptors) => descriptors,
            Err(e) => {
                self.cache.evict_unused();
                return Err(e);
            }
        };

        let _guard = self.lock();
        let current = self.table.load_full();
        if current.find(&mount).is_some() {
            drop(descriptors);
            self.cache.evict_unused();
            return Err(RouterError::AlreadyDeployed(mount));
        }

        let mut mounts = current.mounts.clone();
        mounts.push(Arc::new(Mount {
            path: mount.clone(),
            plugin: plugin.clone(),
            descriptors,
        }));
        mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then_with(|| a.path.cmp(&b.path)));

        let count = mounts.len();
        self.table.store(Arc::new(RouteTable { mounts }));
        metrics::set_mounts(count);

        tracing::info!(mount = %mount, plugin = plugin.name(), "Plugin deployed");
        Ok(())
    }

    /// Remove the plugin mounted at `mount` and return it.
    ///
    /// Requests already dispatched to it run to completion. Matchers no other
    /// mount shares are released from the cache once nothing holds them.
    pub fn undeploy(&self, mount: &str) -> Result<Arc<dyn Plugin>, RouterError> {
        let mount = normalize_mount(mount)?;

        let _guard = self.lock();
        let removed = {
            let current = self.table.load_full();
            let removed = current
                .find(&mount)
                .cloned()
                .ok_or_else(|| RouterError::NotDeployed(mount.clone()))?;

            let mounts: Vec<_> = current
                .mounts
                .iter()
                .filter(|m| m.path != mount)
                .cloned()
                .collect();

            let count = mounts.len();
            self.table.store(Arc::new(RouteTable { mounts }));
            metrics::set_mounts(count);
            removed
        };

        let plugin = removed.plugin.clone();
        tracing::info!(mount = %mount, plugin = plugin.name(), "Plugin undeployed");

        // In-flight calls may still hold the old descriptors; whatever they
        // keep alive is collected by a later undeploy.
        drop(removed);
        let evicted = self.cache.evict_unused();
        tracing::debug!(mount = %mount, evicted, "Released unused matchers");

        Ok(plugin)
    }

    /// Active mount paths, longest first.
    pub fn mounts(&self) -> Vec<String> {
        self.table.load().mounts.iter().map(|m| m.path.clone()).collect()
    }

    /// Active mounts with the plugin name and route count.
    pub fn describe(&self) -> Vec<MountInfo> {
        self.table
            .load()
            .mounts
            .iter()
            .map(|m| MountInfo {
                mount: m.path.clone(),
                plugin: m.plugin.name().to_string(),
                routes: m.descriptors.len(),
            })
            .collect()
    }

    pub fn is_deployed(&self, mount: &str) -> bool {
        normalize_mount(mount)
            .map(|m| self.table.load().find(&m).is_some())
            .unwrap_or(false)
    }

    /// Serve one request.
    ///
    /// Every routing outcome is a response. Only I/O failures raised by the
    /// handler come back as `Err`.
    pub fn dispatch(&self, request: &ServiceRequest) -> Result<ServiceResponse, DispatchError> {
        let start = Instant::now();
        let result = self.dispatch_inner(request);

        match &result {
            Ok(response) => {
                metrics::record_request(Verb::from_method(&request.method), response.status.as_u16(), start);
            }
            Err(e) => {
                tracing::error!(request_id = %request.request_id(), error = %e, "Dispatch failed");
                metrics::record_request(Verb::from_method(&request.method), 500, start);
            }
        }

        result.map(|mut response| {
            if request.method == Method::HEAD {
                response.strip_body();
            }
            response
        })
    }

    fn dispatch_inner(&self, request: &ServiceRequest) -> Result<ServiceResponse, DispatchError> {
        let request_id = request.request_id();

        if self.loopback_enabled
            && loopback::is_loopback(&request.path)
            && (request.method == Method::GET || request.method == Method::HEAD)
        {
            return Ok(loopback::render(request, &self.mounts()));
        }

        if !self.lifecycle.is_started() {
            return Ok(ServiceResponse::fail(StatusCode::SERVICE_UNAVAILABLE, "Service is not running"));
        }
        if self.lifecycle.is_suspended() {
            return Ok(ServiceResponse::fail(StatusCode::SERVICE_UNAVAILABLE, "Service paused by operator"));
        }

        let Some(verb) = Verb::from_method(&request.method) else {
            return Ok(ServiceResponse::fail(
                StatusCode::METHOD_NOT_ALLOWED,
                &format!("Method [{}] is not supported", request.method),
            ));
        };

        let table = self.table.load_full();
        let Some((mount, remaining)) = table.resolve(&request.path) else {
            tracing::debug!(request_id = %request_id, path = %request.path, "No mount matched");
            return Ok(not_found(&request.path));
        };

        let content_type = header_text(&request.headers, header::CONTENT_TYPE)
            .and_then(|value| value.parse::<MediaType>().ok());
        let accept = mime::parse_accept(header_text(&request.headers, header::ACCEPT).as_deref());

        let matched = mount.descriptors.iter().find_map(|descriptor| {
            descriptor
                .try_match(verb, remaining, content_type.as_ref(), &accept)
                .map(|captures| (descriptor.clone(), captures))
        });
        let Some((descriptor, captures)) = matched else {
            tracing::debug!(
                request_id = %request_id,
                mount = %mount.path,
                path = %request.path,
                "No route matched"
            );
            return Ok(not_found(&request.path));
        };
        drop(table);

        tracing::debug!(
            request_id = %request_id,
            verb = %verb,
            pattern = descriptor.pattern(),
            "Route matched"
        );

        let content_encoding = request
            .headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let body = match self.codecs.decode(content_encoding, &request.body) {
            Ok(decoded) => Bytes::from(decoded),
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to decode request body");
                return Ok(ServiceResponse::fail(StatusCode::BAD_REQUEST, "Malformed request body"));
            }
        };

        let scratch = descriptor
            .response_writer()
            .map(|writer| writer.prepare())
            .unwrap_or_default();

        let mut call = Call::new(verb, body)
            .with_path_captures(captures)
            .with_query_captures(descriptor.query_captures(request.query.as_deref()))
            .with_header_captures(descriptor.header_captures(&request.headers))
            .with_scratch(scratch);

        let status = match descriptor.handler().handle(&mut call) {
            Ok(status) => status,
            Err(HandlerError::Application { status, message }) => {
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                tracing::warn!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    error = %message,
                    "Handler reported failure"
                );
                return Ok(ServiceResponse::fail(status, &message));
            }
            Err(HandlerError::Io(source)) => {
                return Err(DispatchError::Io {
                    path: request.path.clone(),
                    source,
                });
            }
        };

        let status = match StatusCode::from_u16(status) {
            Ok(status) if status.is_success() => status,
            Ok(status) => return Ok(ServiceResponse::fail(status, UNSUCCESSFUL)),
            Err(_) => {
                tracing::error!(request_id = %request_id, status, "Handler returned an invalid status code");
                return Ok(ServiceResponse::fail(StatusCode::INTERNAL_SERVER_ERROR, UNSUCCESSFUL));
            }
        };

        let (body, content_type_override, scratch) = call.into_output();
        let mut response = ServiceResponse::new(status);

        if let Some(writer) = descriptor.response_writer() {
            if let Err(e) = writer.commit(&mut response.headers, &scratch) {
                tracing::error!(request_id = %request_id, error = %e, "Handler produced an invalid header value");
                return Ok(ServiceResponse::fail(StatusCode::INTERNAL_SERVER_ERROR, UNSUCCESSFUL));
            }
        }

        let content_type = content_type_override.or_else(|| descriptor.default_content_type().map(ToString::to_string));
        if let Some(value) = content_type.and_then(|v| HeaderValue::from_str(&v).ok()) {
            response.headers.insert(header::CONTENT_TYPE, value);
        }

        let negotiated = self.codecs.negotiate(
            request
                .headers
                .get_all(header::ACCEPT_ENCODING)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        let encoded = negotiated.encode(body).map_err(|source| DispatchError::Io {
            path: request.path.clone(),
            source,
        })?;
        response
            .headers
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static(negotiated.name()));
        response.set_body(Bytes::from(encoded));

        Ok(response)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Introspection record for one mount.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MountInfo {
    pub mount: String,
    pub plugin: String,
    pub routes: usize,
}

/// Canonical mount form: leading `/`, no trailing `/` (except root).
pub fn normalize_mount(mount: &str) -> Result<String, RouterError> {
    let trimmed = mount.trim();
    if trimmed.is_empty() {
        return Err(RouterError::EmptyMount);
    }
    let body = trimmed.trim_matches('/');
    Ok(format!("/{body}"))
}

/// All values of `name`, comma-joined.
fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

fn not_found(path: &str) -> ServiceResponse {
    ServiceResponse::fail(StatusCode::NOT_FOUND, &format!("No handler found for [{path}]"))
}
