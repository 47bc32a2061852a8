//! Plugins shipped with the server.

use std::io::Write;
use std::sync::Arc;

use crate::plugin::{handler_fn, HandlerCatalog, HandlerError, Plugin, RouteDef, Verb};
use crate::routing::headers::ResponseSlot;

pub const ECHO_SYMBOL: &str = "nanoservice.builtin.EchoPlugin";
pub const STATUS_SYMBOL: &str = "nanoservice.builtin.StatusPlugin";

/// Register every builtin plugin under its symbol.
pub fn register(catalog: &mut HandlerCatalog) {
    catalog.register(ECHO_SYMBOL, || Arc::new(EchoPlugin::default()) as Arc<dyn Plugin>);
    catalog.register(STATUS_SYMBOL, || Arc::new(StatusPlugin::default()) as Arc<dyn Plugin>);
}

/// Echoes the request body for writes and the path tail for reads.
#[derive(Debug, Clone)]
pub struct EchoPlugin {
    mount: String,
}

impl Default for EchoPlugin {
    fn default() -> Self {
        Self { mount: "/echo".to_string() }
    }
}

impl EchoPlugin {
    pub fn at(mount: impl Into<String>) -> Self {
        Self { mount: mount.into() }
    }
}

impl Plugin for EchoPlugin {
    fn mount_path(&self) -> &str {
        &self.mount
    }

    fn routes(&self) -> Vec<RouteDef> {
        vec![
            RouteDef::get(
                "*",
                handler_fn(|call| {
                    let tail = call.path(0).unwrap_or_default().to_string();
                    call.write_all(tail.as_bytes())?;
                    Ok(200)
                }),
            )
            .method(Verb::Head)
            .produces(["text/plain"]),
            RouteDef::post(
                "*",
                handler_fn(|call| {
                    let body = call.body().clone();
                    call.write_all(&body)?;
                    Ok(200)
                }),
            )
            .method(Verb::Put)
            .produces(["application/octet-stream"]),
        ]
    }

    fn name(&self) -> &str {
        "EchoPlugin"
    }
}

/// Answers `GET /status/{code}` with the requested status code.
#[derive(Debug, Clone)]
pub struct StatusPlugin {
    mount: String,
}

impl Default for StatusPlugin {
    fn default() -> Self {
        Self { mount: "/status".to_string() }
    }
}

impl StatusPlugin {
    pub fn at(mount: impl Into<String>) -> Self {
        Self { mount: mount.into() }
    }
}

impl Plugin for StatusPlugin {
    fn mount_path(&self) -> &str {
        &self.mount
    }

    fn routes(&self) -> Vec<RouteDef> {
        vec![RouteDef::get(
            "{code}",
            handler_fn(|call| {
                let raw = call.path(0).unwrap_or_default().to_string();
                let code: u16 = raw
                    .parse()
                    .ok()
                    .filter(|c| (100..=599).contains(c))
                    .ok_or_else(|| HandlerError::bad_request(format!("Invalid status code [{raw}]")))?;

                if let Some(slot) = call.response_header(0) {
                    slot.push_str(&raw);
                }
                write!(call, "{code}")?;
                Ok(code)
            }),
        )
        .produces(["text/plain"])
        .response_header(ResponseSlot::text("x-requested-status"))]
    }

    fn name(&self) -> &str {
        "StatusPlugin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Call;
    use axum::body::Bytes;

    #[test]
    fn test_echo_routes() {
        let routes = EchoPlugin::default().routes();
        assert_eq!(routes.len(), 2);

        let mut call = Call::new(Verb::Post, Bytes::from_static(b"ping"));
        assert_eq!(routes[1].handler.handle(&mut call).unwrap(), 200);
        assert_eq!(call.response_body(), b"ping");

        let mut call = Call::new(Verb::Get, Bytes::new()).with_path_captures(vec![Some("a/b".into())]);
        assert_eq!(routes[0].handler.handle(&mut call).unwrap(), 200);
        assert_eq!(call.response_body(), b"a/b");
    }

    #[test]
    fn test_status_route() {
        let route = &StatusPlugin::default().routes()[0];

        let mut call = Call::new(Verb::Get, Bytes::new()).with_path_captures(vec![Some("418".into())]);
        assert_eq!(route.handler.handle(&mut call).unwrap(), 418);

        let mut call = Call::new(Verb::Get, Bytes::new()).with_path_captures(vec![Some("abc".into())]);
        assert!(matches!(
            route.handler.handle(&mut call),
            Err(HandlerError::Application { status: 400, .. })
        ));
    }
}
