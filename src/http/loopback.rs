//! Diagnostic loopback page.
//!
//! Reflects the request back as an HTML table (method, path, query, headers)
//! followed by the active mounts. Reachable regardless of lifecycle state
//! unless disabled in configuration.

use std::fmt::Write;

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};

use crate::http::request::ServiceRequest;
use crate::http::response::ServiceResponse;

pub const LOOPBACK_PATH: &str = "/loopback";

/// Whether `path` addresses the loopback page.
pub fn is_loopback(path: &str) -> bool {
    path == LOOPBACK_PATH
        || path
            .strip_prefix(LOOPBACK_PATH)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Render the loopback page for `request`.
pub fn render(request: &ServiceRequest, mounts: &[String]) -> ServiceResponse {
    let mut html = String::with_capacity(1024);
    html.push_str("<!DOCTYPE html>\n<html><head><title>Loopback</title></head><body>\n");
    html.push_str("<table border=\"1\">\n");
    row(&mut html, "Method", request.method.as_str());
    row(&mut html, "Path", &request.path);
    row(&mut html, "Query", request.query.as_deref().unwrap_or(""));
    for (name, value) in &request.headers {
        row(&mut html, name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }
    html.push_str("</table>\n<h3>Mounts</h3>\n<ul>\n");
    for mount in mounts {
        let _ = writeln!(html, "<li>{}</li>", escape(mount));
    }
    html.push_str("</ul>\n</body></html>\n");

    let mut response = ServiceResponse::new(StatusCode::OK);
    response.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response.set_body(Bytes::from(html));
    response
}

fn row(html: &mut String, key: &str, value: &str) {
    let _ = writeln!(html, "<tr><td>{}</td><td>{}</td></tr>", escape(key), escape(value));
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
