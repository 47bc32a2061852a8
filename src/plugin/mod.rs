//! Handler and plugin contracts.
//!
//! # Data Flow
//! ```text
//! Plugin (mount path + RouteDefs)
//!     → Router::deploy compiles each RouteDef into a MethodDescriptor
//!     → dispatch builds a Call from the matched captures and body
//!     → Handler::handle(&mut Call) → status code
//!     → Call body sink + response scratch become the response
//! ```
//!
//! # Design Decisions
//! - Handlers are synchronous; the transport runs them on the blocking pool
//! - Captures are positional `Option<String>` slots owned by the call
//! - Closures are handlers, so small plugins need no extra types

pub mod builtin;
pub mod catalog;

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Method;
use thiserror::Error;

use crate::routing::headers::{ResponseSlot, Scratch};

pub use catalog::HandlerCatalog;

/// HTTP methods a route can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
}

impl Verb {
    pub const ALL: [Verb; 8] = [
        Verb::Get,
        Verb::Post,
        Verb::Put,
        Verb::Delete,
        Verb::Head,
        Verb::Options,
        Verb::Patch,
        Verb::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
            Verb::Patch => "PATCH",
            Verb::Trace => "TRACE",
        }
    }

    /// Map a transport method. Extension methods have no verb.
    pub fn from_method(method: &Method) -> Option<Self> {
        method.as_str().parse().ok()
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("Unsupported HTTP method [{value}]"))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of verbs, stored as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerbSet(u8);

impl VerbSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, verb: Verb) {
        self.0 |= verb.bit();
    }

    /// Whether a route declaring this set can serve `verb`.
    pub fn can_serve(&self, verb: Verb) -> bool {
        self.0 & verb.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Verb> + '_ {
        Verb::ALL.into_iter().filter(|v| self.can_serve(*v))
    }
}

impl FromIterator<Verb> for VerbSet {
    fn from_iter<I: IntoIterator<Item = Verb>>(iter: I) -> Self {
        let mut set = VerbSet::empty();
        for verb in iter {
            set.insert(verb);
        }
        set
    }
}

/// Failure reported by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Recoverable application failure, answered with `status` and `message`.
    #[error("{message}")]
    Application { status: u16, message: String },

    /// Connection-level failure. Not recovered by the router.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl HandlerError {
    pub fn application(status: u16, message: impl Into<String>) -> Self {
        HandlerError::Application {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::application(400, message)
    }
}

/// Per-request state handed to a handler.
#[derive(Debug)]
pub struct Call {
    verb: Verb,
    path: Vec<Option<String>>,
    query: Vec<Option<String>>,
    headers: Vec<Option<String>>,
    body: Bytes,
    response: Vec<u8>,
    content_type: Option<String>,
    scratch: Vec<Scratch>,
}

impl Call {
    pub fn new(verb: Verb, body: Bytes) -> Self {
        Self {
            verb,
            path: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body,
            response: Vec::new(),
            content_type: None,
            scratch: Vec::new(),
        }
    }

    pub fn with_path_captures(mut self, captures: Vec<Option<String>>) -> Self {
        self.path = captures;
        self
    }

    pub fn with_query_captures(mut self, captures: Vec<Option<String>>) -> Self {
        self.query = captures;
        self
    }

    pub fn with_header_captures(mut self, captures: Vec<Option<String>>) -> Self {
        self.headers = captures;
        self
    }

    pub fn with_scratch(mut self, scratch: Vec<Scratch>) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Path capture by position. The wildcard, if any, is the last slot.
    pub fn path(&self, index: usize) -> Option<&str> {
        self.path.get(index).and_then(|v| v.as_deref())
    }

    pub fn path_captures(&self) -> &[Option<String>] {
        &self.path
    }

    /// Query value by the position of its declared key.
    pub fn query(&self, index: usize) -> Option<&str> {
        self.query.get(index).and_then(|v| v.as_deref())
    }

    /// Request header value by the position of its declared name.
    pub fn header(&self, index: usize) -> Option<&str> {
        self.headers.get(index).and_then(|v| v.as_deref())
    }

    /// Decoded request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_text(&self) -> Result<&str, HandlerError> {
        std::str::from_utf8(&self.body).map_err(|_| HandlerError::bad_request("Request body is not valid UTF-8"))
    }

    /// Override the response `Content-Type`.
    pub fn set_content_type(&mut self, value: impl Into<String>) {
        self.content_type = Some(value.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Response header scratch slot by declared position.
    pub fn response_header(&mut self, index: usize) -> Option<&mut Scratch> {
        self.scratch.get_mut(index)
    }

    pub fn response_body(&self) -> &[u8] {
        &self.response
    }

    pub(crate) fn into_output(self) -> (Vec<u8>, Option<String>, Vec<Scratch>) {
        (self.response, self.content_type, self.scratch)
    }
}

/// The response body sink.
impl io::Write for Call {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.response.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Request handler bound to one route.
pub trait Handler: Send + Sync {
    /// Serve one call and return the application status code.
    fn handle(&self, call: &mut Call) -> Result<u16, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Call) -> Result<u16, HandlerError> + Send + Sync,
{
    fn handle(&self, call: &mut Call) -> Result<u16, HandlerError> {
        self(call)
    }
}

/// Pin a closure to the handler signature so its argument and return types
/// are inferred.
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&mut Call) -> Result<u16, HandlerError> + Send + Sync,
{
    f
}

/// One route declared by a plugin.
#[derive(Clone)]
pub struct RouteDef {
    pub pattern: String,
    pub verbs: VerbSet,
    pub accepts: Vec<String>,
    pub produces: Vec<String>,
    /// Bare query keys; `=` is appended at compile time.
    pub query: Vec<String>,
    pub request_headers: Vec<String>,
    pub response_headers: Vec<ResponseSlot>,
    pub handler: Arc<dyn Handler>,
}

impl RouteDef {
    pub fn new(pattern: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            pattern: pattern.into(),
            verbs: VerbSet::empty(),
            accepts: Vec::new(),
            produces: Vec::new(),
            query: Vec::new(),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn get(pattern: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self::new(pattern, handler).method(Verb::Get)
    }

    pub fn post(pattern: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self::new(pattern, handler).method(Verb::Post)
    }

    pub fn method(mut self, verb: Verb) -> Self {
        self.verbs.insert(verb);
        self
    }

    pub fn methods(mut self, verbs: impl IntoIterator<Item = Verb>) -> Self {
        for verb in verbs {
            self.verbs.insert(verb);
        }
        self
    }

    pub fn accepts<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepts.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn produces<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn query<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn request_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_headers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn response_header(mut self, slot: ResponseSlot) -> Self {
        self.response_headers.push(slot);
        self
    }
}

impl fmt::Debug for RouteDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDef")
            .field("pattern", &self.pattern)
            .field("verbs", &self.verbs.iter().collect::<Vec<_>>())
            .field("accepts", &self.accepts)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// A deployable set of routes under one mount path.
pub trait Plugin: Send + Sync {
    /// Path the plugin's routes are mounted under.
    fn mount_path(&self) -> &str;

    /// Routes in registration order. Earlier routes win on overlap.
    fn routes(&self) -> Vec<RouteDef>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_verb_parsing() {
        assert_eq!("get".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!(Verb::from_method(&Method::PATCH), Some(Verb::Patch));
        assert_eq!(Verb::from_method(&Method::CONNECT), None);
        assert!("PROPFIND".parse::<Verb>().is_err());
    }

    #[test]
    fn test_verb_set() {
        let set: VerbSet = [Verb::Get, Verb::Head].into_iter().collect();
        assert!(set.can_serve(Verb::Get));
        assert!(set.can_serve(Verb::Head));
        assert!(!set.can_serve(Verb::Post));
        assert_eq!(set.iter().count(), 2);
        assert!(VerbSet::empty().is_empty());
    }

    #[test]
    fn test_call_sink_and_captures() {
        let mut call = Call::new(Verb::Post, Bytes::from_static(b"payload"))
            .with_path_captures(vec![Some("42".into()), None])
            .with_query_captures(vec![Some("1".into())]);

        assert_eq!(call.path(0), Some("42"));
        assert_eq!(call.path(1), None);
        assert_eq!(call.path(9), None);
        assert_eq!(call.query(0), Some("1"));
        assert_eq!(call.body_text().unwrap(), "payload");

        let id = call.path(0).unwrap_or_default().to_string();
        write!(call, "id={id}").unwrap();
        assert_eq!(call.response_body(), b"id=42");
    }

    #[test]
    fn test_closure_is_handler() {
        let handler = handler_fn(|call| {
            call.set_content_type("text/plain");
            Ok(204)
        });
        let mut call = Call::new(Verb::Get, Bytes::new());
        assert_eq!(handler.handle(&mut call).unwrap(), 204);
        assert_eq!(call.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_route_builder() {
        let route = RouteDef::get("items/{id}", handler_fn(|_| Ok(200)))
            .method(Verb::Head)
            .produces(["application/json"])
            .query(["page", "size"]);

        assert!(route.verbs.can_serve(Verb::Get));
        assert!(route.verbs.can_serve(Verb::Head));
        assert_eq!(route.produces, vec!["application/json"]);
        assert_eq!(route.query, vec!["page", "size"]);
    }
}
