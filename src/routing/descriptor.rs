//! Compiled route registrations.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::plugin::{Handler, RouteDef, Verb, VerbSet};
use crate::routing::cache::MatcherCache;
use crate::routing::error::{PatternError, RouterError};
use crate::routing::headers::{HeaderPattern, ResponseHeaderWriter};
use crate::routing::mime::{self, MediaType};
use crate::routing::path::PathPattern;
use crate::routing::query::QueryPattern;

/// One registered route: path pattern, verbs, MIME sets and handler.
///
/// Immutable once built. Dispatch holds an `Arc` to it for the duration of a
/// call, so an undeploy never pulls a descriptor out from under a request.
pub struct MethodDescriptor {
    verbs: VerbSet,
    path: Arc<PathPattern>,
    query: Option<Arc<QueryPattern>>,
    headers: Option<Arc<HeaderPattern>>,
    response: Option<Arc<ResponseHeaderWriter>>,
    accepts: Vec<MediaType>,
    produces: Vec<MediaType>,
    handler: Arc<dyn Handler>,
}

impl MethodDescriptor {
    /// Compile `route` for the plugin mounted at `mount`.
    pub fn compile(mount: &str, route: &RouteDef, cache: &MatcherCache) -> Result<Self, RouterError> {
        let invalid = |source: PatternError| RouterError::InvalidRoute {
            mount: mount.to_string(),
            route: route.pattern.clone(),
            source,
        };

        if route.verbs.is_empty() {
            return Err(RouterError::NoVerbs {
                mount: mount.to_string(),
                route: route.pattern.clone(),
            });
        }

        let path = cache.path(&route.pattern).map_err(invalid)?;

        let query = if route.query.is_empty() {
            None
        } else {
            let prefixes: Vec<String> = route.query.iter().map(|k| format!("{k}=")).collect();
            Some(cache.query(&prefixes).map_err(invalid)?)
        };

        let headers = if route.request_headers.is_empty() {
            None
        } else {
            Some(cache.request_headers(&route.request_headers).map_err(invalid)?)
        };

        let response = if route.response_headers.is_empty() {
            None
        } else {
            Some(cache.response_headers(&route.response_headers).map_err(invalid)?)
        };

        Ok(Self {
            verbs: route.verbs,
            path,
            query,
            headers,
            response,
            accepts: mime::parse_set(&route.accepts).map_err(invalid)?,
            produces: mime::parse_set(&route.produces).map_err(invalid)?,
            handler: route.handler.clone(),
        })
    }

    pub fn can_serve_query(&self, verb: Verb) -> bool {
        self.verbs.can_serve(verb)
    }

    /// Try this descriptor against a request. Returns the path captures on
    /// success.
    pub fn try_match(
        &self,
        verb: Verb,
        remaining: &str,
        content_type: Option<&MediaType>,
        accept: &[MediaType],
    ) -> Option<Vec<Option<String>>> {
        if !self.can_serve_query(verb) {
            return None;
        }

        let mut captures = vec![None; self.path.capture_count()];
        self.path.matches(remaining, &mut captures, 0)?;

        if !mime::is_compatible(&self.accepts, content_type) {
            return None;
        }
        if !mime::intersects(&self.produces, accept) {
            return None;
        }
        Some(captures)
    }

    pub fn query_captures(&self, raw_query: Option<&str>) -> Vec<Option<String>> {
        match &self.query {
            Some(pattern) => {
                let mut captures = vec![None; pattern.slot_count()];
                pattern.matches(raw_query, &mut captures, 0);
                captures
            }
            None => Vec::new(),
        }
    }

    pub fn header_captures(&self, headers: &HeaderMap) -> Vec<Option<String>> {
        match &self.headers {
            Some(pattern) => {
                let mut captures = vec![None; pattern.slot_count()];
                pattern.matches(headers, &mut captures, 0);
                captures
            }
            None => Vec::new(),
        }
    }

    pub fn response_writer(&self) -> Option<&ResponseHeaderWriter> {
        self.response.as_deref()
    }

    /// Content type to answer with when the handler does not set one: the
    /// first concrete produced type.
    pub fn default_content_type(&self) -> Option<&MediaType> {
        self.produces.iter().find(|m| m.is_concrete())
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn pattern(&self) -> &str {
        self.path.as_str()
    }

    pub fn verbs(&self) -> VerbSet {
        self.verbs
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("pattern", &self.path.as_str())
            .field("verbs", &self.verbs.iter().collect::<Vec<_>>())
            .field("accepts", &self.accepts)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}
