//! Routing error types.

use thiserror::Error;

/// Raised when a path, query, or header pattern cannot be compiled.
///
/// Compilation is all-or-nothing: a failing pattern never produces a
/// partially usable matcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Path pattern is empty")]
    EmptyPath,

    #[error("Path [{pattern}] contains more than one wildcard")]
    DuplicateWildcard { pattern: String },

    #[error("Path [{pattern}]: wildcard is allowed as the last segment only")]
    WildcardNotLast { pattern: String },

    #[error("Path [{pattern}]: malformed capture segment [{segment}]")]
    MalformedCapture { pattern: String, segment: String },

    #[error("Parameter list can't be empty")]
    EmptyParameters,

    #[error("Parameter at index [{index}] is empty")]
    EmptyParameter { index: usize },

    #[error("Parameter [{name}] at index [{index}] is too short or doesn't end with the (=) sign")]
    MalformedQueryPrefix { index: usize, name: String },

    #[error("Header name [{name}] at index [{index}] is not a valid HTTP header name")]
    InvalidHeaderName { index: usize, name: String },

    #[error("Response header slot at index [{index}] is invalid: {reason}")]
    InvalidResponseSlot { index: usize, reason: String },

    #[error("Media type [{value}] is malformed")]
    InvalidMediaType { value: String },
}

/// Errors reported synchronously by router registration.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Path to deploy can't be empty")]
    EmptyMount,

    #[error("Path to deploy [{0}] contains a plugin that is already deployed")]
    AlreadyDeployed(String),

    #[error("Attempt to undeploy non-deployed path [{0}]")]
    NotDeployed(String),

    #[error("Route [{route}] of mount [{mount}] is invalid: {source}")]
    InvalidRoute {
        mount: String,
        route: String,
        #[source]
        source: PatternError,
    },

    #[error("Route [{route}] of mount [{mount}] declares no HTTP methods")]
    NoVerbs { mount: String, route: String },
}

/// Failures dispatch does not turn into a response. The transport decides
/// what to do with them.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("I/O failure while serving [{path}]: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
