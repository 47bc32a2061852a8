//! Nanoservice container library.
//!
//! Hosts hot-deployable plugins behind one HTTP listener: a plugin declares
//! routes under a mount path, the router dispatches requests to the first
//! matching route, and the deployment manager keeps the router in sync with
//! a directory of deployment units.

pub mod admin;
pub mod config;
pub mod deploy;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod plugin;
pub mod routing;

pub use config::schema::ServiceConfig;
pub use deploy::DeploymentManager;
pub use http::NanoServer;
pub use lifecycle::{ServiceLifecycle, Shutdown};
pub use plugin::{Call, Handler, HandlerCatalog, HandlerError, Plugin, RouteDef, Verb};
pub use routing::Router;
