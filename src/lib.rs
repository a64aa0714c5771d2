//! Chat Router - URL routing for a team chat web application
//!
//! Maps request paths to handler ids, applies the session-cookie and
//! API-key authentication conventions of the `/json/` and `/api/v1/`
//! namespaces, and dispatches REST endpoints by HTTP method.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rest;
pub mod urls;
pub mod views;
pub mod webhooks;

pub use config::RouterConfig;
pub use error::{ApiError, RouteError, RouteResult};
pub use urls::{Resolver, ResolverMatch};
pub use views::{View, ViewRegistry, ViewRequest};
