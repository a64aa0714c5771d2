//! Router construction

use crate::auth::{Authenticator, StaticAuthenticator};
use crate::config::RouterConfig;
use crate::error::RouteResult;
use crate::urls::Resolver;
use crate::views::ViewRegistry;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub views: Arc<ViewRegistry>,
    pub authenticator: Arc<dyn Authenticator>,
    pub config: Arc<RouterConfig>,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl AppState {
    /// Compile the routing table for `config` and authenticate against its user list
    pub fn new(
        config: RouterConfig,
        views: ViewRegistry,
        prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> RouteResult<Self> {
        let resolver = Resolver::from_config(&config)?;
        let authenticator = StaticAuthenticator::new(&config.users);

        tracing::info!(
            views = views.len(),
            authenticator = authenticator.name(),
            "Application state ready"
        );

        Ok(Self {
            resolver: Arc::new(resolver),
            views: Arc::new(views),
            authenticator: Arc::new(authenticator),
            config: Arc::new(config),
            prometheus_handle,
        })
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }
}

/// Create the main router
///
/// Everything except the metrics endpoint goes through the URL resolver.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::route_request)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
