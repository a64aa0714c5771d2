//! View registry
//!
//! Routes name their handlers by id. The hosting application registers an
//! implementation for each id it serves; ids nobody registered answer
//! `501 Not Implemented`.

use crate::auth::{AuthScheme, UserProfile};
use crate::config::RouterConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, header};
use axum::response::{IntoResponse, Response};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

pub mod builtin;

/// Everything a view gets to see about the request
#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub kwargs: BTreeMap<String, String>,
    pub args: Vec<String>,
    pub language: String,
    pub user: Option<UserProfile>,
    pub auth_scheme: Option<AuthScheme>,
    pub route_name: Option<String>,
}

impl ViewRequest {
    pub fn kwarg(&self, key: &str) -> Option<&str> {
        self.kwargs.get(key).map(String::as_str)
    }

    /// Decoded value of a query-string parameter
    pub fn query_param(&self, key: &str) -> Option<String> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(self.query.as_deref()?).ok()?;
        find_param(pairs, key)
    }

    /// Decoded value of a field in a form-encoded body
    pub fn form_param(&self, key: &str) -> Option<String> {
        let content_type = self.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        if !content_type.starts_with("application/x-www-form-urlencoded") {
            return None;
        }
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&self.body).ok()?;
        find_param(pairs, key)
    }
}

fn find_param(pairs: Vec<(String, String)>, key: &str) -> Option<String> {
    pairs
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, value)| value)
}

/// A request handler bound to a view id
#[async_trait]
pub trait View: Send + Sync {
    async fn call(&self, request: ViewRequest) -> Response;
}

/// Adapter for async closures
pub struct FnView<F>(pub F);

#[async_trait]
impl<F, Fut> View for FnView<F>
where
    F: Fn(ViewRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn call(&self, request: ViewRequest) -> Response {
        (self.0)(request).await
    }
}

#[derive(Default)]
pub struct ViewRegistry {
    views: HashMap<String, Arc<dyn View>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the views this crate implements itself
    pub fn with_builtins(config: &RouterConfig) -> Self {
        let mut registry = Self::new();
        registry.register(builtin::GENERATE_204, builtin::Generate204);
        registry.register(
            builtin::AUTH_BACKENDS,
            builtin::AuthBackends::new(config.auth_backends.clone()),
        );
        registry.register(
            builtin::GOOGLE_CLIENT_ID,
            builtin::GoogleClientId::new(config.google_client_id.clone()),
        );
        registry.register(builtin::STATIC_SERVE, builtin::StaticServe);
        registry
    }

    /// Bind `id` to `view`, replacing any earlier binding
    pub fn register(&mut self, id: &str, view: impl View + 'static) {
        if self.views.insert(id.to_string(), Arc::new(view)).is_some() {
            tracing::debug!(view = %id, "Replaced registered view");
        }
    }

    pub fn register_fn<F, Fut>(&mut self, id: &str, f: F)
    where
        F: Fn(ViewRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.register(id, FnView(f));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.views.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub async fn call(&self, id: &str, request: ViewRequest) -> Response {
        match self.views.get(id) {
            Some(view) => view.call(request).await,
            None => {
                tracing::warn!(view = %id, path = %request.path, "No view registered");
                ApiError::NotImplemented(id.to_string()).into_response()
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_request(method: Method, path: &str) -> ViewRequest {
    ViewRequest {
        method,
        path: path.to_string(),
        query: None,
        headers: HeaderMap::new(),
        body: Bytes::new(),
        kwargs: BTreeMap::new(),
        args: Vec::new(),
        language: "en".to_string(),
        user: None,
        auth_scheme: None,
        route_name: None,
    }
}
