//! Views served without an external implementation

use super::{View, ViewRequest};
use crate::config::AuthBackendsConfig;
use crate::error::ApiError;
use crate::urls::{Page, PageKind};
use crate::webhooks::WebhookIntegration;
use async_trait::async_trait;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use std::path::{Component, Path, PathBuf};

pub const GENERATE_204: &str = "generate_204";
pub const AUTH_BACKENDS: &str = "auth.api_get_auth_backends";
pub const GOOGLE_CLIENT_ID: &str = "auth.api_fetch_google_client_id";
pub const STATIC_SERVE: &str = "static.serve";

/// Connectivity check used by the desktop app
pub struct Generate204;

#[async_trait]
impl View for Generate204 {
    async fn call(&self, _request: ViewRequest) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

/// Tells mobile apps which login forms to show
pub struct AuthBackends {
    backends: AuthBackendsConfig,
}

impl AuthBackends {
    pub fn new(backends: AuthBackendsConfig) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl View for AuthBackends {
    async fn call(&self, _request: ViewRequest) -> Response {
        Json(json!({
            "result": "success",
            "msg": "",
            "password": self.backends.password,
            "google": self.backends.google,
            "dev": self.backends.dev,
        }))
        .into_response()
    }
}

pub struct GoogleClientId {
    client_id: Option<String>,
}

impl GoogleClientId {
    pub fn new(client_id: Option<String>) -> Self {
        Self { client_id }
    }
}

#[async_trait]
impl View for GoogleClientId {
    async fn call(&self, _request: ViewRequest) -> Response {
        match &self.client_id {
            Some(client_id) => Json(json!({
                "result": "success",
                "msg": "",
                "google_client_id": client_id,
            }))
            .into_response(),
            None => {
                ApiError::BadRequest("GOOGLE_CLIENT_ID is not configured".to_string())
                    .into_response()
            }
        }
    }
}

/// Serves files below the route's `document_root` kwarg
pub struct StaticServe;

#[async_trait]
impl View for StaticServe {
    async fn call(&self, request: ViewRequest) -> Response {
        let Some(root) = request.kwarg("document_root") else {
            return ApiError::Internal(anyhow::anyhow!(
                "static route '{}' has no document_root",
                request.path
            ))
            .into_response();
        };
        let Some(target) = safe_join(Path::new(root), request.kwarg("path").unwrap_or("")) else {
            return ApiError::NotFound.into_response();
        };

        let target = match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => target.join("index.html"),
            _ => target,
        };

        match tokio::fs::read(&target).await {
            Ok(contents) => {
                let mime = mime_guess::from_path(&target).first_or_octet_stream();
                let mut response = contents.into_response();
                if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                tracing::debug!(path = ?target, error = %e, "Static file not served");
                ApiError::NotFound.into_response()
            }
        }
    }
}

/// Join a request path onto `root`, refusing anything that escapes it
fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// 301 for permanent redirects, 302 otherwise
pub fn redirect(url: &str, permanent: bool) -> Response {
    let status = if permanent {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::FOUND
    };
    match HeaderValue::from_str(url) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => ApiError::Internal(anyhow::anyhow!("invalid redirect target '{}'", url))
            .into_response(),
    }
}

/// Render a documentation or marketing page
pub fn render_page(
    page: &Page,
    request: &ViewRequest,
    integrations: &[WebhookIntegration],
) -> Response {
    let mut body = String::new();

    match page.kind {
        PageKind::Template => {}
        PageKind::ApiDocs => {
            body.push_str("<p>REST endpoints live under <code>/api/v1/</code>.</p>");
        }
        PageKind::Integrations => {
            body.push_str("<ul class=\"integrations\">");
            for integration in integrations {
                body.push_str(&format!(
                    "<li data-name=\"{}\">{}</li>",
                    escape_html(&integration.name),
                    escape_html(integration.display_name())
                ));
            }
            body.push_str("</ul>");
        }
        PageKind::Help => {
            let article = request.kwarg("article").unwrap_or("");
            let article = if article.is_empty() { "index" } else { article };
            body.push_str(&format!(
                "<article data-article=\"{0}\">{0}</article>",
                escape_html(article)
            ));
        }
    }

    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head><meta name=\"template\" content=\"{template}\"></head>\n<body>{body}</body>\n</html>\n",
        lang = escape_html(&request.language),
        template = escape_html(&page.template),
        body = body,
    ))
    .into_response()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
