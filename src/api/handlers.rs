//! Request handlers

use super::routes::AppState;
use crate::error::ApiError;
use crate::metrics;
use crate::rest;
use crate::urls::{Endpoint, Resolver};
use crate::views::{ViewRequest, builtin};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    response::{IntoResponse, Response},
};
use std::cmp::Ordering;

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// Fallback handler: resolve the path and hand the request to its endpoint
pub async fn route_request(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let raw_path = parts.uri.path().to_string();
    let query = parts.uri.query().map(String::from);

    let path = match urlencoding::decode(&raw_path) {
        Ok(path) => path.into_owned(),
        Err(_) => {
            return ApiError::BadRequest("Invalid percent-encoding in path".to_string())
                .into_response();
        }
    };

    let Some(matched) = state.resolver.resolve(&path) else {
        let language = negotiate_language(&state.resolver, &parts.headers);
        if let Some(response) =
            append_slash(&state.resolver, &parts.method, &path, &raw_path, query.as_deref())
        {
            return with_language(response, &language);
        }
        metrics::record_unresolved();
        tracing::debug!(path = %path, method = %parts.method, "No route matched");
        return with_language(ApiError::NotFound.into_response(), &language);
    };

    let language = matched
        .language
        .clone()
        .unwrap_or_else(|| negotiate_language(&state.resolver, &parts.headers));

    let body = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to read request body");
            return with_language(ApiError::PayloadTooLarge.into_response(), &language);
        }
    };

    let method = parts.method.clone();
    let view_request = ViewRequest {
        method: parts.method,
        path: path.clone(),
        query,
        headers: parts.headers,
        body,
        kwargs: matched.kwargs.clone(),
        args: matched.args.clone(),
        language: language.clone(),
        user: None,
        auth_scheme: None,
        route_name: matched.view_name(),
    };

    let response = match matched.endpoint {
        Endpoint::View(id) => state.views.call(id, view_request).await,
        Endpoint::Rest(methods) => rest::rest_dispatch(&state, view_request, methods).await,
        Endpoint::Page(page) => {
            builtin::render_page(page, &view_request, &state.config.webhook_integrations)
        }
        Endpoint::Redirect { url, permanent } => builtin::redirect(url, *permanent),
    };

    metrics::record_request(&matched.route, method.as_str(), response.status().as_u16());
    tracing::debug!(
        path = %path,
        method = %method,
        route = %matched.route,
        status = response.status().as_u16(),
        "Request routed"
    );

    with_language(response, &language)
}

/// Redirect GET/HEAD to the slash-terminated path when only that one resolves
fn append_slash(
    resolver: &Resolver,
    method: &Method,
    path: &str,
    raw_path: &str,
    query: Option<&str>,
) -> Option<Response> {
    if !(method == Method::GET || method == Method::HEAD) || path.ends_with('/') {
        return None;
    }
    resolver.resolve(&format!("{}/", path))?;

    let mut location = format!("{}/", raw_path);
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }
    Some(builtin::redirect(&location, true))
}

/// Pick a configured language from `Accept-Language`, else the default
fn negotiate_language(resolver: &Resolver, headers: &HeaderMap) -> String {
    language_from_header(resolver.languages(), headers)
        .unwrap_or_else(|| resolver.default_language().to_string())
}

fn language_from_header(languages: &[String], headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::ACCEPT_LANGUAGE)?.to_str().ok()?;

    let mut candidates: Vec<(f32, String)> = value
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim().to_ascii_lowercase();
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            (!tag.is_empty() && quality > 0.0).then_some((quality, tag))
        })
        .collect();
    // Stable sort keeps header order among equal weights
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    candidates.into_iter().find_map(|(_, tag)| {
        let primary = tag.split('-').next().unwrap_or(&tag).to_string();
        languages
            .iter()
            .find(|l| l.eq_ignore_ascii_case(&tag))
            .or_else(|| languages.iter().find(|l| l.eq_ignore_ascii_case(&primary)))
            .cloned()
    })
}

fn with_language(mut response: Response, language: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(language) {
        response
            .headers_mut()
            .insert(header::CONTENT_LANGUAGE, value);
    }
    response
}
