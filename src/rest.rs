//! REST method dispatch
//!
//! Picks the view bound to the request's HTTP method and applies the
//! authentication convention implied by the URL: basic auth under `/api`,
//! the session cookie everywhere else.

use crate::api::AppState;
use crate::auth::{self, AuthError, AuthScheme, UserProfile};
use crate::error::{ApiError, allow_header};
use crate::metrics;
use crate::urls::{RestMethods, ViewFlag};
use crate::views::ViewRequest;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

pub async fn rest_dispatch(
    state: &AppState,
    mut request: ViewRequest,
    methods: &RestMethods,
) -> Response {
    if request.method == Method::OPTIONS {
        return options_response(methods);
    }

    let method = effective_method(&request);
    let Some(binding) = methods.binding(&method) else {
        tracing::debug!(
            path = %request.path,
            method = %method,
            "Method not allowed"
        );
        return ApiError::MethodNotAllowed {
            allowed: methods.allowed(),
        }
        .into_response();
    };

    let scheme = auth_scheme_for(
        &request,
        binding.has_flag(ViewFlag::OverrideApiUrlScheme),
    );
    let user = match authenticate(state, &request, scheme).await {
        Ok(user) => user,
        Err(e) => {
            metrics::record_auth_failure(scheme.as_str());
            tracing::info!(
                path = %request.path,
                scheme = scheme.as_str(),
                error = %e,
                "Request not authenticated"
            );
            return ApiError::Unauthorized(e).into_response();
        }
    };

    tracing::debug!(
        path = %request.path,
        method = %method,
        view = %binding.view,
        user = %user.email,
        "Dispatching REST request"
    );

    request.method = method;
    request.user = Some(user);
    request.auth_scheme = Some(scheme);
    state.views.call(&binding.view, request).await
}

/// Clients that cannot send arbitrary verbs may POST a `method` form
/// field, or `?method=` when the body is not a form
fn effective_method(request: &ViewRequest) -> Method {
    if request.method == Method::POST
        && let Some(overridden) = request
            .form_param("method")
            .or_else(|| request.query_param("method"))
        && let Ok(method) = Method::from_bytes(overridden.to_ascii_uppercase().as_bytes())
    {
        return method;
    }
    request.method.clone()
}

fn auth_scheme_for(request: &ViewRequest, override_url_scheme: bool) -> AuthScheme {
    if request.path.starts_with("/api")
        || (override_url_scheme && request.headers.contains_key(header::AUTHORIZATION))
    {
        AuthScheme::ApiKey
    } else {
        AuthScheme::Session
    }
}

async fn authenticate(
    state: &AppState,
    request: &ViewRequest,
    scheme: AuthScheme,
) -> Result<UserProfile, AuthError> {
    match scheme {
        AuthScheme::ApiKey => {
            let (email, api_key) = auth::parse_basic_auth(&request.headers)?;
            state.authenticator.validate_api_key(&email, &api_key).await
        }
        AuthScheme::Session => {
            let key = auth::session_key(&request.headers, &state.config.session_cookie_name)
                .ok_or(AuthError::NotLoggedIn)?;
            state
                .authenticator
                .session_user(&key)
                .await
                .ok_or(AuthError::NotLoggedIn)
        }
    }
}

fn options_response(methods: &RestMethods) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(value) = HeaderValue::from_str(&allow_header(&methods.allowed())) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}
