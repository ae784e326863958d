//! Bearer-token authentication and permission checks.
//!
//! `authenticate` attaches a `Principal` to every request; `require_permission`
//! is layered onto the routes that need a specific capability.

pub mod rate_limit;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::models::{Permission, Principal};
use crate::AppState;

/// Resolve the `Authorization` header into a principal.
///
/// Requests without the header proceed as anonymous. A malformed header or an
/// unknown token is rejected outright.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(header_value) = request.headers().get(header::AUTHORIZATION).cloned() else {
        request.extensions_mut().insert(Principal::Anonymous);
        return next.run(request).await;
    };

    let Some(token) = bearer_token(header_value.to_str().ok()) else {
        tracing::debug!("Rejected malformed Authorization header");
        return AppError::InvalidToken.into_response();
    };

    match state.repo.principal_for_token(&token).await {
        Ok(Some(principal)) => {
            if let Principal::Token { name, .. } = &principal {
                tracing::debug!(token = %name, "Authenticated request");
            }
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Ok(None) => {
            tracing::debug!("Rejected unknown or expired token");
            AppError::InvalidToken.into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Reject the request unless its principal holds `permission`.
pub async fn require_permission(permission: Permission, request: Request, next: Next) -> Response {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or(Principal::Anonymous);

    if let Err(e) = check_permission(&principal, permission) {
        tracing::debug!(
            permission = permission.code(),
            "Rejected request without required permission"
        );
        return e.into_response();
    }

    next.run(request).await
}

fn check_permission(principal: &Principal, permission: Permission) -> Result<(), AppError> {
    if principal.is_anonymous() {
        return Err(AppError::AuthenticationRequired);
    }
    if !principal.has(permission) {
        return Err(AppError::NotPermitted);
    }
    Ok(())
}

/// Extract the token from a `Bearer <token>` header value.
fn bearer_token(value: Option<&str>) -> Option<String> {
    let (scheme, token) = value?.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token.to_string())
}
