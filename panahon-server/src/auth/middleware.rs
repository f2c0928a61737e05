//! Request gatekeeper.
//!
//! [`authenticate`] resolves a bearer access token into an [`Identity`] and
//! stores it in the request extensions. Refresh tokens are not credentials. [`authorize`] hands that identity to
//! [`authorize_identity`] together with the route's [`RoleSet`]. Use
//! [`require_roles`] to attach both so authentication always runs first.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
};
use panahon_core::{
    AuthError,
    auth::{Identity, RoleSet, TokenKind},
};
use tracing::{debug, warn};

use crate::infra::{app_state::AppState, errors::AppError};

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&request)?;

    let payload = state.codec.verify_kind(token, TokenKind::Access).map_err(|err| {
        warn!(error = %err, path = %request.uri().path(), "bearer token rejected");
        AppError::from(AuthError::from(err))
    })?;

    debug!(subject_id = payload.identity.subject_id, "request authenticated");
    request.extensions_mut().insert(payload.identity);

    Ok(next.run(request).await)
}

pub async fn authorize(
    State(roles): State<Arc<RoleSet>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize_identity(request.extensions().get::<Identity>(), &roles).map_err(|err| {
        if matches!(err, AuthError::Forbidden) {
            warn!(required = %roles, path = %request.uri().path(), "role check failed");
        }
        AppError::from(err)
    })?;

    Ok(next.run(request).await)
}

/// Fails closed: no identity is `Unauthorized` whatever `roles` holds.
pub fn authorize_identity(identity: Option<&Identity>, roles: &RoleSet) -> Result<(), AuthError> {
    let identity = identity.ok_or(AuthError::Unauthorized)?;
    if identity.has_any_role(roles) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

pub fn extract_bearer_token(request: &Request) -> Result<&str, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::from(AuthError::Unauthorized))?;

    // The auth scheme is case-insensitive (RFC 7235).
    match auth_header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AppError::from(AuthError::Unauthorized)),
    }
}

/// Gate every route already on `router` behind authentication.
pub fn require_authentication(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

/// Gate every route already on `router` behind authentication and `roles`.
pub fn require_roles(
    router: Router<AppState>,
    state: &AppState,
    roles: RoleSet,
) -> Router<AppState> {
    // The last layer added runs first.
    let router = router.route_layer(middleware::from_fn_with_state(Arc::new(roles), authorize));
    require_authentication(router, state)
}
