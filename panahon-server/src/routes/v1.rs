use axum::{
    Router,
    routing::{get, post},
};
use panahon_core::auth::{RoleSet, roles};

use crate::{
    AppState,
    auth::{
        handlers,
        middleware::{require_authentication, require_roles},
    },
    telco,
};

pub mod paths {
    pub const LOGIN: &str = "/users/login";
    pub const REGISTER: &str = "/users/register";
    pub const CURRENT_USER: &str = "/users/me";
    pub const RENEW: &str = "/tokens/renew";
    pub const ROLES: &str = "/roles";
    pub const BLOCK_SESSION: &str = "/sessions/{id}/block";
    pub const GLABS_OPTIN: &str = "/glabs/optin";
}

pub fn create_v1_router(state: &AppState) -> Router<AppState> {
    Router::new()
        // Public endpoints
        .route(paths::LOGIN, post(handlers::login))
        .route(paths::REGISTER, post(handlers::register))
        .route(paths::RENEW, post(handlers::renew_access_token))
        .route(paths::GLABS_OPTIN, get(telco::handlers::optin))
        .merge(create_protected_routes(state))
        .merge(create_superadmin_routes(state))
}

/// Any authenticated caller.
fn create_protected_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new().route(paths::CURRENT_USER, get(handlers::get_current_user));
    require_authentication(router, state)
}

fn create_superadmin_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route(paths::ROLES, get(handlers::list_roles))
        .route(paths::BLOCK_SESSION, post(handlers::block_session));
    require_roles(router, state, RoleSet::new([roles::SUPERADMIN]))
}
