use std::{convert::Infallible, net::SocketAddr};

use axum::{
    Extension, Json,
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{StatusCode, header, request::Parts},
};
use chrono::{DateTime, Utc};
use panahon_core::{
    AuthError,
    auth::{ClientMeta, Identity, Registration},
    users::{Role, User},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::{app_state::AppState, errors::AppResult};

/// User agent and peer address of the caller, recorded on new sessions.
#[derive(Debug, Clone)]
pub struct RequestMeta(pub ClientMeta);

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();

        Ok(RequestMeta(ClientMeta {
            user_agent,
            client_ip,
        }))
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        Registration {
            username: req.username,
            password: req.password,
            full_name: req.full_name,
            email: req.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub user: User,
}

pub async fn login(
    State(state): State<AppState>,
    RequestMeta(meta): RequestMeta,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let outcome = state
        .authenticator
        .login(&request.username, &request.password, meta)
        .await?;

    let tokens = outcome.tokens;
    Ok(Json(LoginResponse {
        access_token: tokens.access.token,
        access_token_expires_at: tokens.access.payload.expires_at,
        refresh_token: tokens.refresh.token,
        refresh_token_expires_at: tokens.refresh.payload.expires_at,
        session_id: tokens.session.id,
        user: outcome.user,
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.authenticator.register(request.into()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn renew_access_token(
    State(state): State<AppState>,
    Json(request): Json<RenewRequest>,
) -> AppResult<Json<RenewResponse>> {
    let access = state
        .sessions()
        .renew_access_token(&request.refresh_token)
        .await?;

    Ok(Json(RenewResponse {
        access_token: access.token,
        access_token_expires_at: access.payload.expires_at,
    }))
}

pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<MeResponse>> {
    let user = state
        .users
        .get_user(identity.subject_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::NotFound("user"))?;

    Ok(Json(MeResponse { identity, user }))
}

pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    let roles = state.users.list_roles().await.map_err(AuthError::from)?;
    Ok(Json(roles))
}

pub async fn block_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.sessions().block_session(session_id).await?;
    tracing::info!(%session_id, blocked_by = identity.subject_id, "session revoked");
    Ok(StatusCode::NO_CONTENT)
}
