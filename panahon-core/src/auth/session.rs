//! Server-side refresh sessions.
//!
//! Access tokens are short-lived and verified locally by the codec. Refresh
//! tokens are long-lived and only honoured while the session row they point
//! at exists, is unblocked and still belongs to the same subject.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    codec::{IssuedToken, TokenCodec, TokenKind},
    identity::Identity,
};
use crate::{
    database::{StoreError, ports::SessionRepository},
    error::{AuthError, AuthResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub subject_id: i64,
    pub refresh_token_id: Uuid,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub id: Uuid,
    pub subject_id: i64,
    pub refresh_token_id: Uuid,
    pub user_agent: String,
    pub client_ip: String,
    pub expires_at: DateTime<Utc>,
}

/// Request metadata recorded on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub user_agent: String,
    pub client_ip: String,
}

/// Lifetimes of the two token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
}

/// Result of a successful login.
#[derive(Clone)]
pub struct SessionTokens {
    pub session: Session,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    codec: Arc<TokenCodec>,
    ttls: TokenTtls,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, codec: Arc<TokenCodec>, ttls: TokenTtls) -> Self {
        Self { repo, codec, ttls }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn ttls(&self) -> TokenTtls {
        self.ttls
    }

    pub async fn create_session(
        &self,
        id: Uuid,
        subject_id: i64,
        refresh_token_id: Uuid,
        meta: ClientMeta,
        ttl: Duration,
    ) -> AuthResult<Session> {
        self.persist(NewSession {
            id,
            subject_id,
            refresh_token_id,
            user_agent: meta.user_agent,
            client_ip: meta.client_ip,
            expires_at: Utc::now() + ttl,
        })
        .await
    }

    async fn persist(&self, new_session: NewSession) -> AuthResult<Session> {
        let session = self.repo.create_session(&new_session).await?;
        debug!(session_id = %session.id, subject_id = session.subject_id, "session created");
        Ok(session)
    }

    /// Load a session that is still usable.
    pub async fn get_session(&self, id: Uuid) -> AuthResult<Session> {
        let session = self
            .repo
            .get_session_by_id(id)
            .await?
            .ok_or(AuthError::NotFound("session"))?;

        if session.is_blocked {
            return Err(AuthError::Blocked);
        }
        Ok(session)
    }

    /// Issue an access/refresh pair for `identity` and persist the session
    /// the refresh token points at.
    pub async fn start_session(&self, identity: &Identity, meta: ClientMeta) -> AuthResult<SessionTokens> {
        let session_id = Uuid::new_v4();
        let refresh = self
            .codec
            .issue_for_session(identity, TokenKind::Refresh, self.ttls.refresh, session_id)?;
        let access = self
            .codec
            .issue_for_session(identity, TokenKind::Access, self.ttls.access, session_id)?;

        // The row and the refresh token share one deadline.
        let session = self
            .persist(NewSession {
                id: session_id,
                subject_id: identity.subject_id,
                refresh_token_id: refresh.payload.id,
                user_agent: meta.user_agent,
                client_ip: meta.client_ip,
                expires_at: refresh.payload.expires_at,
            })
            .await?;

        info!(session_id = %session.id, subject_id = identity.subject_id, "login session started");
        Ok(SessionTokens {
            session,
            access,
            refresh,
        })
    }

    /// Exchange a refresh token for a fresh access token. The refresh token
    /// and session row are left untouched. Access tokens are refused.
    pub async fn renew_access_token(&self, refresh_token: &str) -> AuthResult<IssuedToken> {
        let refresh = self.codec.verify_kind(refresh_token, TokenKind::Refresh)?;
        let session_id = refresh.session_id.ok_or(AuthError::Mismatch)?;

        let session = match self.get_session(session_id).await {
            Err(AuthError::Blocked) => {
                warn!(%session_id, "renewal rejected for blocked session");
                return Err(AuthError::Blocked);
            }
            other => other?,
        };

        if session.subject_id != refresh.identity.subject_id
            || session.refresh_token_id != refresh.id
        {
            warn!(%session_id, "renewal rejected: refresh token does not match session");
            return Err(AuthError::Mismatch);
        }

        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired);
        }

        let access = self
            .codec
            .issue_for_session(
                &refresh.identity,
                TokenKind::Access,
                self.ttls.access,
                session.id,
            )?;
        debug!(%session_id, subject_id = session.subject_id, "access token renewed");
        Ok(access)
    }

    /// Revoke a session. Blocking an already blocked session is a no-op.
    pub async fn block_session(&self, id: Uuid) -> AuthResult<Session> {
        let session = self.repo.block_session(id).await.map_err(|err| match err {
            StoreError::NotFound => AuthError::NotFound("session"),
            other => other.into(),
        })?;
        info!(session_id = %id, "session blocked");
        Ok(session)
    }
}
