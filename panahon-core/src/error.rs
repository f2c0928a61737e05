use thiserror::Error;

use crate::{
    auth::{codec::TokenError, crypto::CryptoError},
    database::StoreError,
};

/// Failure taxonomy shared by the authentication and provisioning services.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed credentials")]
    Unauthorized,
    #[error("token is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("insufficient role")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("session is blocked")]
    Blocked,
    #[error("session does not match token")]
    Mismatch,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::Expired => AuthError::Expired,
            TokenError::InvalidKeySize { .. } | TokenError::Seal(_) => {
                AuthError::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::NotFound("record"),
            StoreError::Conflict(what) => AuthError::Conflict(what),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<CryptoError> for AuthError {
    fn from(err: CryptoError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl AuthError {
    /// Errors that should answer 401 at the HTTP boundary.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthorized
                | AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::Blocked
                | AuthError::Mismatch
                | AuthError::InvalidCredentials
        )
    }
}
