//! Self-contained session tokens.
//!
//! A token is the header `pn1.local.` followed by base64url (no padding) of
//! `nonce || ciphertext`. The JSON payload is sealed with AES-256-GCM under
//! the single server key and the header is bound as associated data, so a
//! token can be verified without touching the database.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::identity::Identity;

const TOKEN_HEADER: &str = "pn1.local.";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid key size: must be exactly {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },
    #[error("token is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("failed to seal token: {0}")]
    Seal(String),
}

/// What a token may be used for. Only access tokens authenticate requests;
/// only refresh tokens renew them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub id: Uuid,
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(flatten)]
    pub identity: Identity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenPayload {
    pub fn new(
        identity: Identity,
        kind: TokenKind,
        ttl: Duration,
        session_id: Option<Uuid>,
    ) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            session_id,
            identity,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// An encoded token together with the claims it carries.
#[derive(Clone)]
pub struct IssuedToken {
    pub token: String,
    pub payload: TokenPayload,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies tokens with a fixed 32-byte symmetric key.
///
/// The codec holds no mutable state and is shared freely across requests.
#[derive(Clone)]
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub const KEY_SIZE: usize = 32;

    pub fn new(symmetric_key: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let key = symmetric_key.as_ref();
        if key.len() != Self::KEY_SIZE {
            return Err(TokenError::InvalidKeySize {
                expected: Self::KEY_SIZE,
                actual: key.len(),
            });
        }

        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| TokenError::InvalidKeySize {
                expected: Self::KEY_SIZE,
                actual: key.len(),
            })?;

        Ok(Self { cipher })
    }

    /// Issue a session-less access token for `identity` valid for `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.seal(TokenPayload::new(
            identity.clone(),
            TokenKind::Access,
            ttl,
            None,
        ))
    }

    /// Issue a token of `kind` bound to a server-side session.
    pub fn issue_for_session(
        &self,
        identity: &Identity,
        kind: TokenKind,
        ttl: Duration,
        session_id: Uuid,
    ) -> Result<IssuedToken, TokenError> {
        self.seal(TokenPayload::new(
            identity.clone(),
            kind,
            ttl,
            Some(session_id),
        ))
    }

    pub fn seal(&self, payload: TokenPayload) -> Result<IssuedToken, TokenError> {
        let plaintext =
            serde_json::to_vec(&payload).map_err(|err| TokenError::Seal(err.to_string()))?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: TOKEN_HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Seal("encryption failed".to_string()))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(&nonce_bytes);
        body.extend_from_slice(&ciphertext);

        Ok(IssuedToken {
            token: format!("{TOKEN_HEADER}{}", URL_SAFE_NO_PAD.encode(body)),
            payload,
        })
    }

    /// Authenticate `token` and return its claims if it has not expired.
    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenPayload, TokenError> {
        let payload = self.open(token)?;
        if payload.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(payload)
    }

    /// Like [`verify`](Self::verify), but a token of any other kind is
    /// rejected as `InvalidSignature`.
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<TokenPayload, TokenError> {
        let payload = self.verify(token)?;
        if payload.kind != kind {
            return Err(TokenError::InvalidSignature);
        }
        Ok(payload)
    }

    fn open(&self, token: &str) -> Result<TokenPayload, TokenError> {
        let encoded = token
            .strip_prefix(TOKEN_HEADER)
            .ok_or(TokenError::InvalidSignature)?;
        let body = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::InvalidSignature)?;
        if body.len() < NONCE_LEN + TAG_LEN {
            return Err(TokenError::InvalidSignature);
        }

        let (nonce_bytes, ciphertext) = body.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: TOKEN_HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::InvalidSignature)?;

        serde_json::from_slice(&plaintext).map_err(|_| TokenError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 32] = b"12345678901234567890123456789012";

    fn codec() -> TokenCodec {
        TokenCodec::new(KEY).expect("valid key")
    }

    #[test]
    fn rejects_wrong_key_sizes() {
        for len in [0usize, 16, 31, 33, 64] {
            let key = vec![7u8; len];
            assert_eq!(
                TokenCodec::new(&key).unwrap_err(),
                TokenError::InvalidKeySize {
                    expected: 32,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn verify_returns_issued_identity() {
        let codec = codec();
        let identity = Identity::new(42, "ADMIN");

        let issued = codec.issue(&identity, Duration::minutes(15)).unwrap();
        let payload = codec.verify(&issued.token).unwrap();

        assert_eq!(payload.identity, identity);
        assert_eq!(payload, issued.payload);
        assert_eq!(payload.kind, TokenKind::Access);
        assert!(payload.session_id.is_none());
    }

    #[test]
    fn session_id_survives_round_trip() {
        let codec = codec();
        let session_id = Uuid::new_v4();
        let issued = codec
            .issue_for_session(
                &Identity::new(3, ""),
                TokenKind::Refresh,
                Duration::hours(24),
                session_id,
            )
            .unwrap();

        let payload = codec.verify(&issued.token).unwrap();
        assert_eq!(payload.session_id, Some(session_id));
        assert_eq!(payload.kind, TokenKind::Refresh);
    }

    #[test]
    fn verify_kind_rejects_the_other_kind() {
        let codec = codec();
        let identity = Identity::new(4, "ADMIN");
        let session_id = Uuid::new_v4();
        let access = codec
            .issue_for_session(&identity, TokenKind::Access, Duration::minutes(15), session_id)
            .unwrap();
        let refresh = codec
            .issue_for_session(&identity, TokenKind::Refresh, Duration::hours(24), session_id)
            .unwrap();

        assert!(codec.verify_kind(&access.token, TokenKind::Access).is_ok());
        assert!(codec.verify_kind(&refresh.token, TokenKind::Refresh).is_ok());
        assert_eq!(
            codec.verify_kind(&refresh.token, TokenKind::Access).unwrap_err(),
            TokenError::InvalidSignature
        );
        assert_eq!(
            codec.verify_kind(&access.token, TokenKind::Refresh).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn zero_ttl_is_expired() {
        let codec = codec();
        let issued = codec.issue(&Identity::new(1, "ADMIN"), Duration::zero()).unwrap();

        assert_eq!(codec.verify(&issued.token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn token_expires_at_its_deadline() {
        let codec = codec();
        let issued = codec.issue(&Identity::new(1, "ADMIN"), Duration::minutes(1)).unwrap();
        let deadline = issued.payload.expires_at;

        assert!(codec.verify_at(&issued.token, deadline - Duration::seconds(1)).is_ok());
        assert_eq!(
            codec.verify_at(&issued.token, deadline).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn every_flipped_byte_is_rejected() {
        let codec = codec();
        let issued = codec.issue(&Identity::new(9, "SUPERADMIN"), Duration::minutes(5)).unwrap();
        let bytes = issued.token.as_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[i] ^= 0x01;
            let tampered = String::from_utf8(tampered).unwrap();

            assert_eq!(
                codec.verify(&tampered).unwrap_err(),
                TokenError::InvalidSignature,
                "byte {i} was flipped"
            );
        }
    }

    #[test]
    fn foreign_key_is_rejected() {
        let issued = codec().issue(&Identity::new(1, "ADMIN"), Duration::minutes(5)).unwrap();
        let other = TokenCodec::new([1u8; 32]).unwrap();

        assert_eq!(other.verify(&issued.token).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = codec();
        for token in ["", "pn1.local.", "pn1.local.AAAA", "Bearer abc", "v2.local.xyz"] {
            assert_eq!(codec.verify(token).unwrap_err(), TokenError::InvalidSignature);
        }
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let codec = codec();
        let identity = Identity::new(5, "ADMIN");
        let a = codec.issue(&identity, Duration::minutes(5)).unwrap();
        let b = codec.issue(&identity, Duration::minutes(5)).unwrap();

        assert_ne!(a.token, b.token);
        assert_ne!(a.payload.id, b.payload.id);
    }
}
