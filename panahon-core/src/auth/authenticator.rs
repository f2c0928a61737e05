//! Credential login and account registration.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use super::{
    crypto::PasswordCrypto,
    identity::Identity,
    session::{ClientMeta, SessionStore, SessionTokens},
};
use crate::{
    database::{StoreError, ports::UserRepository},
    error::{AuthError, AuthResult},
    users::{NewUser, User},
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Registration {
    pub fn validate(&self) -> AuthResult<()> {
        if self.username.is_empty() || !self.username.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AuthError::InvalidInput(
                "username must be non-empty and alphanumeric".into(),
            ));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if self.full_name.trim().is_empty() {
            return Err(AuthError::InvalidInput("full_name is required".into()));
        }
        if !self.email.contains('@') {
            return Err(AuthError::InvalidInput("email is invalid".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: SessionTokens,
}

#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserRepository>,
    crypto: PasswordCrypto,
    sessions: SessionStore,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserRepository>, crypto: PasswordCrypto, sessions: SessionStore) -> Self {
        Self {
            users,
            crypto,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Check credentials, snapshot the user's role and open a session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        meta: ClientMeta,
    ) -> AuthResult<LoginOutcome> {
        let Some(user) = self.users.get_user_by_username(username).await? else {
            warn!(username, "login failed: unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.crypto.verify_password(password, &user.password_hash)? {
            warn!(user_id = user.id, "login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let identity = self.identity_for(&user).await?;
        let tokens = self.sessions.start_session(&identity, meta).await?;
        info!(user_id = user.id, role = %identity.role, "user logged in");

        Ok(LoginOutcome { user, tokens })
    }

    /// Current identity of a user. Users without a role get the empty role.
    pub async fn identity_for(&self, user: &User) -> AuthResult<Identity> {
        let role = self.users.get_user_role(user.id).await?.unwrap_or_default();
        Ok(Identity::new(user.id, role))
    }

    pub async fn register(&self, registration: Registration) -> AuthResult<User> {
        registration.validate()?;

        let password_hash = self.crypto.hash_password(&registration.password)?;
        let user = self
            .users
            .create_user(&NewUser {
                username: registration.username,
                full_name: registration.full_name,
                email: registration.email,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => {
                    AuthError::Conflict("username or email already registered".into())
                }
                other => other.into(),
            })?;

        debug!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }
}
