use async_trait::async_trait;
use uuid::Uuid;

use super::StoreResult;
use crate::{
    auth::session::{NewSession, Session},
    telco::{ExternalAccessToken, ExternalTokenType, FirstOrCreateParams},
    users::{NewUser, Role, User},
};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &NewSession) -> StoreResult<Session>;
    async fn get_session_by_id(&self, id: Uuid) -> StoreResult<Option<Session>>;
    /// Mark a session blocked. Fails with `NotFound` for unknown ids.
    async fn block_session(&self, id: Uuid) -> StoreResult<Session>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Role snapshot used when issuing tokens: lowest role id wins.
    async fn get_user_role(&self, user_id: i64) -> StoreResult<Option<String>>;
    async fn assign_role(&self, user_id: i64, role_name: &str) -> StoreResult<()>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
}

#[async_trait]
pub trait ExternalTokenRepository: Send + Sync {
    /// Open the transaction that spans one read-check-insert attempt.
    async fn begin_provisioning(&self) -> StoreResult<Box<dyn ProvisioningTx>>;

    async fn get_external_token(
        &self,
        mobile_number: &str,
        token_type: ExternalTokenType,
    ) -> StoreResult<Option<ExternalAccessToken>>;
}

/// One provisioning transaction. Dropping it without [`commit`] rolls back
/// every write made through it.
///
/// [`commit`]: ProvisioningTx::commit
#[async_trait]
pub trait ProvisioningTx: Send {
    async fn find_token(
        &mut self,
        mobile_number: &str,
        token_type: ExternalTokenType,
    ) -> StoreResult<Option<ExternalAccessToken>>;

    /// Register the SIM card for `mobile_number` if it is not known yet.
    async fn ensure_sim_card(
        &mut self,
        mobile_number: &str,
        mobile_number_type: Option<&str>,
    ) -> StoreResult<()>;

    /// Insert a token row. A concurrent row for the same key surfaces as
    /// `StoreError::Conflict`.
    async fn insert_token(&mut self, params: &FirstOrCreateParams)
    -> StoreResult<ExternalAccessToken>;

    async fn commit(&mut self) -> StoreResult<()>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store: SessionRepository + UserRepository + ExternalTokenRepository {}

impl<T> Store for T where T: SessionRepository + UserRepository + ExternalTokenRepository {}
