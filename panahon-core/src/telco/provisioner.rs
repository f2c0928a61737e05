//! First-or-create provisioning of telco access tokens.
//!
//! Delivery webhooks for the same subscriber can arrive concurrently and be
//! retried. Each attempt runs read, check and insert inside one store
//! transaction; the unique key on `(mobile_number, token_type)` decides the
//! race. A loser rolls back and re-reads the winner exactly once, so every
//! caller converges on the same stored token without taking a lock up front.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use super::{ExternalAccessToken, FirstOrCreateParams};
use crate::{
    database::{StoreError, StoreResult, ports::ExternalTokenRepository},
    error::{AuthError, AuthResult},
};

/// The stored token and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub token: ExternalAccessToken,
    pub is_created: bool,
}

#[derive(Clone)]
pub struct TokenProvisioner {
    repo: Arc<dyn ExternalTokenRepository>,
}

impl fmt::Debug for TokenProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvisioner").finish_non_exhaustive()
    }
}

impl TokenProvisioner {
    pub fn new(repo: Arc<dyn ExternalTokenRepository>) -> Self {
        Self { repo }
    }

    /// Return the token stored for the key, creating it from `params` when
    /// absent.
    ///
    /// An existing row always wins: the supplied `access_token` is ignored
    /// when a token is already stored for the same mobile number and type.
    pub async fn first_or_create_access_token(
        &self,
        params: &FirstOrCreateParams,
    ) -> AuthResult<ProvisionOutcome> {
        match self.attempt(params).await {
            Ok(outcome) => {
                info!(
                    mobile_number = %params.mobile_number,
                    token_type = %params.token_type,
                    is_created = outcome.is_created,
                    "external access token provisioned"
                );
                Ok(outcome)
            }
            Err(StoreError::Conflict(constraint)) => {
                debug!(
                    mobile_number = %params.mobile_number,
                    token_type = %params.token_type,
                    %constraint,
                    "lost provisioning race; re-reading winner"
                );
                self.read_winner(params).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn attempt(&self, params: &FirstOrCreateParams) -> StoreResult<ProvisionOutcome> {
        let mut tx = self.repo.begin_provisioning().await?;

        if let Some(existing) = tx
            .find_token(&params.mobile_number, params.token_type)
            .await?
        {
            tx.commit().await?;
            return Ok(ProvisionOutcome {
                token: existing,
                is_created: false,
            });
        }

        tx.ensure_sim_card(&params.mobile_number, params.mobile_number_type.as_deref())
            .await?;
        let created = tx.insert_token(params).await?;
        tx.commit().await?;

        Ok(ProvisionOutcome {
            token: created,
            is_created: true,
        })
    }

    async fn read_winner(&self, params: &FirstOrCreateParams) -> AuthResult<ProvisionOutcome> {
        let mut tx = self.repo.begin_provisioning().await?;
        let existing = tx
            .find_token(&params.mobile_number, params.token_type)
            .await?;
        tx.commit().await?;

        match existing {
            Some(token) => Ok(ProvisionOutcome {
                token,
                is_created: false,
            }),
            None => {
                warn!(
                    mobile_number = %params.mobile_number,
                    token_type = %params.token_type,
                    "conflicting provisioning attempt left no row behind"
                );
                Err(AuthError::Conflict(format!(
                    "external access token for {} ({})",
                    params.mobile_number, params.token_type
                )))
            }
        }
    }
}
