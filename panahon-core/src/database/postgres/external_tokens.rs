use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use super::PostgresStore;
use crate::{
    database::{
        StoreError, StoreResult,
        ports::{ExternalTokenRepository, ProvisioningTx},
    },
    telco::{ExternalAccessToken, ExternalTokenType, FirstOrCreateParams},
};

#[derive(sqlx::FromRow)]
struct ExternalTokenRow {
    access_token: String,
    mobile_number: String,
    token_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExternalTokenRow> for ExternalAccessToken {
    type Error = StoreError;

    fn try_from(row: ExternalTokenRow) -> Result<Self, Self::Error> {
        Ok(ExternalAccessToken {
            token_type: row.token_type.parse().map_err(StoreError::Internal)?,
            access_token: row.access_token,
            mobile_number: row.mobile_number,
            created_at: row.created_at,
        })
    }
}

const FIND_TOKEN: &str = r#"
    SELECT access_token, mobile_number, type AS token_type, created_at
    FROM sim_access_tokens
    WHERE mobile_number = $1 AND type = $2
    LIMIT 1
"#;

#[async_trait]
impl ExternalTokenRepository for PostgresStore {
    async fn begin_provisioning(&self) -> StoreResult<Box<dyn ProvisioningTx>> {
        let mut tx = self.pool().begin().await?;
        // Losing racers surface as 23505 or 40001, both mapped to Conflict.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PostgresProvisioningTx { tx: Some(tx) }))
    }

    async fn get_external_token(
        &self,
        mobile_number: &str,
        token_type: ExternalTokenType,
    ) -> StoreResult<Option<ExternalAccessToken>> {
        sqlx::query_as::<_, ExternalTokenRow>(FIND_TOKEN)
            .bind(mobile_number)
            .bind(token_type.as_str())
            .fetch_optional(self.pool())
            .await?
            .map(ExternalAccessToken::try_from)
            .transpose()
    }
}

/// Provisioning transaction on a pooled connection. Dropping it before
/// `commit` returns the connection with the transaction rolled back.
pub struct PostgresProvisioningTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl fmt::Debug for PostgresProvisioningTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresProvisioningTx")
            .field("open", &self.tx.is_some())
            .finish()
    }
}

impl PostgresProvisioningTx {
    fn tx(&mut self) -> StoreResult<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Internal("provisioning transaction already finished".into()))
    }
}

#[async_trait]
impl ProvisioningTx for PostgresProvisioningTx {
    async fn find_token(
        &mut self,
        mobile_number: &str,
        token_type: ExternalTokenType,
    ) -> StoreResult<Option<ExternalAccessToken>> {
        let tx = self.tx()?;
        sqlx::query_as::<_, ExternalTokenRow>(FIND_TOKEN)
            .bind(mobile_number)
            .bind(token_type.as_str())
            .fetch_optional(&mut **tx)
            .await?
            .map(ExternalAccessToken::try_from)
            .transpose()
    }

    async fn ensure_sim_card(
        &mut self,
        mobile_number: &str,
        mobile_number_type: Option<&str>,
    ) -> StoreResult<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO sim_cards (mobile_number, type)
            VALUES ($1, $2)
            ON CONFLICT (mobile_number) DO NOTHING
            "#,
        )
        .bind(mobile_number)
        .bind(mobile_number_type)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_token(
        &mut self,
        params: &FirstOrCreateParams,
    ) -> StoreResult<ExternalAccessToken> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, ExternalTokenRow>(
            r#"
            INSERT INTO sim_access_tokens (access_token, type, mobile_number)
            VALUES ($1, $2, $3)
            RETURNING access_token, mobile_number, type AS token_type, created_at
            "#,
        )
        .bind(&params.access_token)
        .bind(params.token_type.as_str())
        .bind(&params.mobile_number)
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Internal("provisioning transaction already finished".into()))?;
        tx.commit().await?;
        Ok(())
    }
}
