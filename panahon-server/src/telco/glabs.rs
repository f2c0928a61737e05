//! Globe Labs authorization-code exchange for web opt-ins.

use std::{fmt, time::Duration};

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::infra::config::GlabsConfig;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum GlabsError {
    #[error("Globe Labs credentials are not configured")]
    NotConfigured,
    #[error("Globe Labs request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Globe Labs rejected the code exchange with status {0}")]
    Rejected(StatusCode),
}

/// What Globe Labs returns for a successful opt-in.
#[derive(Clone, Deserialize)]
pub struct OptInGrant {
    pub access_token: String,
    pub subscriber_number: String,
}

impl fmt::Debug for OptInGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptInGrant")
            .field("subscriber_number", &self.subscriber_number)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct GlabsClient {
    http: reqwest::Client,
    config: GlabsConfig,
}

impl fmt::Debug for GlabsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlabsClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GlabsClient {
    pub fn new(config: &GlabsConfig) -> Result<Self, GlabsError> {
        let http = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Trade a web opt-in `code` for the subscriber's access token.
    pub async fn exchange_code(&self, code: &str) -> Result<OptInGrant, GlabsError> {
        if !self.config.is_configured() {
            return Err(GlabsError::NotConfigured);
        }

        let url = format!("{}/oauth/access_token", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("app_id", self.config.app_id.as_str()),
                ("app_secret", self.config.app_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Globe Labs code exchange rejected");
            return Err(GlabsError::Rejected(status));
        }

        let grant: OptInGrant = response.json().await?;
        debug!(subscriber_number = %grant.subscriber_number, "Globe Labs code exchanged");
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use zeroize::Zeroizing;

    use super::*;

    #[tokio::test]
    async fn exchange_without_both_credentials_is_refused() {
        for (app_id, app_secret) in [("", ""), ("app-id", ""), ("", "app-secret")] {
            let client = GlabsClient::new(&GlabsConfig {
                app_id: app_id.into(),
                app_secret: Zeroizing::new(app_secret.into()),
                base_url: "http://127.0.0.1:9".into(),
            })
            .unwrap();

            assert!(matches!(
                client.exchange_code("web-code").await,
                Err(GlabsError::NotConfigured)
            ));
        }
    }
}
