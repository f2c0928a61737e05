//! Third-party (telco) access tokens keyed by mobile number.

pub mod provisioner;

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use provisioner::{ProvisionOutcome, TokenProvisioner};

/// Which integration an external access token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExternalTokenType {
    Sms,
    Web,
    Glabs,
}

impl ExternalTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalTokenType::Sms => "SMS",
            ExternalTokenType::Web => "WEB",
            ExternalTokenType::Glabs => "GLABS",
        }
    }
}

impl fmt::Display for ExternalTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExternalTokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SMS" => Ok(ExternalTokenType::Sms),
            "WEB" => Ok(ExternalTokenType::Web),
            "GLABS" => Ok(ExternalTokenType::Glabs),
            other => Err(format!("unknown external token type: {other}")),
        }
    }
}

/// At most one row exists per `(mobile_number, token_type)`. Rows are never
/// updated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccessToken {
    pub access_token: String,
    pub mobile_number: String,
    #[serde(rename = "type")]
    pub token_type: ExternalTokenType,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for ExternalAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalAccessToken")
            .field("mobile_number", &self.mobile_number)
            .field("token_type", &self.token_type)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Input to [`TokenProvisioner::first_or_create_access_token`].
#[derive(Clone, PartialEq, Eq)]
pub struct FirstOrCreateParams {
    pub access_token: String,
    pub token_type: ExternalTokenType,
    pub mobile_number: String,
    pub mobile_number_type: Option<String>,
}

impl fmt::Debug for FirstOrCreateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstOrCreateParams")
            .field("token_type", &self.token_type)
            .field("mobile_number", &self.mobile_number)
            .field("mobile_number_type", &self.mobile_number_type)
            .finish_non_exhaustive()
    }
}
