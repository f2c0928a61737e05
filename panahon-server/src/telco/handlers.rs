use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use panahon_core::telco::{ExternalTokenType, FirstOrCreateParams};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

pub const GLABS_MOBILE_NUMBER_TYPE: &str = "globe";
const COUNTRY_CODE: &str = "63";
const SUBSCRIBER_NUMBER_LENGTH: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct OptInQuery {
    pub access_token: Option<String>,
    pub subscriber_number: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OptInResponse {
    pub access_token: String,
    pub mobile_number: String,
    #[serde(rename = "type")]
    pub token_type: ExternalTokenType,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `63` followed by a ten digit subscriber number.
pub fn mobile_number_from_subscriber(subscriber_number: &str) -> Result<String, AppError> {
    if subscriber_number.len() != SUBSCRIBER_NUMBER_LENGTH
        || !subscriber_number.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(AppError::bad_request(format!(
            "subscriber_number must be {SUBSCRIBER_NUMBER_LENGTH} digits"
        )));
    }
    Ok(format!("{COUNTRY_CODE}{subscriber_number}"))
}

/// Globe Labs opt-in callback. SMS opt-ins carry the token directly; web
/// opt-ins carry a code that is exchanged first, outside any transaction.
pub async fn optin(
    State(state): State<AppState>,
    Query(query): Query<OptInQuery>,
) -> AppResult<(StatusCode, Json<OptInResponse>)> {
    let access_token = non_empty(query.access_token);
    let subscriber_number = non_empty(query.subscriber_number);
    let code = non_empty(query.code);

    let (access_token, subscriber_number) = match (access_token, subscriber_number, code) {
        (Some(token), Some(number), _) => (token, number),
        (_, _, Some(code)) => {
            let grant = state.glabs.exchange_code(&code).await.map_err(|err| {
                warn!(error = %err, "web opt-in code exchange failed");
                AppError::bad_gateway("Globe Labs code exchange failed")
            })?;
            (grant.access_token, grant.subscriber_number)
        }
        _ => {
            return Err(AppError::bad_request(
                "either access_token and subscriber_number, or code, is required",
            ));
        }
    };

    let mobile_number = mobile_number_from_subscriber(&subscriber_number)?;

    let outcome = state
        .provisioner
        .first_or_create_access_token(&FirstOrCreateParams {
            access_token,
            token_type: ExternalTokenType::Glabs,
            mobile_number,
            mobile_number_type: Some(GLABS_MOBILE_NUMBER_TYPE.to_string()),
        })
        .await?;

    let status = if outcome.is_created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(OptInResponse {
            access_token: outcome.token.access_token,
            mobile_number: outcome.token.mobile_number,
            token_type: outcome.token.token_type,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_number_gets_country_code() {
        assert_eq!(
            mobile_number_from_subscriber("9171234567").unwrap(),
            "639171234567"
        );
    }

    #[test]
    fn malformed_subscriber_numbers_are_rejected() {
        for bad in ["invalid-number", "1712345", "91712345678", "91712345x7", ""] {
            let err = mobile_number_from_subscriber(bad).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "{bad}");
        }
    }
}
