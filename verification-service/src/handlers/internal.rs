//! Routes of the internal profile: TAN verification for the upload backend
//! and TeleTAN issuance for authorized operators.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use service_core::error::AppError;

use super::{unhandled, TELETAN_TYPE_HEADER};
use crate::dtos::{
    self, InternalTestResultResponse, RegistrationToken, TanVerificationRequest, TeleTanResponse,
};
use crate::error::VerificationError;
use crate::models::{SessionSourceOfTrust, TeleTanType};
use crate::services::AuthorizationRole;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /version/v1/tan/verify
///
/// Verifies a TAN and redeems it exactly once. Unknown, expired and
/// already-redeemed all collapse into 404; only a syntactically impossible
/// value is distinguished as 400.
pub async fn verify_tan(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<TanVerificationRequest>,
) -> Result<Response, AppError> {
    let redeemed = state
        .tan_service
        .verify_and_redeem(&request.tan)
        .await
        .map_err(|e| match e {
            VerificationError::MalformedCredential => {
                AppError::BadRequest(anyhow::anyhow!("The TAN syntax is invalid"))
            }
            VerificationError::InvalidCredential => {
                AppError::NotFound(anyhow::anyhow!("No TAN found or the TAN is invalid"))
            }
            other => unhandled(other),
        })?;

    tracing::info!("The TAN is valid and was redeemed");

    let mut response = StatusCode::OK.into_response();
    if let Some(tele_tan_type) = redeemed.tele_tan_type {
        if let Ok(value) = HeaderValue::from_str(tele_tan_type.as_str()) {
            response.headers_mut().insert(
                header::HeaderName::from_static("x-verification-teletan-type"),
                value,
            );
        }
    }
    Ok(response)
}

/// POST /version/v1/tan/teletan
///
/// Issues a TeleTAN to an operator holding the role matching the requested
/// TeleTAN type.
pub async fn create_tele_tan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let tele_tan_type = match headers.get(TELETAN_TYPE_HEADER) {
        None => TeleTanType::Test,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(TeleTanType::parse)
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Unknown TeleTAN type requested"))
            })?,
    };

    let required_roles = match tele_tan_type {
        TeleTanType::Test => [AuthorizationRole::Hotline],
        TeleTanType::Event => [AuthorizationRole::HotlineEvent],
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !state.jwt.is_authorized(authorization, &required_roles) {
        return Err(AppError::Unauthorized(anyhow::anyhow!("JWT is invalid")));
    }

    if !state
        .tan_service
        .is_tele_tan_rate_limit_ok(tele_tan_type)
        .await
        .map_err(unhandled)?
    {
        return Err(AppError::TooManyRequests(
            "Rate limit exceeded. Try again later.".to_string(),
            None,
        ));
    }

    let tele_tan = state
        .tan_service
        .generate_tele_tan(tele_tan_type)
        .await
        .map_err(unhandled)?;

    tracing::info!("The TeleTAN was generated");
    Ok((StatusCode::CREATED, Json(TeleTanResponse { tele_tan })).into_response())
}

/// POST /version/v1/testresult (internal profile)
///
/// Like the external variant, but refuses TeleTAN-sourced sessions and
/// includes the identity digest the result belongs to.
pub async fn get_test_result(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegistrationToken>,
) -> Result<Response, AppError> {
    if !dtos::is_registration_token_valid(&request.registration_token) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "The registration token has no valid pattern"
        )));
    }

    let session = state
        .session_service
        .get_session_by_token(&request.registration_token)
        .await
        .map_err(unhandled)?
        .ok_or_else(|| {
            tracing::info!("The registration token does not exist");
            AppError::NotFound(anyhow::anyhow!("Registration token not found"))
        })?;

    match session.source_of_trust {
        SessionSourceOfTrust::HashedGuid => {
            let result = super::test_result::fetch_agreed_result(&state, &session).await?;
            let hashed_guid = session.hashed_guid.clone().unwrap_or_default();
            tracing::info!("Returning the internal result for a hashed guid token");
            Ok((
                StatusCode::OK,
                Json(InternalTestResultResponse {
                    test_result: result.test_result,
                    sc: result.sc,
                    lab_id: result.lab_id,
                    response_padding: result.response_padding,
                    hashed_guid,
                }),
            )
                .into_response())
        }
        SessionSourceOfTrust::Teletan => {
            tracing::info!("The internal test state is not available for TeleTAN tokens");
            Err(AppError::Forbidden(anyhow::anyhow!(
                "The internal test state is not available for TeleTAN tokens"
            )))
        }
    }
}
