use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;

use service_core::error::AppError;

use super::{fake, is_fake, unhandled};
use crate::dtos::{self, RegistrationToken, TanResponse};
use crate::error::VerificationError;
use crate::models::{AppSession, LabTestResult, SessionSourceOfTrust, TanSourceOfTrust};
use crate::services::DelayClass;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /version/v1/tan
///
/// Issues an upload TAN against a registration token. GUID-sourced sessions
/// must present a positive lab result; TeleTAN-sourced sessions are trusted
/// as such.
pub async fn generate_tan(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<RegistrationToken>,
) -> Result<Response, AppError> {
    if is_fake(&headers) {
        return Ok(fake::tan(&state).await);
    }

    if !dtos::is_registration_token_valid(&request.registration_token) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "The registration token has no valid pattern"
        )));
    }

    let started = Instant::now();

    let session = state
        .session_service
        .get_session_by_token(&request.registration_token)
        .await
        .map_err(unhandled)?
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No session found for the registration token"
            ))
        })?;

    if session.tan_counter >= state.config.app_session.tan_counter_max {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "The maximum number of TANs for this registration token is reached"
        )));
    }

    let source_of_trust = match session.source_of_trust {
        SessionSourceOfTrust::HashedGuid => {
            check_lab_result(&state, &session).await?;
            TanSourceOfTrust::ConnectedLab
        }
        SessionSourceOfTrust::Teletan => TanSourceOfTrust::Teletan,
    };

    let session = state
        .session_service
        .increment_tan_counter(session)
        .await
        .map_err(|e| match e {
            VerificationError::TanLimitExceeded => AppError::BadRequest(anyhow::anyhow!(
                "The maximum number of TANs for this registration token is reached"
            )),
            other => unhandled(other),
        })?;

    let tan = state
        .tan_service
        .generate_tan(source_of_trust, session.tele_tan_type)
        .await
        .map_err(unhandled)?;

    state
        .fake_delay
        .record_real_duration(DelayClass::Tan, started.elapsed());
    tokio::time::sleep(state.fake_delay.equalizing_delay(DelayClass::Tan)).await;

    tracing::info!("Returning the successfully generated TAN");
    Ok((
        StatusCode::CREATED,
        Json(TanResponse {
            tan,
            response_padding: None,
        }),
    )
        .into_response())
}

/// Fetch the lab result for the session's identity digest(s) and require a
/// positive outcome. When a date-of-birth digest is bound, both results
/// must agree exactly; a mismatch means the registration bound an identity
/// it should not have.
async fn check_lab_result(state: &AppState, session: &AppSession) -> Result<(), AppError> {
    let hashed_guid = session.hashed_guid.as_deref().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown source of trust for the registration token"
        ))
    })?;

    let result = state
        .result_client
        .result(hashed_guid)
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    if let Some(hashed_guid_dob) = session.hashed_guid_dob.as_deref() {
        let result_dob = state
            .result_client
            .result(hashed_guid_dob)
            .await
            .map_err(|e| AppError::BadGateway(e.to_string()))?;

        if result_dob.test_result != result.test_result {
            tracing::warn!("The test results for the bound identity digests disagree");
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "The test result of the dob hash does not equal the test result of the hash"
            )));
        }
    }

    if !LabTestResult::is_positive(result.test_result) {
        tracing::info!(
            result = result.test_result,
            "TAN cannot be created for this lab result"
        );
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "TAN cannot be created, caused by the result of the lab server"
        )));
    }

    Ok(())
}
