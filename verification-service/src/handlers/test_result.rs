use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;

use service_core::error::AppError;

use super::{fake, is_fake, unhandled};
use crate::dtos::{self, RegistrationToken};
use crate::models::{AppSession, LabTestResult, SessionSourceOfTrust, TestResult};
use crate::services::DelayClass;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /version/v1/testresult (external profile)
///
/// Polls the lab result for a registration token. TeleTAN-sourced sessions
/// are positive by definition and never reach the result server.
pub async fn get_test_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<RegistrationToken>,
) -> Result<Response, AppError> {
    if is_fake(&headers) {
        return Ok(fake::test_result(&state).await);
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
            tracing::info!("The registration token does not exist");
            AppError::BadRequest(anyhow::anyhow!(
                "Returning the test result for the registration token failed"
            ))
        })?;

    let result = match session.source_of_trust {
        SessionSourceOfTrust::HashedGuid => {
            let result = fetch_agreed_result(&state, &session).await?;
            tracing::info!("Returning the result for a hashed guid registration token");
            result
        }
        SessionSourceOfTrust::Teletan => {
            tracing::info!("Returning the result for a TeleTAN registration token");
            TestResult::new(LabTestResult::Positive.code())
        }
    };

    state
        .fake_delay
        .record_real_duration(DelayClass::TestResult, started.elapsed());
    tokio::time::sleep(state.fake_delay.equalizing_delay(DelayClass::TestResult)).await;

    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Fetch the result for the primary digest, cross-checking the
/// date-of-birth digest when one is bound.
pub(crate) async fn fetch_agreed_result(
    state: &AppState,
    session: &AppSession,
) -> Result<TestResult, AppError> {
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

        // The result server answers for any digest, so equality of the two
        // results is the only signal that the dob digest belongs here.
        if result_dob.test_result != result.test_result {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "The test result of the dob hash does not equal the test result of the hash"
            )));
        }
    }

    Ok(result)
}
