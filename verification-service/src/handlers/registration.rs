use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;

use service_core::error::AppError;

use super::{fake, is_fake, unhandled};
use crate::dtos::{
    self, RegistrationKeyType, RegistrationTokenRequest, RegistrationTokenResponse,
};
use crate::error::VerificationError;
use crate::services::{hashing, DelayClass};
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /version/v1/registrationToken
///
/// Issues a registration token for a hashed GUID or a TeleTAN. The raw
/// token appears in this response and nowhere else, ever.
pub async fn generate_registration_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<RegistrationTokenRequest>,
) -> Result<Response, AppError> {
    if is_fake(&headers) {
        return Ok(fake::registration_token(&state).await);
    }

    if let Some(key_dob) = request.key_dob.as_deref() {
        if !dtos::is_dob_hash_valid(key_dob) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "The dob hash has no valid pattern"
            )));
        }
    }

    let started = Instant::now();
    let token = match request.key_type {
        RegistrationKeyType::Guid => register_by_guid(&state, &request).await?,
        RegistrationKeyType::TeleTan => register_by_tele_tan(&state, &request).await?,
    };

    state
        .fake_delay
        .record_real_duration(DelayClass::Token, started.elapsed());
    tokio::time::sleep(state.fake_delay.equalizing_delay(DelayClass::Token)).await;

    tracing::info!("Returning the successfully generated registration token");
    Ok((
        StatusCode::CREATED,
        Json(RegistrationTokenResponse {
            registration_token: token,
            response_padding: None,
        }),
    )
        .into_response())
}

async fn register_by_guid(
    state: &AppState,
    request: &RegistrationTokenRequest,
) -> Result<String, AppError> {
    if !hashing::is_hash_valid(&request.key) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "The hashed guid has no valid pattern"
        )));
    }

    state
        .session_service
        .register_by_guid(&request.key, request.key_dob.as_deref())
        .await
        .map_err(|e| match e {
            VerificationError::Conflict => AppError::BadRequest(anyhow::anyhow!(
                "A registration token already exists for the hashed guid"
            )),
            other => unhandled(other),
        })
}

async fn register_by_tele_tan(
    state: &AppState,
    request: &RegistrationTokenRequest,
) -> Result<String, AppError> {
    let invalid =
        |_| AppError::BadRequest(anyhow::anyhow!("The TeleTAN verification failed"));

    let tele_tan = state
        .tan_service
        .get_redeemable_tele_tan(&request.key)
        .await
        .map_err(invalid)?;

    // The unique TeleTAN digest on the session makes this the exclusive
    // winner before the credential itself gets flagged.
    let token = state
        .session_service
        .register_by_tele_tan(&request.key, tele_tan.tele_tan_type)
        .await
        .map_err(invalid)?;

    state.tan_service.redeem(tele_tan).await.map_err(invalid)?;

    Ok(token)
}
