//! Decoy responses. They never touch storage: the bodies are fabricated,
//! structurally valid values whose latency follows the per-class jitter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::dtos::{RegistrationTokenResponse, TanResponse};
use crate::models::{LabTestResult, TestResult};
use crate::services::fake_delay::response_padding;
use crate::services::DelayClass;
use crate::AppState;

const TOKEN_PADDING_LENGTH: usize = 1;
const TAN_PADDING_LENGTH: usize = 15;
const TEST_RESULT_PADDING_LENGTH: usize = 45;

pub async fn registration_token(state: &AppState) -> Response {
    let delay = state.fake_delay.jittered_delay(DelayClass::Token);
    tokio::time::sleep(delay).await;
    (
        StatusCode::CREATED,
        Json(RegistrationTokenResponse {
            registration_token: Uuid::new_v4().to_string(),
            response_padding: Some(response_padding(TOKEN_PADDING_LENGTH)),
        }),
    )
        .into_response()
}

pub async fn tan(state: &AppState) -> Response {
    let delay = state.fake_delay.jittered_delay(DelayClass::Tan);
    tokio::time::sleep(delay).await;
    (
        StatusCode::CREATED,
        Json(TanResponse {
            tan: Uuid::new_v4().to_string(),
            response_padding: Some(response_padding(TAN_PADDING_LENGTH)),
        }),
    )
        .into_response()
}

pub async fn test_result(state: &AppState) -> Response {
    let delay = state.fake_delay.jittered_delay(DelayClass::TestResult);
    tokio::time::sleep(delay).await;
    let mut body = TestResult::new(LabTestResult::Positive.code());
    body.response_padding = Some(response_padding(TEST_RESULT_PADDING_LENGTH));
    (StatusCode::OK, Json(body)).into_response()
}
