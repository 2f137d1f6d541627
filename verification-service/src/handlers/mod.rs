pub mod fake;
pub mod internal;
pub mod registration;
pub mod tan;
pub mod test_result;

use axum::http::HeaderMap;
use service_core::error::AppError;

use crate::error::VerificationError;

/// Request header flagging a decoy request. Decoys receive a structurally
/// valid, non-binding response shaped to be latency-indistinguishable from
/// genuine traffic.
pub const FAKE_HEADER: &str = "X-Verification-Fake";

/// Response header carrying the TeleTAN classification of a redeemed TAN.
pub const TELETAN_TYPE_HEADER: &str = "X-Verification-TeleTAN-Type";

pub(crate) fn is_fake(headers: &HeaderMap) -> bool {
    headers
        .get(FAKE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Fallback mapping for failures the route does not classify itself.
pub(crate) fn unhandled(error: VerificationError) -> AppError {
    match error {
        VerificationError::Storage(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        VerificationError::Oracle(e) => AppError::BadGateway(e.to_string()),
        other => AppError::BadRequest(anyhow::Error::new(other)),
    }
}
