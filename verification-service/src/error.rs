use thiserror::Error;

use crate::storage::StorageError;

/// Domain failures. These are mapped to transport status codes in the
/// handlers, never inside the services.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("The identity is already bound to a registration token")]
    Conflict,

    #[error("The credential is unknown, expired or already redeemed")]
    InvalidCredential,

    #[error("The credential does not match the required syntax")]
    MalformedCredential,

    #[error("No session found for the registration token")]
    SessionNotFound,

    #[error("The maximum number of TANs for this registration token is reached")]
    TanLimitExceeded,

    #[error("The TeleTAN rate limit is exceeded")]
    RateLimited,

    #[error("Authorization failed")]
    Unauthorized,

    #[error("The test results for the bound identity digests disagree")]
    Inconsistent,

    #[error("The test result does not permit TAN issuance")]
    Rejected,

    #[error("Unknown source of trust for the session")]
    UnknownSourceOfTrust,

    #[error("Result server request failed: {0}")]
    Oracle(#[source] anyhow::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
