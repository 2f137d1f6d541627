//! Registration token issuance and session binding.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::VerificationError;
use crate::models::{AppSession, SessionSourceOfTrust, TeleTanType};
use crate::services::hashing;
use crate::storage::{SessionStore, StorageError};

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    tan_counter_max: i32,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionStore>, tan_counter_max: i32) -> Self {
        Self {
            sessions,
            tan_counter_max,
        }
    }

    /// An opaque 128-bit registration token. The raw value is handed out
    /// once; only its digest is stored.
    fn new_registration_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// Bind a hashed GUID (and optionally its date-of-birth variant) to a
    /// fresh registration token.
    ///
    /// The pre-check gives a clean answer for the common case; the store's
    /// unique constraints close the remaining check-then-insert window, so
    /// of two racing registrations exactly one wins.
    pub async fn register_by_guid(
        &self,
        hashed_guid: &str,
        hashed_guid_dob: Option<&str>,
    ) -> Result<String, VerificationError> {
        if self
            .sessions
            .identity_exists(hashed_guid, hashed_guid_dob)
            .await?
        {
            tracing::warn!("A registration token already exists for the hashed guid");
            return Err(VerificationError::Conflict);
        }

        let token = Self::new_registration_token();
        let mut session = AppSession::new(hashing::hash(&token), SessionSourceOfTrust::HashedGuid);
        session.hashed_guid = Some(hashed_guid.to_string());
        session.hashed_guid_dob = hashed_guid_dob.map(str::to_string);

        match self.sessions.insert(session).await {
            Ok(_) => {
                tracing::info!("Generated a new registration token for a hashed guid");
                Ok(token)
            }
            Err(StorageError::Duplicate) => Err(VerificationError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    /// Bind a TeleTAN digest to a fresh registration token. The caller is
    /// responsible for checking the TeleTAN credential first and redeeming
    /// it afterwards; the unique TeleTAN digest column makes sure at most
    /// one session ever comes out of a single TeleTAN.
    pub async fn register_by_tele_tan(
        &self,
        tele_tan: &str,
        tele_tan_type: Option<TeleTanType>,
    ) -> Result<String, VerificationError> {
        let tele_tan_hash = hashing::hash(tele_tan);
        if self.sessions.tele_tan_hash_exists(&tele_tan_hash).await? {
            tracing::warn!("A registration token already exists for this TeleTAN");
            return Err(VerificationError::Conflict);
        }

        let token = Self::new_registration_token();
        let mut session = AppSession::new(hashing::hash(&token), SessionSourceOfTrust::Teletan);
        session.tele_tan_hash = Some(tele_tan_hash);
        session.tele_tan_type = tele_tan_type;

        match self.sessions.insert(session).await {
            Ok(_) => {
                tracing::info!("Generated a new registration token for a TeleTAN");
                Ok(token)
            }
            Err(StorageError::Duplicate) => Err(VerificationError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up the session for a raw registration token.
    pub async fn get_session_by_token(
        &self,
        registration_token: &str,
    ) -> Result<Option<AppSession>, VerificationError> {
        Ok(self
            .sessions
            .find_by_token_hash(&hashing::hash(registration_token))
            .await?)
    }

    /// Increment the session's TAN counter, refusing at the configured
    /// ceiling. Losing a concurrent increment surfaces as a version
    /// conflict; the session is then reloaded and the ceiling rechecked, so
    /// the counter never overshoots and never clobbers a parallel writer.
    pub async fn increment_tan_counter(
        &self,
        session: AppSession,
    ) -> Result<AppSession, VerificationError> {
        match self.try_increment(session.clone()).await {
            Err(VerificationError::Storage(StorageError::VersionConflict)) => {
                let current = self
                    .sessions
                    .find_by_token_hash(&session.registration_token_hash)
                    .await?
                    .ok_or(VerificationError::SessionNotFound)?;
                self.try_increment(current).await
            }
            other => other,
        }
    }

    async fn try_increment(
        &self,
        mut session: AppSession,
    ) -> Result<AppSession, VerificationError> {
        if session.tan_counter >= self.tan_counter_max {
            tracing::warn!(
                tan_counter = session.tan_counter,
                "The maximum number of TANs for this session is reached"
            );
            return Err(VerificationError::TanLimitExceeded);
        }
        session.tan_counter += 1;
        Ok(self.sessions.update(session).await?)
    }
}
