//! Persistence abstractions keyed by digest.
//!
//! Stores expose explicit keyed lookups and atomic writes; all cross-request
//! coordination (identity uniqueness, exactly-once redemption) happens at
//! this layer so it stays correct across multiple service instances.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AppSession, TeleTanType, VerificationTan};

#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique digest column was violated by an insert.
    #[error("A row with the same digest already exists")]
    Duplicate,

    /// An optimistic update lost against a concurrent writer.
    #[error("The row was modified concurrently")]
    VersionConflict,

    #[error("Database failure: {0}")]
    Database(#[source] anyhow::Error),
}

/// Session rows, one per registration token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session. Digest uniqueness (registration token, identity
    /// hashes, TeleTAN hash) is enforced atomically here; a violation is
    /// surfaced as [`StorageError::Duplicate`].
    async fn insert(&self, session: AppSession) -> Result<AppSession, StorageError>;

    /// Persist a modified session. The update only applies if the stored
    /// version still matches; the version is bumped on success.
    async fn update(&self, session: AppSession) -> Result<AppSession, StorageError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AppSession>, StorageError>;

    /// Whether any live session binds one of the given identity digests
    /// through either identity column.
    async fn identity_exists(
        &self,
        hashed_guid: &str,
        hashed_guid_dob: Option<&str>,
    ) -> Result<bool, StorageError>;

    async fn tele_tan_hash_exists(&self, tele_tan_hash: &str) -> Result<bool, StorageError>;

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Credential rows, one per issued TAN or TeleTAN.
#[async_trait]
pub trait TanStore: Send + Sync {
    async fn insert(&self, tan: VerificationTan) -> Result<VerificationTan, StorageError>;

    /// Persist a modified credential with an optimistic version check; used
    /// for the exactly-once redemption transition.
    async fn update(&self, tan: VerificationTan) -> Result<VerificationTan, StorageError>;

    async fn find_by_tan_hash(
        &self,
        tan_hash: &str,
    ) -> Result<Option<VerificationTan>, StorageError>;

    async fn exists_by_tan_hash(&self, tan_hash: &str) -> Result<bool, StorageError>;

    async fn count_tele_tans_created_after(
        &self,
        after: DateTime<Utc>,
        tele_tan_type: TeleTanType,
    ) -> Result<i64, StorageError>;

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}
