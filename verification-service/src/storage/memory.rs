//! In-memory store implementations with the same uniqueness and versioning
//! semantics as the Postgres backend. Used by the dev profile and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{SessionStore, StorageError, TanStore};
use crate::models::{AppSession, TanType, TeleTanType, VerificationTan};

#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    inner: Arc<Mutex<HashMap<Uuid, AppSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: AppSession) -> Result<AppSession, StorageError> {
        let mut rows = self.inner.lock().await;
        let duplicate = rows.values().any(|row| {
            row.registration_token_hash == session.registration_token_hash
                || matches(&row.hashed_guid, &session.hashed_guid)
                || matches(&row.hashed_guid, &session.hashed_guid_dob)
                || matches(&row.hashed_guid_dob, &session.hashed_guid)
                || matches(&row.hashed_guid_dob, &session.hashed_guid_dob)
                || matches(&row.tele_tan_hash, &session.tele_tan_hash)
        });
        if duplicate {
            return Err(StorageError::Duplicate);
        }
        rows.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update(&self, mut session: AppSession) -> Result<AppSession, StorageError> {
        let mut rows = self.inner.lock().await;
        match rows.get(&session.id) {
            Some(stored) if stored.version == session.version => {
                session.version += 1;
                session.updated_at = Utc::now();
                rows.insert(session.id, session.clone());
                Ok(session)
            }
            Some(_) => Err(StorageError::VersionConflict),
            None => Err(StorageError::VersionConflict),
        }
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AppSession>, StorageError> {
        let rows = self.inner.lock().await;
        Ok(rows
            .values()
            .find(|row| row.registration_token_hash == token_hash)
            .cloned())
    }

    async fn identity_exists(
        &self,
        hashed_guid: &str,
        hashed_guid_dob: Option<&str>,
    ) -> Result<bool, StorageError> {
        let rows = self.inner.lock().await;
        Ok(rows.values().any(|row| {
            let hits = |digest: &Option<String>| {
                digest.as_deref() == Some(hashed_guid)
                    || (hashed_guid_dob.is_some() && digest.as_deref() == hashed_guid_dob)
            };
            hits(&row.hashed_guid) || hits(&row.hashed_guid_dob)
        }))
    }

    async fn tele_tan_hash_exists(&self, tele_tan_hash: &str) -> Result<bool, StorageError> {
        let rows = self.inner.lock().await;
        Ok(rows
            .values()
            .any(|row| row.tele_tan_hash.as_deref() == Some(tele_tan_hash)))
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut rows = self.inner.lock().await;
        let before = rows.len();
        rows.retain(|_, row| row.created_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

fn matches(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTanStore {
    inner: Arc<Mutex<HashMap<Uuid, VerificationTan>>>,
}

impl InMemoryTanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TanStore for InMemoryTanStore {
    async fn insert(&self, tan: VerificationTan) -> Result<VerificationTan, StorageError> {
        let mut rows = self.inner.lock().await;
        if rows.values().any(|row| row.tan_hash == tan.tan_hash) {
            return Err(StorageError::Duplicate);
        }
        rows.insert(tan.id, tan.clone());
        Ok(tan)
    }

    async fn update(&self, mut tan: VerificationTan) -> Result<VerificationTan, StorageError> {
        let mut rows = self.inner.lock().await;
        match rows.get(&tan.id) {
            Some(stored) if stored.version == tan.version => {
                tan.version += 1;
                tan.updated_at = Utc::now();
                rows.insert(tan.id, tan.clone());
                Ok(tan)
            }
            Some(_) => Err(StorageError::VersionConflict),
            None => Err(StorageError::VersionConflict),
        }
    }

    async fn find_by_tan_hash(
        &self,
        tan_hash: &str,
    ) -> Result<Option<VerificationTan>, StorageError> {
        let rows = self.inner.lock().await;
        Ok(rows.values().find(|row| row.tan_hash == tan_hash).cloned())
    }

    async fn exists_by_tan_hash(&self, tan_hash: &str) -> Result<bool, StorageError> {
        let rows = self.inner.lock().await;
        Ok(rows.values().any(|row| row.tan_hash == tan_hash))
    }

    async fn count_tele_tans_created_after(
        &self,
        after: DateTime<Utc>,
        tele_tan_type: TeleTanType,
    ) -> Result<i64, StorageError> {
        let rows = self.inner.lock().await;
        Ok(rows
            .values()
            .filter(|row| {
                row.tan_type == TanType::Teletan
                    && row.tele_tan_type == Some(tele_tan_type)
                    && row.created_at > after
            })
            .count() as i64)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut rows = self.inner.lock().await;
        let before = rows.len();
        rows.retain(|_, row| row.created_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionSourceOfTrust, TanSourceOfTrust};
    use chrono::Duration;

    fn session(token_hash: &str, guid: Option<&str>) -> AppSession {
        let mut s = AppSession::new(token_hash.to_string(), SessionSourceOfTrust::HashedGuid);
        s.hashed_guid = guid.map(str::to_string);
        s
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_identity() {
        let store = InMemorySessionStore::new();
        store
            .insert(session(&"a".repeat(64), Some(&"b".repeat(64))))
            .await
            .unwrap();

        let err = store
            .insert(session(&"c".repeat(64), Some(&"b".repeat(64))))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Duplicate));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = InMemorySessionStore::new();
        let stored = store
            .insert(session(&"a".repeat(64), Some(&"b".repeat(64))))
            .await
            .unwrap();

        let mut first = stored.clone();
        first.tan_counter = 1;
        store.update(first).await.unwrap();

        // Second writer still holds version 0
        let mut second = stored;
        second.tan_counter = 2;
        let err = store.update(second).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict));
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_rows() {
        let store = InMemoryTanStore::new();
        let now = Utc::now();
        let mut old = VerificationTan::new(
            "a".repeat(64),
            now,
            now + Duration::days(1),
            TanSourceOfTrust::ConnectedLab,
            TanType::Tan,
            None,
        );
        old.created_at = now - Duration::days(30);
        store.insert(old).await.unwrap();
        store
            .insert(VerificationTan::new(
                "b".repeat(64),
                now,
                now + Duration::days(1),
                TanSourceOfTrust::ConnectedLab,
                TanType::Tan,
                None,
            ))
            .await
            .unwrap();

        let removed = store
            .delete_created_before(now - Duration::days(21))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.exists_by_tan_hash(&"b".repeat(64)).await.unwrap());
        assert!(!store.exists_by_tan_hash(&"a".repeat(64)).await.unwrap());
    }
}
