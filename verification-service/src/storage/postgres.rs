//! PostgreSQL store implementations.
//!
//! Explicit keyed queries over indexed digest columns; identity uniqueness
//! comes from unique constraints, redemption and counter updates from an
//! optimistic version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::{SessionStore, StorageError, TanStore};
use crate::models::{
    AppSession, SessionSourceOfTrust, TanSourceOfTrust, TanType, TeleTanType, VerificationTan,
};

/// Create the schema if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS app_session (
            id UUID PRIMARY KEY,
            version BIGINT NOT NULL,
            registration_token_hash TEXT NOT NULL UNIQUE,
            hashed_guid TEXT UNIQUE,
            hashed_guid_dob TEXT UNIQUE,
            tele_tan_hash TEXT UNIQUE,
            tan_counter INT NOT NULL,
            sot TEXT NOT NULL,
            teletan_type TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(map_db_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tan (
            id UUID PRIMARY KEY,
            version BIGINT NOT NULL,
            tan_hash TEXT NOT NULL UNIQUE,
            valid_from TIMESTAMPTZ NOT NULL,
            valid_until TIMESTAMPTZ NOT NULL,
            sot TEXT NOT NULL,
            redeemed BOOLEAN NOT NULL,
            type TEXT NOT NULL,
            teletan_type TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(map_db_err)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tan_created_type ON tan (created_at, type)")
        .execute(pool)
        .await
        .map_err(map_db_err)?;

    Ok(())
}

fn map_db_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        // 23505 = unique_violation
        if db.code().as_deref() == Some("23505") {
            return StorageError::Duplicate;
        }
    }
    StorageError::Database(anyhow::Error::new(e))
}

fn bad_column(column: &str, value: &str) -> StorageError {
    StorageError::Database(anyhow::anyhow!(
        "Unexpected value {value:?} in column {column}"
    ))
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &PgRow) -> Result<AppSession, StorageError> {
    let sot: String = row.try_get("sot").map_err(map_db_err)?;
    let teletan_type: Option<String> = row.try_get("teletan_type").map_err(map_db_err)?;
    Ok(AppSession {
        id: row.try_get("id").map_err(map_db_err)?,
        version: row.try_get("version").map_err(map_db_err)?,
        registration_token_hash: row
            .try_get("registration_token_hash")
            .map_err(map_db_err)?,
        hashed_guid: row.try_get("hashed_guid").map_err(map_db_err)?,
        hashed_guid_dob: row.try_get("hashed_guid_dob").map_err(map_db_err)?,
        tele_tan_hash: row.try_get("tele_tan_hash").map_err(map_db_err)?,
        tan_counter: row.try_get("tan_counter").map_err(map_db_err)?,
        source_of_trust: SessionSourceOfTrust::parse(&sot)
            .ok_or_else(|| bad_column("sot", &sot))?,
        tele_tan_type: teletan_type
            .map(|t| TeleTanType::parse(&t).ok_or_else(|| bad_column("teletan_type", &t)))
            .transpose()?,
        created_at: row.try_get("created_at").map_err(map_db_err)?,
        updated_at: row.try_get("updated_at").map_err(map_db_err)?,
    })
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: AppSession) -> Result<AppSession, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO app_session
                (id, version, registration_token_hash, hashed_guid, hashed_guid_dob,
                 tele_tan_hash, tan_counter, sot, teletan_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(session.version)
        .bind(&session.registration_token_hash)
        .bind(&session.hashed_guid)
        .bind(&session.hashed_guid_dob)
        .bind(&session.tele_tan_hash)
        .bind(session.tan_counter)
        .bind(session.source_of_trust.as_str())
        .bind(session.tele_tan_type.map(|t| t.as_str()))
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(session)
    }

    async fn update(&self, mut session: AppSession) -> Result<AppSession, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE app_session
            SET version = version + 1, tan_counter = $1, updated_at = $2
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(session.tan_counter)
        .bind(now)
        .bind(session.id)
        .bind(session.version)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::VersionConflict);
        }
        session.version += 1;
        session.updated_at = now;
        Ok(session)
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AppSession>, StorageError> {
        let row = sqlx::query("SELECT * FROM app_session WHERE registration_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn identity_exists(
        &self,
        hashed_guid: &str,
        hashed_guid_dob: Option<&str>,
    ) -> Result<bool, StorageError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM app_session
                WHERE hashed_guid = $1 OR hashed_guid_dob = $1
                   OR ($2::TEXT IS NOT NULL AND (hashed_guid = $2 OR hashed_guid_dob = $2))
            )
            "#,
        )
        .bind(hashed_guid)
        .bind(hashed_guid_dob)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(exists)
    }

    async fn tele_tan_hash_exists(&self, tele_tan_hash: &str) -> Result<bool, StorageError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM app_session WHERE tele_tan_hash = $1)",
        )
        .bind(tele_tan_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(exists)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM app_session WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgTanStore {
    pool: PgPool,
}

impl PgTanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_tan(row: &PgRow) -> Result<VerificationTan, StorageError> {
    let sot: String = row.try_get("sot").map_err(map_db_err)?;
    let tan_type: String = row.try_get("type").map_err(map_db_err)?;
    let teletan_type: Option<String> = row.try_get("teletan_type").map_err(map_db_err)?;
    Ok(VerificationTan {
        id: row.try_get("id").map_err(map_db_err)?,
        version: row.try_get("version").map_err(map_db_err)?,
        tan_hash: row.try_get("tan_hash").map_err(map_db_err)?,
        valid_from: row.try_get("valid_from").map_err(map_db_err)?,
        valid_until: row.try_get("valid_until").map_err(map_db_err)?,
        source_of_trust: TanSourceOfTrust::parse(&sot).ok_or_else(|| bad_column("sot", &sot))?,
        redeemed: row.try_get("redeemed").map_err(map_db_err)?,
        tan_type: TanType::parse(&tan_type).ok_or_else(|| bad_column("type", &tan_type))?,
        tele_tan_type: teletan_type
            .map(|t| TeleTanType::parse(&t).ok_or_else(|| bad_column("teletan_type", &t)))
            .transpose()?,
        created_at: row.try_get("created_at").map_err(map_db_err)?,
        updated_at: row.try_get("updated_at").map_err(map_db_err)?,
    })
}

#[async_trait]
impl TanStore for PgTanStore {
    async fn insert(&self, tan: VerificationTan) -> Result<VerificationTan, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO tan
                (id, version, tan_hash, valid_from, valid_until, sot, redeemed,
                 type, teletan_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(tan.id)
        .bind(tan.version)
        .bind(&tan.tan_hash)
        .bind(tan.valid_from)
        .bind(tan.valid_until)
        .bind(tan.source_of_trust.as_str())
        .bind(tan.redeemed)
        .bind(tan.tan_type.as_str())
        .bind(tan.tele_tan_type.map(|t| t.as_str()))
        .bind(tan.created_at)
        .bind(tan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(tan)
    }

    async fn update(&self, mut tan: VerificationTan) -> Result<VerificationTan, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE tan
            SET version = version + 1, redeemed = $1, updated_at = $2
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(tan.redeemed)
        .bind(now)
        .bind(tan.id)
        .bind(tan.version)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::VersionConflict);
        }
        tan.version += 1;
        tan.updated_at = now;
        Ok(tan)
    }

    async fn find_by_tan_hash(
        &self,
        tan_hash: &str,
    ) -> Result<Option<VerificationTan>, StorageError> {
        let row = sqlx::query("SELECT * FROM tan WHERE tan_hash = $1")
            .bind(tan_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.as_ref().map(row_to_tan).transpose()
    }

    async fn exists_by_tan_hash(&self, tan_hash: &str) -> Result<bool, StorageError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tan WHERE tan_hash = $1)")
                .bind(tan_hash)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)?;
        Ok(exists)
    }

    async fn count_tele_tans_created_after(
        &self,
        after: DateTime<Utc>,
        tele_tan_type: TeleTanType,
    ) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tan WHERE created_at > $1 AND type = $2 AND teletan_type = $3",
        )
        .bind(after)
        .bind(TanType::Teletan.as_str())
        .bind(tele_tan_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(count)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM tan WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }
}
