use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tan::TeleTanType;

/// How the holder of a registration token proved its claim: a hashed test
/// GUID from a connected lab, or an operator-issued TeleTAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionSourceOfTrust {
    HashedGuid,
    Teletan,
}

impl SessionSourceOfTrust {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSourceOfTrust::HashedGuid => "HASHED_GUID",
            SessionSourceOfTrust::Teletan => "TELETAN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HASHED_GUID" => Some(SessionSourceOfTrust::HashedGuid),
            "TELETAN" => Some(SessionSourceOfTrust::Teletan),
            _ => None,
        }
    }
}

/// One session per issued registration token. Holds only digests; the raw
/// token and the raw identity never touch storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSession {
    pub id: Uuid,
    /// Optimistic concurrency counter; bumped on every persisted update.
    pub version: i64,
    pub registration_token_hash: String,
    pub hashed_guid: Option<String>,
    /// Alternate identity digest (date-of-birth variant); at most one
    /// session may bind a given digest through either column.
    pub hashed_guid_dob: Option<String>,
    pub tele_tan_hash: Option<String>,
    pub tan_counter: i32,
    pub source_of_trust: SessionSourceOfTrust,
    pub tele_tan_type: Option<TeleTanType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppSession {
    pub fn new(registration_token_hash: String, source_of_trust: SessionSourceOfTrust) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: 0,
            registration_token_hash,
            hashed_guid: None,
            hashed_guid_dob: None,
            tele_tan_hash: None,
            tan_counter: 0,
            source_of_trust,
            tele_tan_type: None,
            created_at: now,
            updated_at: now,
        }
    }
}
