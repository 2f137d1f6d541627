use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credential kind: a machine TAN or an operator-issued TeleTAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TanType {
    Tan,
    Teletan,
}

impl TanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TanType::Tan => "TAN",
            TanType::Teletan => "TELETAN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TAN" => Some(TanType::Tan),
            "TELETAN" => Some(TanType::Teletan),
            _ => None,
        }
    }
}

/// Provenance of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TanSourceOfTrust {
    ConnectedLab,
    Teletan,
}

impl TanSourceOfTrust {
    pub fn as_str(&self) -> &'static str {
        match self {
            TanSourceOfTrust::ConnectedLab => "CONNECTED_LAB",
            TanSourceOfTrust::Teletan => "TELETAN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CONNECTED_LAB" => Some(TanSourceOfTrust::ConnectedLab),
            "TELETAN" => Some(TanSourceOfTrust::Teletan),
            _ => None,
        }
    }
}

/// Classification of a TeleTAN: issued against a test result via hotline,
/// or for an event attendance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeleTanType {
    Test,
    Event,
}

impl TeleTanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeleTanType::Test => "TEST",
            TeleTanType::Event => "EVENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TEST" => Some(TeleTanType::Test),
            "EVENT" => Some(TeleTanType::Event),
            _ => None,
        }
    }
}

/// A stored credential. Only the SHA-256 digest of the raw value is ever
/// persisted; the raw value leaves the service exactly once, at generation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationTan {
    pub id: Uuid,
    /// Optimistic concurrency counter; bumped on every persisted update.
    pub version: i64,
    pub tan_hash: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub source_of_trust: TanSourceOfTrust,
    pub redeemed: bool,
    pub tan_type: TanType,
    pub tele_tan_type: Option<TeleTanType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationTan {
    pub fn new(
        tan_hash: String,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        source_of_trust: TanSourceOfTrust,
        tan_type: TanType,
        tele_tan_type: Option<TeleTanType>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: 0,
            tan_hash,
            valid_from,
            valid_until,
            source_of_trust,
            redeemed: false,
            tan_type,
            tele_tan_type,
            created_at: now,
            updated_at: now,
        }
    }

    /// A credential is usable while inside its validity window and not yet
    /// redeemed.
    pub fn can_be_redeemed(&self, reference: DateTime<Utc>) -> bool {
        self.valid_from < reference && self.valid_until > reference && !self.redeemed
    }
}
