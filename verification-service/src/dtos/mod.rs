use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Which kind of key a registration request presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RegistrationKeyType {
    #[serde(rename = "GUID")]
    Guid,
    #[serde(rename = "TELETAN")]
    TeleTan,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationTokenRequest {
    #[validate(length(min = 1, max = 128))]
    pub key: String,

    pub key_type: RegistrationKeyType,

    /// Optional date-of-birth identity digest; an `x`/`X` may replace the
    /// first hex character.
    #[validate(length(equal = 64))]
    pub key_dob: Option<String>,
}

/// Shape check for the date-of-birth digest: 64 chars, hex, with an
/// optional `x`/`X` in the first position.
pub fn is_dob_hash_valid(value: &str) -> bool {
    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .map(|c| c == 'X' || c == 'x' || c.is_ascii_hexdigit())
        .unwrap_or(false);
    value.chars().count() == 64 && first_ok && chars.all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationTokenResponse {
    pub registration_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_padding: Option<String>,
}

/// Body carrying a previously issued registration token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationToken {
    #[validate(length(min = 1, max = 64))]
    pub registration_token: String,
}

/// Registration tokens are canonical UUID v4 strings; anything else fails
/// before a digest is ever computed.
pub fn is_registration_token_valid(value: &str) -> bool {
    match Uuid::try_parse(value) {
        Ok(uuid) => uuid.get_version_num() == 4 && value == uuid.to_string(),
        Err(_) => false,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TanResponse {
    pub tan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_padding: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TanVerificationRequest {
    #[validate(length(min = 1, max = 64))]
    pub tan: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeleTanResponse {
    pub tele_tan: String,
}

/// Test result body for the internal profile; includes the identity digest
/// the result was fetched for.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTestResultResponse {
    pub test_result: i32,
    pub sc: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_padding: Option<String>,
    pub hashed_guid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dob_hash_accepts_hex_and_x_prefix() {
        assert!(is_dob_hash_valid(&"a".repeat(64)));
        assert!(is_dob_hash_valid(&format!("x{}", "a".repeat(63))));
        assert!(is_dob_hash_valid(&format!("X{}", "F".repeat(63))));
    }

    #[test]
    fn dob_hash_rejects_wrong_shapes() {
        assert!(!is_dob_hash_valid(&"a".repeat(63)));
        assert!(!is_dob_hash_valid(&"a".repeat(65)));
        assert!(!is_dob_hash_valid(&format!("{}x", "a".repeat(63))));
        assert!(!is_dob_hash_valid(""));
    }

    #[test]
    fn registration_token_must_be_canonical_uuid_v4() {
        assert!(is_registration_token_valid(&Uuid::new_v4().to_string()));
        assert!(!is_registration_token_valid("abc"));
        assert!(!is_registration_token_valid(
            &Uuid::new_v4().to_string().to_uppercase()
        ));
        // v1-style version nibble
        assert!(!is_registration_token_valid(
            "c997e394-ee56-11ea-adc1-0242ac120002"
        ));
    }
}
