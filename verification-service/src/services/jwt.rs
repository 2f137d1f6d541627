//! Bearer token authorization for privileged operations.
//!
//! The service only consumes the role contract: a request is authorized when
//! the granted role set covers the required one. Signature verification uses
//! the identity provider's published RS256 public key.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::fs;
use std::sync::Arc;

use crate::config::JwtConfig;

pub const TOKEN_PREFIX: &str = "Bearer ";

/// Roles granted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationRole {
    Hotline,
    HealthAuthority,
    HotlineEvent,
}

impl AuthorizationRole {
    pub fn role_name(&self) -> &'static str {
        match self {
            AuthorizationRole::Hotline => "c19hotline",
            AuthorizationRole::HealthAuthority => "c19healthauthority",
            AuthorizationRole::HotlineEvent => "c19hotline_event",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[allow(dead_code)]
    exp: usize,
    #[serde(default)]
    realm_access: Option<RealmAccess>,
}

#[derive(Debug, Deserialize, Default)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Clone)]
pub struct JwtService {
    enabled: bool,
    decoding_key: Option<Arc<DecodingKey>>,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if !config.enabled {
            return Ok(Self {
                enabled: false,
                decoding_key: None,
            });
        }

        let path = config
            .public_key_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("JWT public key path is not configured"))?;
        let pem = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read JWT public key from {path}: {e}"))?;
        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse JWT public key: {e}"))?;

        tracing::info!("JWT validation enabled with RS256 public key");

        Ok(Self {
            enabled: true,
            decoding_key: Some(Arc::new(decoding_key)),
        })
    }

    /// Whether the Authorization header carries a token granting every one
    /// of the required roles.
    pub fn is_authorized(
        &self,
        authorization: Option<&str>,
        required_roles: &[AuthorizationRole],
    ) -> bool {
        if !self.enabled {
            return true;
        }

        let token = match authorization.and_then(|v| v.strip_prefix(TOKEN_PREFIX)) {
            Some(token) => token,
            None => {
                tracing::warn!("Missing or malformed Authorization header");
                return false;
            }
        };

        let granted = match self.granted_roles(token) {
            Ok(roles) => roles,
            Err(e) => {
                tracing::warn!("Token is not valid: {e}");
                return false;
            }
        };

        required_roles
            .iter()
            .all(|role| granted.iter().any(|g| g == role.role_name()))
    }

    fn granted_roles(&self, token: &str) -> Result<Vec<String>, jsonwebtoken::errors::Error> {
        let key = self
            .decoding_key
            .as_ref()
            .expect("decoding key is present when validation is enabled");
        let validation = Validation::new(Algorithm::RS256);
        let data = decode::<Claims>(token, key, &validation)?;
        Ok(data.claims.realm_access.unwrap_or_default().roles)
    }
}
