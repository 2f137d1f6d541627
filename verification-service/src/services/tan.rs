//! TAN and TeleTAN generation, validity windows and exactly-once redemption.

use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::TanConfig;
use crate::error::VerificationError;
use crate::models::{TanSourceOfTrust, TanType, TeleTanType, VerificationTan};
use crate::services::hashing;
use crate::storage::{StorageError, TanStore};

/// Outcome of a successful redemption, carried into response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedTan {
    pub tan_type: TanType,
    pub tele_tan_type: Option<TeleTanType>,
}

#[derive(Clone)]
pub struct TanService {
    tans: Arc<dyn TanStore>,
    config: TanConfig,
}

impl TanService {
    pub fn new(tans: Arc<dyn TanStore>, config: TanConfig) -> Self {
        Self { tans, config }
    }

    /// A TAN is syntactically a canonical UUID v4 string.
    pub fn is_tan_syntax_valid(value: &str) -> bool {
        match Uuid::try_parse(value) {
            Ok(uuid) => uuid.get_version_num() == 4 && value == uuid.to_string(),
            Err(_) => false,
        }
    }

    /// A TeleTAN is a fixed-length code over the restricted alphabet,
    /// including the trailing check digit.
    pub fn is_tele_tan_syntax_valid(&self, value: &str) -> bool {
        value.chars().count() == self.config.tele.length + 1
            && value.chars().all(|c| self.config.tele.chars.contains(c))
    }

    fn create_tan_value() -> String {
        // A UUID is a 128 bit value
        Uuid::new_v4().to_string()
    }

    fn create_tele_tan_value(&self) -> String {
        let chars: Vec<char> = self.config.tele.chars.chars().collect();
        let mut rng = rand::thread_rng();
        let mut code: String = (0..self.config.tele.length)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect();
        code.push(hashing::check_digit(&code));
        code
    }

    /// Generate a value whose digest is not yet stored, retrying on the
    /// (overwhelmingly unlikely) collision.
    async fn generate_unused_value<F>(&self, create: F) -> Result<String, VerificationError>
    where
        F: Fn() -> String,
    {
        loop {
            let candidate = create();
            if !self
                .tans
                .exists_by_tan_hash(&hashing::hash(&candidate))
                .await?
            {
                return Ok(candidate);
            }
        }
    }

    fn build_tan(
        &self,
        value: &str,
        tan_type: TanType,
        source_of_trust: TanSourceOfTrust,
        tele_tan_type: Option<TeleTanType>,
    ) -> VerificationTan {
        let from = Utc::now();
        let until = match (tan_type, tele_tan_type) {
            (TanType::Teletan, Some(TeleTanType::Event)) => {
                from + Duration::days(self.config.tele.event_valid_days)
            }
            (TanType::Teletan, _) => from + Duration::hours(self.config.tele.valid_hours),
            (TanType::Tan, _) => from + Duration::days(self.config.valid_days),
        };
        VerificationTan::new(
            hashing::hash(value),
            from,
            until,
            source_of_trust,
            tan_type,
            tele_tan_type,
        )
    }

    /// Generate and persist a TAN with the given provenance. Returns the raw
    /// value; it is not retrievable afterwards.
    pub async fn generate_tan(
        &self,
        source_of_trust: TanSourceOfTrust,
        tele_tan_type: Option<TeleTanType>,
    ) -> Result<String, VerificationError> {
        let value = self.generate_unused_value(Self::create_tan_value).await?;
        let tan = self.build_tan(&value, TanType::Tan, source_of_trust, tele_tan_type);
        self.tans.insert(tan).await?;
        Ok(value)
    }

    /// Generate and persist a TeleTAN of the given type. Returns the raw
    /// code; it is not retrievable afterwards.
    pub async fn generate_tele_tan(
        &self,
        tele_tan_type: TeleTanType,
    ) -> Result<String, VerificationError> {
        let value = self
            .generate_unused_value(|| self.create_tele_tan_value())
            .await?;
        let tan = self.build_tan(
            &value,
            TanType::Teletan,
            TanSourceOfTrust::Teletan,
            Some(tele_tan_type),
        );
        self.tans.insert(tan).await?;
        Ok(value)
    }

    /// Look up the stored credential for a raw value.
    pub async fn get_by_value(
        &self,
        value: &str,
    ) -> Result<Option<VerificationTan>, VerificationError> {
        Ok(self.tans.find_by_tan_hash(&hashing::hash(value)).await?)
    }

    /// Fetch a TeleTAN that is currently redeemable; used by the
    /// registration flow before it binds a session to the TeleTAN.
    pub async fn get_redeemable_tele_tan(
        &self,
        tele_tan: &str,
    ) -> Result<VerificationTan, VerificationError> {
        if !self.is_tele_tan_syntax_valid(tele_tan) {
            tracing::warn!("The TeleTAN does not match the syntax constraints");
            return Err(VerificationError::MalformedCredential);
        }
        match self.get_by_value(tele_tan).await? {
            Some(tan) if tan.tan_type == TanType::Teletan && tan.can_be_redeemed(Utc::now()) => {
                Ok(tan)
            }
            _ => {
                tracing::warn!("The TeleTAN is unknown, expired or already redeemed");
                Err(VerificationError::InvalidCredential)
            }
        }
    }

    /// Flag a credential as redeemed through the optimistic version check.
    /// On a concurrent modification the row is reloaded and retried once;
    /// if it was redeemed in between, the caller gets the invalid outcome.
    pub async fn redeem(&self, mut tan: VerificationTan) -> Result<RedeemedTan, VerificationError> {
        let redeemed = RedeemedTan {
            tan_type: tan.tan_type,
            tele_tan_type: tan.tele_tan_type,
        };
        tan.redeemed = true;
        match self.tans.update(tan.clone()).await {
            Ok(_) => Ok(redeemed),
            Err(StorageError::VersionConflict) => {
                let current = self
                    .tans
                    .find_by_tan_hash(&tan.tan_hash)
                    .await?
                    .ok_or(VerificationError::InvalidCredential)?;
                if !current.can_be_redeemed(Utc::now()) {
                    return Err(VerificationError::InvalidCredential);
                }
                let mut retry = current;
                retry.redeemed = true;
                match self.tans.update(retry).await {
                    Ok(_) => Ok(redeemed),
                    Err(StorageError::VersionConflict) => Err(VerificationError::InvalidCredential),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a raw TAN or TeleTAN and redeem it exactly once.
    ///
    /// Everything past the syntax gate collapses into one outward outcome:
    /// unknown, expired and already-redeemed are indistinguishable to the
    /// caller.
    pub async fn verify_and_redeem(&self, value: &str) -> Result<RedeemedTan, VerificationError> {
        if !Self::is_tan_syntax_valid(value) && !self.is_tele_tan_syntax_valid(value) {
            tracing::warn!("The TAN does not match the syntax constraints");
            return Err(VerificationError::MalformedCredential);
        }

        let tan = match self.get_by_value(value).await? {
            Some(tan) => tan,
            None => {
                tracing::info!("The TAN is unknown");
                return Err(VerificationError::InvalidCredential);
            }
        };

        if !tan.can_be_redeemed(Utc::now()) {
            tracing::info!("The TAN is expired or already redeemed");
            return Err(VerificationError::InvalidCredential);
        }

        self.redeem(tan).await
    }

    /// Whether a new TeleTAN of the given type may currently be created.
    ///
    /// Counting and inserting are not one atomic step; closely racing
    /// admissions can overshoot the ceiling by at most the number of
    /// in-flight requests, which is acceptable for an operational limit.
    pub async fn is_tele_tan_rate_limit_ok(
        &self,
        tele_tan_type: TeleTanType,
    ) -> Result<bool, VerificationError> {
        let limit = &self.config.tele.rate_limit;
        let window_start = Utc::now() - Duration::seconds(limit.window_seconds);
        let counted = self
            .tans
            .count_tele_tans_created_after(window_start, tele_tan_type)
            .await?;

        let threshold = limit.threshold_percent * limit.count / 100;
        let ok = counted < limit.count;

        if !ok {
            tracing::warn!(
                counted,
                maximum = limit.count,
                window_seconds = limit.window_seconds,
                "The TeleTAN rate limit is exceeded"
            );
        } else if counted >= threshold {
            tracing::warn!(
                counted,
                threshold_percent = limit.threshold_percent,
                maximum = limit.count,
                "The TeleTAN rate limit threshold is reached"
            );
        }

        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TeleTanConfig, TeleTanRateLimitConfig};
    use crate::storage::memory::InMemoryTanStore;

    fn test_config() -> TanConfig {
        TanConfig {
            valid_days: 14,
            tele: TeleTanConfig {
                chars: "23456789ABCDEFGHJKMNPQRSTUVWXYZ".to_string(),
                length: 9,
                valid_hours: 1,
                event_valid_days: 2,
                rate_limit: TeleTanRateLimitConfig {
                    window_seconds: 3600,
                    count: 1000,
                    threshold_percent: 80,
                },
            },
        }
    }

    fn service() -> TanService {
        TanService::new(Arc::new(InMemoryTanStore::new()), test_config())
    }

    #[test]
    fn tan_syntax_accepts_canonical_uuid_v4_only() {
        assert!(TanService::is_tan_syntax_valid(
            &Uuid::new_v4().to_string()
        ));
        assert!(!TanService::is_tan_syntax_valid("not-a-uuid"));
        // v1-style version nibble
        assert!(!TanService::is_tan_syntax_valid(
            "c997e394-ee56-11ea-adc1-0242ac120002"
        ));
        // uppercase is not canonical
        assert!(!TanService::is_tan_syntax_valid(
            &Uuid::new_v4().to_string().to_uppercase()
        ));
    }

    #[tokio::test]
    async fn tele_tans_use_the_restricted_alphabet() {
        let service = service();
        for _ in 0..50 {
            let code = service.create_tele_tan_value();
            assert_eq!(code.chars().count(), 10);
            assert!(service.is_tele_tan_syntax_valid(&code));
            for c in code.chars() {
                assert!(!"01OIl".contains(c), "confusable character in {code}");
            }
        }
    }

    #[tokio::test]
    async fn tele_tan_check_digit_is_consistent() {
        let service = service();
        let code = service.create_tele_tan_value();
        let (body, check) = code.split_at(code.len() - 1);
        assert_eq!(check.chars().next(), Some(hashing::check_digit(body)));
    }

    #[tokio::test]
    async fn generated_tan_is_persisted_with_window() {
        let service = service();
        let value = service
            .generate_tan(TanSourceOfTrust::ConnectedLab, None)
            .await
            .unwrap();
        let stored = service.get_by_value(&value).await.unwrap().unwrap();
        assert_eq!(stored.tan_type, TanType::Tan);
        assert_eq!(stored.source_of_trust, TanSourceOfTrust::ConnectedLab);
        assert!(!stored.redeemed);
        assert_eq!(stored.valid_until - stored.valid_from, Duration::days(14));
    }

    #[tokio::test]
    async fn event_tele_tan_gets_the_longer_window() {
        let service = service();
        let value = service.generate_tele_tan(TeleTanType::Event).await.unwrap();
        let stored = service.get_by_value(&value).await.unwrap().unwrap();
        assert_eq!(stored.valid_until - stored.valid_from, Duration::days(2));

        let value = service.generate_tele_tan(TeleTanType::Test).await.unwrap();
        let stored = service.get_by_value(&value).await.unwrap().unwrap();
        assert_eq!(stored.valid_until - stored.valid_from, Duration::hours(1));
    }

    #[tokio::test]
    async fn verify_and_redeem_is_exactly_once() {
        let service = service();
        let value = service
            .generate_tan(TanSourceOfTrust::ConnectedLab, None)
            .await
            .unwrap();

        let first = service.verify_and_redeem(&value).await.unwrap();
        assert_eq!(first.tan_type, TanType::Tan);

        let second = service.verify_and_redeem(&value).await;
        assert!(matches!(second, Err(VerificationError::InvalidCredential)));
    }

    #[tokio::test]
    async fn malformed_value_fails_before_lookup() {
        let service = service();
        let result = service.verify_and_redeem("!!definitely-not-a-tan!!").await;
        assert!(matches!(
            result,
            Err(VerificationError::MalformedCredential)
        ));
    }

    #[tokio::test]
    async fn concurrent_redemption_has_a_single_winner() {
        let service = service();
        let value = service
            .generate_tan(TanSourceOfTrust::ConnectedLab, None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let value = value.clone();
            handles.push(tokio::spawn(
                async move { service.verify_and_redeem(&value).await },
            ));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn rate_limit_counts_per_type() {
        let mut config = test_config();
        config.tele.rate_limit.count = 2;
        let service = TanService::new(Arc::new(InMemoryTanStore::new()), config);

        assert!(service
            .is_tele_tan_rate_limit_ok(TeleTanType::Test)
            .await
            .unwrap());
        service.generate_tele_tan(TeleTanType::Test).await.unwrap();
        service.generate_tele_tan(TeleTanType::Test).await.unwrap();
        assert!(!service
            .is_tele_tan_rate_limit_ok(TeleTanType::Test)
            .await
            .unwrap());
        // The EVENT quota is independent
        assert!(service
            .is_tele_tan_rate_limit_ok(TeleTanType::Event)
            .await
            .unwrap());
    }
}
