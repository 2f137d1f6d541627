use service_core::error::AppError;
use std::env;

/// Runtime configuration for the verification service, loaded from the
/// environment. Development falls back to defaults; production fails fast
/// on anything without a safe default.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub profile: ServerProfile,
    pub storage: StorageConfig,
    pub tan: TanConfig,
    pub app_session: AppSessionConfig,
    pub fake_delay: FakeDelayConfig,
    pub cleanup: CleanupConfig,
    pub jwt: JwtConfig,
    pub request: RequestConfig,
    pub result_server: ResultServerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

/// Which route subset this instance exposes. External instances face the
/// apps; internal instances face operators and the upload backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerProfile {
    External,
    Internal,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct TanConfig {
    /// Number of days a TAN remains valid
    pub valid_days: i64,
    pub tele: TeleTanConfig,
}

#[derive(Debug, Clone)]
pub struct TeleTanConfig {
    /// Alphabet for TeleTAN generation; visually confusable characters
    /// (0/O, 1/I/l) are excluded.
    pub chars: String,
    /// Number of random characters, excluding the trailing check digit
    pub length: usize,
    /// Number of hours a TEST TeleTAN remains valid
    pub valid_hours: i64,
    /// Number of days an EVENT TeleTAN remains valid
    pub event_valid_days: i64,
    pub rate_limit: TeleTanRateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct TeleTanRateLimitConfig {
    /// Length of the rate limiting window in seconds
    pub window_seconds: i64,
    /// Number of TeleTANs that may be created within the window
    pub count: i64,
    /// Threshold in percent for a warning in the log stream
    pub threshold_percent: i64,
}

#[derive(Debug, Clone)]
pub struct AppSessionConfig {
    /// Maximum number of TANs per session
    pub tan_counter_max: i32,
}

#[derive(Debug, Clone)]
pub struct FakeDelayConfig {
    pub initial_ms: u64,
    pub moving_average_samples: u64,
}

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub days: i64,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub enabled: bool,
    pub public_key_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub size_limit_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ResultServerConfig {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl VerificationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment = match env_str.to_lowercase().as_str() {
            "dev" => Environment::Dev,
            "prod" => Environment::Prod,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown environment: {other}"
                )))
            }
        };
        let is_prod = environment == Environment::Prod;

        let profile = match get_env("SERVER_PROFILE", Some("external"), is_prod)?
            .to_lowercase()
            .as_str()
        {
            "external" => ServerProfile::External,
            "internal" => ServerProfile::Internal,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown server profile: {other}"
                )))
            }
        };

        let storage_backend = match get_env("STORAGE_BACKEND", Some("postgres"), is_prod)?
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown storage backend: {other}"
                )))
            }
        };
        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_URL is required for the postgres storage backend"
            )));
        }

        let jwt_enabled = parse(get_env("JWT_ENABLED", Some("false"), is_prod)?)?;
        let jwt_public_key_path = env::var("JWT_PUBLIC_KEY_PATH").ok();
        if jwt_enabled && jwt_public_key_path.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_PUBLIC_KEY_PATH is required when JWT validation is enabled"
            )));
        }

        let config = VerificationConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("verification-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse(get_env("PORT", Some("8080"), is_prod)?)?,
            profile,
            storage: StorageConfig {
                backend: storage_backend,
                database_url,
            },
            tan: TanConfig {
                valid_days: parse(get_env("TAN_VALID_DAYS", Some("14"), is_prod)?)?,
                tele: TeleTanConfig {
                    chars: get_env(
                        "TELE_TAN_CHARS",
                        Some("23456789ABCDEFGHJKMNPQRSTUVWXYZ"),
                        is_prod,
                    )?,
                    length: parse(get_env("TELE_TAN_LENGTH", Some("9"), is_prod)?)?,
                    valid_hours: parse(get_env("TELE_TAN_VALID_HOURS", Some("1"), is_prod)?)?,
                    event_valid_days: parse(get_env(
                        "TELE_TAN_EVENT_VALID_DAYS",
                        Some("2"),
                        is_prod,
                    )?)?,
                    rate_limit: TeleTanRateLimitConfig {
                        window_seconds: parse(get_env(
                            "TELE_TAN_RATE_LIMIT_SECONDS",
                            Some("3600"),
                            is_prod,
                        )?)?,
                        count: parse(get_env("TELE_TAN_RATE_LIMIT_COUNT", Some("1000"), is_prod)?)?,
                        threshold_percent: parse(get_env(
                            "TELE_TAN_RATE_LIMIT_THRESHOLD_PERCENT",
                            Some("80"),
                            is_prod,
                        )?)?,
                    },
                },
            },
            app_session: AppSessionConfig {
                tan_counter_max: parse(get_env("TAN_COUNTER_MAX", Some("1"), is_prod)?)?,
            },
            fake_delay: FakeDelayConfig {
                initial_ms: parse(get_env("FAKE_DELAY_INITIAL_MS", Some("10"), is_prod)?)?,
                moving_average_samples: parse(get_env(
                    "FAKE_DELAY_MOVING_AVERAGE_SAMPLES",
                    Some("10"),
                    is_prod,
                )?)?,
            },
            cleanup: CleanupConfig {
                days: parse(get_env("CLEANUP_DAYS", Some("21"), is_prod)?)?,
                interval_seconds: parse(get_env("CLEANUP_INTERVAL_SECONDS", Some("3600"), is_prod)?)?,
            },
            jwt: JwtConfig {
                enabled: jwt_enabled,
                public_key_path: jwt_public_key_path,
            },
            request: RequestConfig {
                size_limit_bytes: parse(get_env("REQUEST_SIZE_LIMIT", Some("10000"), is_prod)?)?,
            },
            result_server: ResultServerConfig {
                base_url: get_env("RESULT_SERVER_URL", Some("http://localhost:8088"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: parse(get_env("GLOBAL_IP_RATE_LIMIT", Some("1000"), is_prod)?)?,
                global_ip_window_seconds: parse(get_env(
                    "GLOBAL_IP_RATE_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?)?,
            },
        };

        Ok(config)
    }
}

/// Look up an environment variable. Defaults apply in dev; production
/// requires every variable without a default to be set explicitly.
fn get_env(name: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => match default {
            Some(value) => Ok(value.to_string()),
            None if is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
                "Missing required environment variable: {name}"
            ))),
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "Missing environment variable: {name}"
            ))),
        },
    }
}

fn parse<T>(value: String) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{e}: {value:?}")))
}
