use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::reconciliation::{
    AccuracyConfig, EngineConfig, ReconciliationSettings, SanitizePolicy, ScoringConfig,
    DEFAULT_LEDGER_CAPACITY,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub decision: DecisionConfig,
    pub secondary: SecondaryConfig,
    pub accuracy: AccuracyConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let scoring = ScoringConfig {
            auto_apply_threshold: parse_var("DECISION_AUTO_APPLY_THRESHOLD", 80u8)?,
            minimum_threshold: parse_var("DECISION_MIN_THRESHOLD", 20u8)?,
            ambiguity_floor: parse_var("DECISION_AMBIGUITY_FLOOR", 40u8)?,
        };
        if !scoring.is_consistent() {
            return Err(ConfigError::InvalidThresholds {
                minimum: scoring.minimum_threshold,
                ambiguity_floor: scoring.ambiguity_floor,
                auto_apply: scoring.auto_apply_threshold,
            });
        }

        let decision = DecisionConfig {
            scoring,
            high_value_ceiling_minor_units: parse_var("DECISION_HIGH_VALUE_CEILING", 1_000_000i64)?,
            max_candidates: parse_var("DECISION_MAX_CANDIDATES", 25usize)?,
        };

        let secondary = SecondaryConfig {
            endpoint: optional_var("SECONDARY_ENDPOINT"),
            api_key: optional_var("SECONDARY_API_KEY"),
            timeout: Duration::from_millis(parse_var("SECONDARY_TIMEOUT_MS", 4_000u64)?),
            max_candidates: parse_var("SECONDARY_MAX_CANDIDATES", 8usize)?,
            max_description_chars: parse_var("SECONDARY_MAX_DESCRIPTION_CHARS", 160usize)?,
        };

        let accuracy = AccuracyConfig {
            window: parse_var("ACCURACY_WINDOW", 200usize)?,
            min_samples: parse_var("ACCURACY_MIN_SAMPLES", 50usize)?,
            margin_points: parse_var("ACCURACY_MARGIN_POINTS", 5.0f64)?,
        };

        let storage = StorageConfig {
            audit_log_path: optional_var("AUDIT_LOG_PATH").map(PathBuf::from),
            accuracy_log_path: optional_var("ACCURACY_LOG_PATH").map(PathBuf::from),
            ledger_log_path: optional_var("LEDGER_LOG_PATH").map(PathBuf::from),
            ledger_capacity: parse_var("LEDGER_CAPACITY", DEFAULT_LEDGER_CAPACITY)?,
            candidates_path: optional_var("CANDIDATES_PATH").map(PathBuf::from),
            router_cache_ttl: Duration::from_secs(parse_var("ROUTER_CACHE_TTL_SECS", 60u64)?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            decision,
            secondary,
            accuracy,
            storage,
        })
    }

    /// Engine and service settings derived from the loaded configuration.
    pub fn reconciliation_settings(&self) -> ReconciliationSettings {
        ReconciliationSettings {
            engine: EngineConfig {
                scoring: self.decision.scoring,
                high_value_ceiling_minor_units: self.decision.high_value_ceiling_minor_units,
                secondary_timeout: self.secondary.timeout,
                sanitize: SanitizePolicy {
                    max_candidates: self.secondary.max_candidates,
                    max_description_chars: self.secondary.max_description_chars,
                    ..SanitizePolicy::default()
                },
            },
            accuracy: self.accuracy,
            router_cache_ttl: self.storage.router_cache_ttl,
            max_candidates: self.decision.max_candidates,
            ..ReconciliationSettings::default()
        }
    }
}

fn parse_var<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        _ => Ok(default),
    }
}

fn optional_var(variable: &str) -> Option<String> {
    env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Thresholds and bounds for the decision engine.
#[derive(Debug, Clone, Copy)]
pub struct DecisionConfig {
    pub scoring: ScoringConfig,
    pub high_value_ceiling_minor_units: i64,
    pub max_candidates: usize,
}

/// External scorer settings. No endpoint means the secondary path is disabled.
#[derive(Debug, Clone)]
pub struct SecondaryConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_candidates: usize,
    pub max_description_chars: usize,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub audit_log_path: Option<PathBuf>,
    pub accuracy_log_path: Option<PathBuf>,
    pub ledger_log_path: Option<PathBuf>,
    /// Most recent decisions kept correctable in memory.
    pub ledger_capacity: usize,
    pub candidates_path: Option<PathBuf>,
    pub router_cache_ttl: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidThresholds {
        minimum: u8,
        ambiguity_floor: u8,
        auto_apply: u8,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a valid number")
            }
            ConfigError::InvalidThresholds {
                minimum,
                ambiguity_floor,
                auto_apply,
            } => write!(
                f,
                "decision thresholds must satisfy min < ambiguity floor < auto-apply <= 100 \
                 (found {minimum} / {ambiguity_floor} / {auto_apply})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidThresholds { .. } => None,
        }
    }
}
