use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Which gateway implementation pushes/pulls against the ERP (C9).
#[derive(Clone, Debug, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErpMode {
    Mock,
    SeniorCsv,
    SeniorHttp,
}

impl Default for ErpMode {
    fn default() -> Self {
        ErpMode::Mock
    }
}

fn validate_erp_mode(_mode: &ErpMode) -> Result<(), ValidationError> {
    Ok(())
}

/// ERP gateway connection settings (C9).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ErpConfig {
    #[serde(default)]
    #[validate(custom = "validate_erp_mode")]
    pub mode: ErpMode,

    #[serde(default = "default_erp_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Base URL of the live ERP HTTP endpoint; required only when `mode = senior_http`.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Directory holding the CSV mirror files (`E420OCP.csv` outbound, `E405SOL.csv` inbound);
    /// required only when `mode = senior_csv`.
    #[serde(default)]
    pub csv_dir: Option<String>,
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            mode: ErpMode::default(),
            timeout_seconds: default_erp_timeout_seconds(),
            base_url: None,
            api_key: None,
            csv_dir: None,
        }
    }
}

/// ERP push outbox retry/backoff settings (C5/C7).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ErpOutboxConfig {
    #[serde(default = "default_outbox_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_outbox_backoff_seconds")]
    pub backoff_seconds: u64,

    #[serde(default = "default_outbox_max_backoff_seconds")]
    pub max_backoff_seconds: u64,

    #[serde(default = "default_outbox_backoff_jitter_ratio")]
    #[validate(custom = "validate_jitter_ratio")]
    pub backoff_jitter_ratio: f64,

    #[serde(default = "default_outbox_worker_interval_seconds")]
    pub worker_interval_seconds: u64,

    #[serde(default = "default_outbox_worker_batch_size")]
    pub worker_batch_size: u32,
}

impl Default for ErpOutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_outbox_max_attempts(),
            backoff_seconds: default_outbox_backoff_seconds(),
            max_backoff_seconds: default_outbox_max_backoff_seconds(),
            backoff_jitter_ratio: default_outbox_backoff_jitter_ratio(),
            worker_interval_seconds: default_outbox_worker_interval_seconds(),
            worker_batch_size: default_outbox_worker_batch_size(),
        }
    }
}

/// ERP push circuit breaker settings (C6): sliding-window error-rate model.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ErpCircuitConfig {
    #[serde(default = "default_true_bool")]
    pub enabled: bool,

    #[serde(default = "default_circuit_error_rate_threshold")]
    #[validate(custom = "validate_unit_interval")]
    pub error_rate_threshold: f64,

    #[serde(default = "default_circuit_min_samples")]
    pub min_samples: u32,

    #[serde(default = "default_circuit_window_seconds")]
    pub window_seconds: u64,

    #[serde(default = "default_circuit_open_seconds")]
    pub open_seconds: u64,

    #[serde(default = "default_circuit_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for ErpCircuitConfig {
    fn default() -> Self {
        Self {
            enabled: default_true_bool(),
            error_rate_threshold: default_circuit_error_rate_threshold(),
            min_samples: default_circuit_min_samples(),
            window_seconds: default_circuit_window_seconds(),
            open_seconds: default_circuit_open_seconds(),
            half_open_max_calls: default_circuit_half_open_max_calls(),
        }
    }
}

/// Incremental pull scheduler settings (C8).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SyncSchedulerConfig {
    #[serde(default = "default_true_bool")]
    pub enabled: bool,

    #[serde(default = "default_scheduler_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default = "default_scheduler_min_backoff_seconds")]
    pub min_backoff_seconds: u64,

    #[serde(default = "default_scheduler_max_backoff_seconds")]
    pub max_backoff_seconds: u64,

    #[serde(default = "default_scheduler_limit")]
    pub limit: u32,

    /// Comma-separated scope list pulled automatically; defaults to the four
    /// auto-scheduled scopes. `quote`, `quote_process`, and `quote_supplier` are
    /// reachable only through the manual admin pull endpoint.
    #[serde(default = "default_scheduler_scopes")]
    pub scopes: String,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true_bool(),
            interval_seconds: default_scheduler_interval_seconds(),
            min_backoff_seconds: default_scheduler_min_backoff_seconds(),
            max_backoff_seconds: default_scheduler_max_backoff_seconds(),
            limit: default_scheduler_limit(),
            scopes: default_scheduler_scopes(),
        }
    }
}

impl SyncSchedulerConfig {
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (sea-orm: postgres:// or sqlite://)
    pub database_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment ("development", "production", ...)
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default)]
    pub db_statement_timeout_secs: Option<u64>,

    /// Rate limiting: requests per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,

    /// Base URL used to build supplier invite portal links
    #[serde(default = "default_public_app_url")]
    pub public_app_url: String,

    #[serde(default)]
    pub erp: ErpConfig,

    #[serde(default)]
    pub erp_outbox: ErpOutboxConfig,

    #[serde(default)]
    pub erp_circuit: ErpCircuitConfig,

    #[serde(default)]
    pub sync_scheduler: SyncSchedulerConfig,
}

impl AppConfig {
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.erp.mode == ErpMode::SeniorHttp && self.erp.base_url.as_deref().unwrap_or("").is_empty() {
            let mut err = ValidationError::new("erp_base_url_required");
            err.message = Some("APP__ERP__BASE_URL is required when APP__ERP__MODE=senior_http".into());
            errors.add("erp.base_url", err);
        }

        if self.erp.mode == ErpMode::SeniorCsv && self.erp.csv_dir.as_deref().unwrap_or("").is_empty() {
            let mut err = ValidationError::new("erp_csv_dir_required");
            err.message = Some("APP__ERP__CSV_DIR is required when APP__ERP__MODE=senior_csv".into());
            errors.add("erp.csv_dir", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_jwt_expiration() -> usize {
    3600
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_rate_limit_requests() -> u32 {
    100
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_public_app_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_erp_timeout_seconds() -> u64 {
    15
}
fn default_outbox_max_attempts() -> u32 {
    8
}
fn default_outbox_backoff_seconds() -> u64 {
    5
}
fn default_outbox_max_backoff_seconds() -> u64 {
    900
}
fn default_outbox_backoff_jitter_ratio() -> f64 {
    0.2
}
fn default_outbox_worker_interval_seconds() -> u64 {
    2
}
fn default_outbox_worker_batch_size() -> u32 {
    20
}
fn default_true_bool() -> bool {
    true
}
fn default_circuit_error_rate_threshold() -> f64 {
    0.5
}
fn default_circuit_min_samples() -> u32 {
    10
}
fn default_circuit_window_seconds() -> u64 {
    60
}
fn default_circuit_open_seconds() -> u64 {
    30
}
fn default_circuit_half_open_max_calls() -> u32 {
    3
}
fn default_scheduler_interval_seconds() -> u64 {
    30
}
fn default_scheduler_min_backoff_seconds() -> u64 {
    30
}
fn default_scheduler_max_backoff_seconds() -> u64 {
    3600
}
fn default_scheduler_limit() -> u32 {
    200
}
fn default_scheduler_scopes() -> String {
    "supplier,purchase_request,purchase_order,receipt".to_string()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 64 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must be at least 64 characters for adequate security".into());
        return Err(err);
    }

    const DISALLOWED: [&str; 4] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "INSECURE_DEFAULT_DO_NOT_USE_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
    ];
    if DISALLOWED.iter().any(|&bad| trimmed.eq_ignore_ascii_case(bad)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

fn validate_unit_interval(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 || value > 1.0 {
        let mut err = ValidationError::new("unit_interval");
        err.message = Some("must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_jitter_ratio(value: f64) -> Result<(), ValidationError> {
    validate_unit_interval(value)
}

/// Initializes tracing using the provided log level as the default filter.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("procurement_orchestrator={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(EnvFilter::new(filter_directive)).json().try_init();
    } else {
        let _ = fmt().with_env_filter(EnvFilter::new(filter_directive)).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`, then `config/{env}.toml`
/// 3. Environment variables (`APP__*`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://procurement.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET environment variable with a secure random string (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite://procurement.db?mode=memory".into(),
            jwt_secret: "super_secure_jwt_secret_that_is_long_enough_0123456789".into(),
            jwt_expiration: 3600,
            host: "127.0.0.1".into(),
            port: 8080,
            environment: "production".into(),
            log_level: "info".into(),
            log_json: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_statement_timeout_secs: None,
            rate_limit_requests_per_window: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_secs(),
            public_app_url: default_public_app_url(),
            erp: ErpConfig::default(),
            erp_outbox: ErpOutboxConfig::default(),
            erp_circuit: ErpCircuitConfig::default(),
            sync_scheduler: SyncSchedulerConfig::default(),
        }
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn senior_http_mode_requires_base_url() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.erp.mode = ErpMode::SeniorHttp;
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.erp.base_url = Some("https://erp.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn senior_csv_mode_requires_csv_dir() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.erp.mode = ErpMode::SeniorCsv;
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.erp.csv_dir = Some("/var/erp-mirror".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn default_scheduler_scopes_are_the_four_auto_pulled_ones() {
        let cfg = SyncSchedulerConfig::default();
        assert_eq!(
            cfg.scope_list(),
            vec!["supplier", "purchase_request", "purchase_order", "receipt"]
        );
    }
}
