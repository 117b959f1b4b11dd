//! Runtime configuration
//! Loaded from environment variables (a `.env` file is honoured) and validated before use.

use std::env;
use std::fmt;
use std::time::Duration;

pub const LIVE_BASE_URL: &str = "https://api.safaricom.co.ke";
pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

/// Top level configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub daraja: DarajaConfig,
    pub logging: LoggingConfig,
    #[cfg(feature = "database")]
    pub database: DatabaseConfig,
}

/// Which Daraja environment requests are sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarajaMode {
    Sandbox,
    Live,
}

impl DarajaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DarajaMode::Sandbox => "sandbox",
            DarajaMode::Live => "live",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            DarajaMode::Sandbox => SANDBOX_BASE_URL,
            DarajaMode::Live => LIVE_BASE_URL,
        }
    }
}

impl fmt::Display for DarajaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct DarajaConfig {
    pub mode: DarajaMode,
    pub base_url: String,
    /// Only honoured in sandbox mode; live requests always verify certificates.
    pub skip_tls_verify: bool,
    pub request_timeout: u64, // seconds
    pub token_ttl: u64,       // seconds
    pub append_correlation_to_result_url: bool,
    pub callbacks: CallbackUrls,
}

/// Result and timeout URLs the gateway posts asynchronous results to
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    pub timeout: String,
    pub balance: String,
    pub stk: String,
    pub mobile: String,
    pub till: String,
    pub paybill: String,
    pub reversal: String,
    pub transaction_query: String,
    pub funds_transfer: String,
    pub tax: String,
}

/// Database configuration
#[cfg(feature = "database")]
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            daraja: DarajaConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            #[cfg(feature = "database")]
            database: DatabaseConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.daraja.validate()?;
        self.logging.validate()?;
        #[cfg(feature = "database")]
        self.database.validate()?;

        Ok(())
    }
}

impl DarajaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = match env::var("DARAJA_MODE")
            .unwrap_or_else(|_| "sandbox".to_string())
            .to_lowercase()
            .as_str()
        {
            "live" | "production" => DarajaMode::Live,
            "sandbox" => DarajaMode::Sandbox,
            _ => return Err(ConfigError::InvalidValue("DARAJA_MODE".to_string())),
        };

        Ok(DarajaConfig {
            mode,
            base_url: env::var("DARAJA_BASE_URL")
                .unwrap_or_else(|_| mode.default_base_url().to_string()),
            skip_tls_verify: env::var("DARAJA_SKIP_TLS_VERIFY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DARAJA_SKIP_TLS_VERIFY".to_string()))?,
            request_timeout: env::var("DARAJA_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("DARAJA_REQUEST_TIMEOUT_SECS".to_string())
                })?,
            token_ttl: env::var("DARAJA_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "3480".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DARAJA_TOKEN_TTL_SECS".to_string()))?,
            append_correlation_to_result_url: env::var("DARAJA_APPEND_CORRELATION_ID")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("DARAJA_APPEND_CORRELATION_ID".to_string())
                })?,
            callbacks: CallbackUrls::from_env(),
        })
    }

    /// Sandbox configuration pointed at an arbitrary base URL, with
    /// callbacks under `http://localhost:8000/daraja`.
    pub fn sandbox(base_url: impl Into<String>) -> Self {
        DarajaConfig {
            mode: DarajaMode::Sandbox,
            base_url: base_url.into(),
            skip_tls_verify: false,
            request_timeout: 30,
            token_ttl: 3480,
            append_correlation_to_result_url: true,
            callbacks: CallbackUrls::under("http://localhost:8000/daraja"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl)
    }

    /// Certificate verification is only ever relaxed against the sandbox.
    pub fn accept_invalid_certs(&self) -> bool {
        self.mode == DarajaMode::Sandbox && self.skip_tls_verify
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "DARAJA_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.mode == DarajaMode::Live && !self.base_url.starts_with("https://") {
            return Err(ConfigError::ValidationFailed(
                "live mode requires an https base URL".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "DARAJA_REQUEST_TIMEOUT_SECS".to_string(),
            ));
        }

        // Daraja tokens live for an hour.
        if self.token_ttl == 0 || self.token_ttl > 3600 {
            return Err(ConfigError::InvalidValue("DARAJA_TOKEN_TTL_SECS".to_string()));
        }

        self.callbacks.validate()
    }
}

impl CallbackUrls {
    pub fn from_env() -> Self {
        let base = env::var("DARAJA_CALLBACK_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000/daraja".to_string());
        let url = |key: &str, path: &str| {
            env::var(key).unwrap_or_else(|_| format!("{}/{}", base.trim_end_matches('/'), path))
        };

        CallbackUrls {
            timeout: url("DARAJA_TIMEOUT_URL", "timeout"),
            balance: url("DARAJA_BALANCE_RESULT_URL", "balance"),
            stk: url("DARAJA_STK_CALLBACK_URL", "stk"),
            mobile: url("DARAJA_MOBILE_RESULT_URL", "mobile"),
            till: url("DARAJA_TILL_RESULT_URL", "till"),
            paybill: url("DARAJA_PAYBILL_RESULT_URL", "paybill"),
            reversal: url("DARAJA_REVERSAL_RESULT_URL", "reversal"),
            transaction_query: url("DARAJA_TRANSACTION_QUERY_RESULT_URL", "status"),
            funds_transfer: url("DARAJA_FUNDS_TRANSFER_RESULT_URL", "transfer"),
            tax: url("DARAJA_TAX_RESULT_URL", "tax"),
        }
    }

    /// Every callback under one base URL.
    pub fn under(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        CallbackUrls {
            timeout: format!("{}/timeout", base),
            balance: format!("{}/balance", base),
            stk: format!("{}/stk", base),
            mobile: format!("{}/mobile", base),
            till: format!("{}/till", base),
            paybill: format!("{}/paybill", base),
            reversal: format!("{}/reversal", base),
            transaction_query: format!("{}/status", base),
            funds_transfer: format!("{}/transfer", base),
            tax: format!("{}/tax", base),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("DARAJA_TIMEOUT_URL", &self.timeout),
            ("DARAJA_BALANCE_RESULT_URL", &self.balance),
            ("DARAJA_STK_CALLBACK_URL", &self.stk),
            ("DARAJA_MOBILE_RESULT_URL", &self.mobile),
            ("DARAJA_TILL_RESULT_URL", &self.till),
            ("DARAJA_PAYBILL_RESULT_URL", &self.paybill),
            ("DARAJA_REVERSAL_RESULT_URL", &self.reversal),
            ("DARAJA_TRANSACTION_QUERY_RESULT_URL", &self.transaction_query),
            ("DARAJA_FUNDS_TRANSFER_RESULT_URL", &self.funds_transfer),
            ("DARAJA_TAX_RESULT_URL", &self.tax),
        ];

        for (key, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(feature = "database")]
impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_is_valid() {
        let config = DarajaConfig::sandbox("https://sandbox.safaricom.co.ke");
        assert!(config.validate().is_ok());
        assert_eq!(config.callbacks.mobile, "http://localhost:8000/daraja/mobile");
    }

    #[test]
    fn test_live_mode_never_skips_tls_verification() {
        let mut config = DarajaConfig::sandbox(LIVE_BASE_URL);
        config.skip_tls_verify = true;
        assert!(config.accept_invalid_certs());

        config.mode = DarajaMode::Live;
        assert!(!config.accept_invalid_certs());
    }

    #[test]
    fn test_live_mode_requires_https() {
        let mut config = DarajaConfig::sandbox("http://127.0.0.1:9000");
        assert!(config.validate().is_ok());

        config.mode = DarajaMode::Live;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_ttl_cannot_exceed_provider_lifetime() {
        let mut config = DarajaConfig::sandbox(SANDBOX_BASE_URL);
        config.token_ttl = 7200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_callback_url_is_rejected() {
        let mut config = DarajaConfig::sandbox(SANDBOX_BASE_URL);
        config.callbacks.stk = "not-a-url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key)) if key == "DARAJA_STK_CALLBACK_URL"
        ));
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let config = LoggingConfig {
            level: "LOUD".to_string(),
            format: LogFormat::Plain,
        };
        assert!(config.validate().is_err());
    }
}
