//! Application configuration
//!
//! Configuration is loaded once at startup with the `config` crate and passed
//! explicitly to whatever needs it. Sources, lowest priority first: built-in
//! defaults, `config/default`, `config/{RUN_MODE}`, then `DNAI__`-prefixed
//! environment variables (`DNAI__DATABASE__URL`, `DNAI__STRIPE__SECRET_KEY`, ...).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppInfoConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Public application identity, used in outbound messages and redirect URLs
#[derive(Debug, Deserialize, Clone)]
pub struct AppInfoConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Public URL of the web client
    #[serde(default = "default_app_url")]
    pub url: String,
}

fn default_app_name() -> String {
    "DNAi".to_string()
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Comma separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9001
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000,http://127.0.0.1:3000".to_string()
}

/// Database configuration (the hosted Postgres behind the BaaS)
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

/// Access token validation
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret the hosted auth service signs access tokens with
    #[serde(default)]
    pub jwt_secret: String,

    /// Expected `aud` claim
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_audience() -> String {
    "authenticated".to_string()
}

/// Stripe credentials
#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    #[serde(default)]
    pub secret_key: String,

    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_http_timeout() -> u64 {
    15
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            api_base: default_stripe_api_base(),
            currency: default_currency(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Transactional email (SendGrid)
#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub sendgrid_api_key: String,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_sendgrid_api_base")]
    pub api_base: String,
}

fn default_from_address() -> String {
    "no-reply@duhanashrah.ai".to_string()
}

fn default_sendgrid_api_base() -> String {
    "https://api.sendgrid.com/v3".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: String::new(),
            from_address: default_from_address(),
            api_base: default_sendgrid_api_base(),
        }
    }
}

/// SMS gateway (Twilio-style REST API)
#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    #[serde(default)]
    pub from_number: String,

    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base: default_sms_api_base(),
        }
    }
}

/// Dashboard behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    /// IANA zone used for "today" when the client does not send one
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional config files and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("app.name", "DNAi")?
            .set_default("app.url", "http://localhost:3000")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9001)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 20)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.audience", "authenticated")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("DNAI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("DNAI").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Report every missing required setting.
    ///
    /// Payment, email and SMS settings are optional; their absence only
    /// disables the corresponding feature and is reported as a warning.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.database.url.trim().is_empty() {
            report.errors.push("database.url is not set".to_string());
        }
        if self.auth.jwt_secret.trim().is_empty() {
            report.errors.push("auth.jwt_secret is not set".to_string());
        }

        if self.stripe.secret_key.is_empty() {
            report.warnings.push("stripe.secret_key is not set; checkout is disabled".to_string());
        }
        if self.stripe.webhook_secret.is_empty() {
            report
                .warnings
                .push("stripe.webhook_secret is not set; webhooks will be rejected".to_string());
        }
        if self.email.sendgrid_api_key.is_empty() {
            report
                .warnings
                .push("email.sendgrid_api_key is not set; email is disabled".to_string());
        }
        if self.sms.account_sid.is_empty() || self.sms.auth_token.is_empty() {
            report.warnings.push("sms credentials are not set; SMS is disabled".to_string());
        }

        report
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Outcome of [`AppConfig::validate`]
#[derive(Debug, Default, Clone)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AppConfig {
        AppConfig {
            app: AppInfoConfig {
                name: default_app_name(),
                url: default_app_url(),
            },
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                workers: 2,
                cors_origins: default_cors_origins(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/dnai".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                jwt_secret: "secret".to_string(),
                audience: default_audience(),
            },
            stripe: StripeConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }

    #[test]
    fn test_validate_accepts_required_settings() {
        let report = sample_config().validate();
        assert!(report.is_valid());
        // optional integrations are only warnings
        assert_eq!(report.warnings.len(), 4);
    }

    #[test]
    fn test_validate_reports_missing_database_and_secret() {
        let mut config = sample_config();
        config.database.url = String::new();
        config.auth.jwt_secret = "  ".to_string();

        let report = config.validate();
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("database.url"));
    }

    #[test]
    fn test_server_addr() {
        assert_eq!(sample_config().server_addr(), "0.0.0.0:9001");
    }

    #[test]
    fn test_integration_defaults_keep_endpoints() {
        assert_eq!(StripeConfig::default().api_base, "https://api.stripe.com/v1");
        assert_eq!(StripeConfig::default().timeout_secs, 15);
        assert_eq!(EmailConfig::default().from_address, "no-reply@duhanashrah.ai");
        assert!(SmsConfig::default().api_base.starts_with("https://"));
    }

    #[test]
    fn test_dashboard_default_timezone() {
        assert_eq!(DashboardConfig::default().default_timezone, "UTC");
    }
}
