//! Service configuration.
//!
//! Every setting can be given as a flag or through the environment; `main`
//! loads `key.env` and `.env` first so local secrets files work unchanged.

use std::fmt;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::ConfigError;

/// Minor units per major currency unit (kobo per naira)
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;

/// Longest subscription one payment may buy
pub const MAX_SUBSCRIPTION_DAYS: u32 = 3650;

/// Subgate Web configuration
#[derive(Parser, Clone)]
#[command(name = "subgate")]
#[command(version)]
#[command(about = "Paystack-backed subscription gate")]
pub struct AppConfig {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Paystack secret key; also the webhook signing key
    #[arg(long, env = "PAYSTACK_SECRET", hide_env_values = true)]
    pub paystack_secret: String,

    /// Paystack API root
    #[arg(long, env = "PAYSTACK_API_BASE", default_value = crate::paystack::DEFAULT_API_BASE)]
    pub paystack_api_base: String,

    /// URL scheme of the client app, used for post-checkout deep links
    #[arg(long, env = "APP_SCHEME", default_value = "joki")]
    pub app_scheme: String,

    /// Tag attached to transaction metadata
    #[arg(long, env = "APP_TAG", default_value = "joki")]
    pub app_tag: String,

    /// Public base URL of this service, for the Paystack callback
    #[arg(long, env = "BASE_URL")]
    pub base_url: String,

    /// Length of one paid subscription window, in days
    #[arg(long, env = "SUBSCRIPTION_DAYS", default_value_t = 30)]
    pub subscription_days: u32,

    /// Subscription price in major currency units
    #[arg(long, env = "SUBSCRIPTION_AMOUNT", default_value_t = 5000)]
    pub subscription_amount: u64,

    /// SQLite database path; `:memory:` keeps state in process memory
    #[arg(long, env = "DATABASE_PATH", default_value = "database.sqlite")]
    pub database_path: String,

    /// Timeout for calls to Paystack, in seconds
    #[arg(long, env = "GATEWAY_TIMEOUT_SECS", default_value_t = 30)]
    pub gateway_timeout_secs: u64,

    /// Webhook events buffered for background processing
    #[arg(long, env = "WEBHOOK_QUEUE_CAPACITY", default_value_t = 1024)]
    pub webhook_queue_capacity: usize,

    /// Time budget for applying one webhook event, in seconds
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value_t = 10)]
    pub webhook_timeout_secs: u64,

    /// Allowed CORS origins, comma separated; empty allows any origin
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("paystack_secret", &"<redacted>")
            .field("paystack_api_base", &self.paystack_api_base)
            .field("app_scheme", &self.app_scheme)
            .field("app_tag", &self.app_tag)
            .field("base_url", &self.base_url)
            .field("subscription_days", &self.subscription_days)
            .field("subscription_amount", &self.subscription_amount)
            .field("database_path", &self.database_path)
            .field("cors_origins", &self.cors_origins)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Check invariants that clap cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paystack_secret.trim().is_empty() {
            return Err(ConfigError::Missing("PAYSTACK_SECRET"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("BASE_URL"));
        }
        Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            message: e.to_string(),
        })?;

        let scheme_ok = self
            .app_scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && self
                .app_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(ConfigError::Invalid {
                field: "app_scheme",
                message: format!("{:?} is not a valid URL scheme", self.app_scheme),
            });
        }

        if self.subscription_days == 0 || self.subscription_days > MAX_SUBSCRIPTION_DAYS {
            return Err(ConfigError::Invalid {
                field: "subscription_days",
                message: format!("must be between 1 and {MAX_SUBSCRIPTION_DAYS}"),
            });
        }
        if self.subscription_amount == 0 {
            return Err(ConfigError::Invalid {
                field: "subscription_amount",
                message: "must be at least 1".to_string(),
            });
        }
        if self
            .subscription_amount
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .is_none()
        {
            return Err(ConfigError::Invalid {
                field: "subscription_amount",
                message: "too large".to_string(),
            });
        }

        Ok(())
    }

    /// Price in minor units, as Paystack expects and reports it
    pub fn price_minor_units(&self) -> u64 {
        self.subscription_amount
            .saturating_mul(MINOR_UNITS_PER_MAJOR)
    }

    /// Where Paystack sends the browser after checkout
    pub fn callback_url(&self) -> String {
        format!("{}/paystack/callback", self.base_url.trim_end_matches('/'))
    }

    /// Outbound request timeout
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Per-event webhook processing budget
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    /// Whether state should live in process memory instead of SQLite
    pub fn uses_memory_store(&self) -> bool {
        self.database_path == ":memory:"
    }

    /// Fixed configuration for tests
    pub fn test_config() -> Self {
        Self {
            port: 0,
            host: "127.0.0.1".to_string(),
            paystack_secret: "sk_test_subgate".to_string(),
            paystack_api_base: "http://127.0.0.1:9".to_string(),
            app_scheme: "joki".to_string(),
            app_tag: "joki".to_string(),
            base_url: "https://subs.example.com".to_string(),
            subscription_days: 30,
            subscription_amount: 5000,
            database_path: ":memory:".to_string(),
            gateway_timeout_secs: 5,
            webhook_queue_capacity: 64,
            webhook_timeout_secs: 5,
            cors_origins: Vec::new(),
            verbose: false,
        }
    }
}
