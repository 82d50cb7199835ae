//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IMAGECTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `IMAGECTL_` override YAML values
//! 3. **Well-known variables** - `BOSBASE_URL`, `BOSBASE_EMAIL`, `BOSBASE_PASSWORD`,
//!    `OPENAI_API_KEY` and `AUTH_SECRET` override their respective settings
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IMAGECTL_STATS__TIMEZONE=utc` sets the `stats.timezone` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use imagectl::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`
//! - **BosBase**: `bosbase.url`, `bosbase.admin_email`, `bosbase.admin_password`, `bosbase.collection`
//! - **OpenAI**: `openai.api_key`, `openai.base_url`
//! - **Stats**: `stats.timezone`, `stats.page_size`
//! - **Authentication**: `auth.proxy_header`, `auth.session`, `auth.cors`
//! - **Security**: `secret_key` - signs session cookies

use std::fmt;
use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMAGECTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// `Debug` output masks credentials, so the whole config can be logged at startup.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for signing session tokens
    pub secret_key: Option<String>,
    pub bosbase: BosBaseConfig,
    pub openai: OpenAiConfig,
    pub stats: StatsConfig,
    pub auth: AuthConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Connection to the BosBase instance that stores usage events and users.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BosBaseConfig {
    pub url: Url,
    /// Superuser identity used for every store operation
    pub admin_email: String,
    pub admin_password: Option<String>,
    /// Collection holding one record per generation attempt
    pub collection: String,
    /// Auth collection that signed-in users are mirrored into
    pub users_collection: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Pause after creating the usage collection, before the first write to it
    #[serde(with = "humantime_serde")]
    pub provision_settle_delay: Duration,
}

impl Default for BosBaseConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:8090/").expect("valid default url"),
            admin_email: String::new(),
            admin_password: None,
            collection: "api_calls".to_string(),
            users_collection: "users".to_string(),
            request_timeout: Duration::from_secs(10),
            provision_settle_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenAiConfig {
    /// Without a key, generation requests fail with a configuration error
    pub api_key: Option<String>,
    pub base_url: Url,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://api.openai.com/v1").expect("valid default url"),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Timezone used for the "today" and "this month" boundaries.
fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret_key", &redacted(&self.secret_key))
            .field("bosbase", &self.bosbase)
            .field("openai", &self.openai)
            .field("stats", &self.stats)
            .field("auth", &self.auth)
            .field("enable_otel_export", &self.enable_otel_export)
            .finish()
    }
}

impl fmt::Debug for BosBaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BosBaseConfig")
            .field("url", &self.url)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &redacted(&self.admin_password))
            .field("collection", &self.collection)
            .field("users_collection", &self.users_collection)
            .field("request_timeout", &self.request_timeout)
            .field("provision_settle_delay", &self.provision_settle_delay)
            .finish()
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsTimezone {
    /// The server's local timezone
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    pub timezone: StatsTimezone,
    /// Records fetched per request while scanning
    pub page_size: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            timezone: StatsTimezone::Local,
            page_size: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub proxy_header: ProxyHeaderAuthConfig,
    pub session: SessionConfig,
    pub cors: CorsConfig,
}

/// Proxy header-based authentication configuration.
///
/// OAuth is handled by an upstream proxy (for example oauth2-proxy) which forwards the
/// verified identity in these headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyHeaderAuthConfig {
    pub enabled: bool,
    /// Header carrying the provider's stable user id
    pub user_id_header: String,
    pub email_header: String,
    pub name_header: String,
    pub image_header: String,
}

impl Default for ProxyHeaderAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_id_header: "x-forwarded-user".to_string(),
            email_header: "x-forwarded-email".to_string(),
            name_header: "x-forwarded-preferred-username".to_string(),
            image_header: "x-forwarded-avatar".to_string(),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(24 * 60 * 60),
            cookie_name: "imagectl_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "lax".to_string(),
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Url(
                Url::parse("http://localhost:3000").expect("valid default url"),
            )],
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            secret_key: None,
            bosbase: BosBaseConfig::default(),
            openai: OpenAiConfig::default(),
            stats: StatsConfig::default(),
            auth: AuthConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.bosbase.admin_email.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: bosbase.admin_email is not configured. \
                     Set BOSBASE_EMAIL or add bosbase.admin_email to the config file."
                    .to_string(),
            });
        }

        if self.bosbase.request_timeout.is_zero() || self.openai.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: request timeouts must be greater than zero".to_string(),
            });
        }

        if self.bosbase.collection.is_empty() || self.bosbase.users_collection.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: bosbase collection names cannot be empty".to_string(),
            });
        }

        if self.stats.page_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: stats.page_size cannot be 0 (default: 500)".to_string(),
            });
        }

        if self.auth.proxy_header.enabled && self.secret_key.is_none() {
            return Err(Error::Internal {
                operation: "Config validation: Proxy header authentication is enabled but secret_key is not configured. \
                     Set AUTH_SECRET or IMAGECTL_SECRET_KEY, or add secret_key to the config file."
                    .to_string(),
            });
        }

        if self.auth.session.expiry.as_secs() < 300 {
            return Err(Error::Internal {
                operation: "Config validation: session expiry is too short (minimum 5 minutes)".to_string(),
            });
        }

        let has_wildcard = self
            .auth
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.auth.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("IMAGECTL_").split("__"))
            // Variable names shared with the web frontend's deployment
            .merge(Env::raw().only(&["BOSBASE_URL"]).map(|_| "bosbase.url".into()))
            .merge(Env::raw().only(&["BOSBASE_EMAIL"]).map(|_| "bosbase.admin_email".into()))
            .merge(Env::raw().only(&["BOSBASE_PASSWORD"]).map(|_| "bosbase.admin_password".into()))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "openai.api_key".into()))
            .merge(Env::raw().only(&["AUTH_SECRET"]).map(|_| "secret_key".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
