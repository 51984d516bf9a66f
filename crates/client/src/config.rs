//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Connection
//! - `BAZAAR_ENV` - `development` or `production` (default: `development` in
//!   debug builds, `production` otherwise)
//! - `BAZAAR_API_URL` - Backend base URL, overrides the per-environment URLs
//! - `BAZAAR_DEV_API_URL` - Development base URL (default: `http://127.0.0.1:8000`)
//! - `BAZAAR_PROD_API_URL` - Production base URL (required in production
//!   unless `BAZAAR_API_URL` is set)
//! - `BAZAAR_API_PREFIX` - Prefix applied to API paths (default: `/api`)
//!
//! ## Timeouts (seconds)
//! - `BAZAAR_TIMEOUT_SECS` - Default request timeout (default: 15)
//! - `BAZAAR_AUTH_TIMEOUT_SECS` - Login/register/profile timeout (default: 10)
//! - `BAZAAR_HANDSHAKE_TIMEOUT_SECS` - CSRF and health probes (default: 5)
//!
//! ## Session
//! - `BAZAAR_DEVICE_NAME` - Sent as `device_name` on login (default: host name)
//! - `BAZAAR_SESSION_FILE` - Where the token and cached user are stored
//! - `BAZAAR_DEV_BYPASS` - `true` to use a fake session (development only,
//!   requires the `dev-bypass` feature)
//!
//! ## Endpoint paths
//! Each accepts a comma-separated list; later entries are fallbacks tried
//! when the server answers 404/405 for an earlier one.
//! - `BAZAAR_PATH_LOGIN` (default: `/auth/login,/sanctum/token,/login`)
//! - `BAZAAR_PATH_REGISTER` (default: `/auth/register,/register`)
//! - `BAZAAR_PATH_LOGOUT` (default: `/auth/logout,/logout`)
//! - `BAZAAR_PATH_PROFILE` (default: `/auth/profile,/user`)
//! - `BAZAAR_PATH_HANDSHAKE` (default: `/sanctum/csrf-cookie`)
//! - `BAZAAR_PATH_HEALTH` (default: `/health-check`)
//! - `BAZAAR_PATH_CATEGORIES` (default: `/categories`)
//! - `BAZAAR_PATH_PRODUCTS` (default: `/products`)
//! - `BAZAAR_PATH_TRENDING` (default: `/products/trending`)
//! - `BAZAAR_PATH_FAVORITES` (default: `/favorites`)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_DEV_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_DEVICE_NAME: &str = "Bazaar Mobile";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Build environment the client runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// The environment implied by the build profile.
    #[must_use]
    pub const fn from_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("expected development or production, got {other:?}")),
        }
    }
}

/// Request timeouts per endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Catalog, favorites and everything else.
    pub default: Duration,
    /// Login, register, logout and profile.
    pub auth: Duration,
    /// CSRF handshake and health probes.
    pub handshake: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(15),
            auth: Duration::from_secs(10),
            handshake: Duration::from_secs(5),
        }
    }
}

/// Backend endpoint paths.
///
/// Auth endpoints take an ordered list of candidates because deployed
/// backends disagree on where they live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub handshake: String,
    pub health: String,
    pub login: Vec<String>,
    pub register: Vec<String>,
    pub logout: Vec<String>,
    pub profile: Vec<String>,
    pub categories: String,
    pub products: String,
    pub trending: String,
    pub favorites: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            handshake: "/sanctum/csrf-cookie".to_string(),
            health: "/health-check".to_string(),
            login: paths(&["/auth/login", "/sanctum/token", "/login"]),
            register: paths(&["/auth/register", "/register"]),
            logout: paths(&["/auth/logout", "/logout"]),
            profile: paths(&["/auth/profile", "/user"]),
            categories: "/categories".to_string(),
            products: "/products".to_string(),
            trending: "/products/trending".to_string(),
            favorites: "/favorites".to_string(),
        }
    }
}

/// Marketplace client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Development or production.
    pub environment: Environment,
    /// Backend base URL.
    pub base_url: Url,
    /// Prefix applied to API paths (e.g. `/api`).
    pub api_prefix: String,
    /// Paths sent without the prefix (auth bootstrap).
    pub unprefixed_paths: Vec<String>,
    /// Request timeouts.
    pub timeouts: Timeouts,
    /// Endpoint paths.
    pub paths: EndpointPaths,
    /// Sent as `device_name` when requesting a token.
    pub device_name: String,
    /// Where the session is persisted, when file storage is used.
    pub session_file: Option<PathBuf>,
    /// Requested developer-mode bypass. See [`ClientConfig::dev_bypass_active`].
    pub dev_bypass: bool,
}

impl ClientConfig {
    /// Configuration with defaults for the given backend.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        let paths = EndpointPaths::default();
        let unprefixed_paths = vec![
            paths.handshake.clone(),
            "/sanctum/token".to_string(),
        ];

        Self {
            environment: Environment::from_build(),
            base_url,
            api_prefix: "/api".to_string(),
            unprefixed_paths,
            timeouts: Timeouts::default(),
            paths,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            session_file: None,
            dev_bypass: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = match get_optional_env("BAZAAR_ENV") {
            Some(value) => value
                .parse::<Environment>()
                .map_err(|e| ConfigError::InvalidEnvVar("BAZAAR_ENV".to_string(), e))?,
            None => Environment::from_build(),
        };

        let base_url = get_base_url(environment)?;
        let mut config = Self::new(base_url);
        config.environment = environment;

        if let Some(prefix) = get_optional_env("BAZAAR_API_PREFIX") {
            config.api_prefix = prefix;
        }

        config.timeouts = Timeouts {
            default: get_secs("BAZAAR_TIMEOUT_SECS", config.timeouts.default)?,
            auth: get_secs("BAZAAR_AUTH_TIMEOUT_SECS", config.timeouts.auth)?,
            handshake: get_secs("BAZAAR_HANDSHAKE_TIMEOUT_SECS", config.timeouts.handshake)?,
        };

        let defaults = EndpointPaths::default();
        config.paths = EndpointPaths {
            handshake: get_env_or_default("BAZAAR_PATH_HANDSHAKE", &defaults.handshake),
            health: get_env_or_default("BAZAAR_PATH_HEALTH", &defaults.health),
            login: get_path_list("BAZAAR_PATH_LOGIN", defaults.login),
            register: get_path_list("BAZAAR_PATH_REGISTER", defaults.register),
            logout: get_path_list("BAZAAR_PATH_LOGOUT", defaults.logout),
            profile: get_path_list("BAZAAR_PATH_PROFILE", defaults.profile),
            categories: get_env_or_default("BAZAAR_PATH_CATEGORIES", &defaults.categories),
            products: get_env_or_default("BAZAAR_PATH_PRODUCTS", &defaults.products),
            trending: get_env_or_default("BAZAAR_PATH_TRENDING", &defaults.trending),
            favorites: get_env_or_default("BAZAAR_PATH_FAVORITES", &defaults.favorites),
        };
        if !config.unprefixed_paths.contains(&config.paths.handshake) {
            config.unprefixed_paths.push(config.paths.handshake.clone());
        }

        config.device_name = get_optional_env("BAZAAR_DEVICE_NAME")
            .or_else(|| get_optional_env("HOSTNAME"))
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());

        config.session_file = get_optional_env("BAZAAR_SESSION_FILE")
            .map(PathBuf::from)
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("bazaar").join("session.json")));

        config.dev_bypass = match get_optional_env("BAZAAR_DEV_BYPASS") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidEnvVar("BAZAAR_DEV_BYPASS".to_string(), value.clone())
            })?,
            None => false,
        };

        Ok(config)
    }

    /// Whether the developer-mode bypass is in effect.
    ///
    /// Requires the `dev-bypass` feature, the development environment, and
    /// the flag itself. Always `false` otherwise.
    #[must_use]
    pub const fn dev_bypass_active(&self) -> bool {
        cfg!(feature = "dev-bypass")
            && matches!(self.environment, Environment::Development)
            && self.dev_bypass
    }

    /// Whether this is a development build/environment.
    #[must_use]
    pub const fn is_development(&self) -> bool {
        matches!(self.environment, Environment::Development)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| (*p).to_string()).collect()
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating blank as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Resolve the base URL for the environment.
fn get_base_url(environment: Environment) -> Result<Url, ConfigError> {
    let (key, raw) = if let Some(url) = get_optional_env("BAZAAR_API_URL") {
        ("BAZAAR_API_URL", url)
    } else {
        match environment {
            Environment::Development => (
                "BAZAAR_DEV_API_URL",
                get_env_or_default("BAZAAR_DEV_API_URL", DEFAULT_DEV_API_URL),
            ),
            Environment::Production => (
                "BAZAAR_PROD_API_URL",
                get_required_env("BAZAAR_PROD_API_URL")?,
            ),
        }
    };

    parse_base_url(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e))
}

/// Parse and sanity-check a base URL.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme {other:?}")),
    }
}

/// Parse a timeout in whole seconds.
fn get_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "timeout must be at least one second".to_string(),
        )),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

/// Parse a comma-separated path list, falling back to the defaults.
fn get_path_list(key: &str, default: Vec<String>) -> Vec<String> {
    get_optional_env(key).map_or(default, |value| split_paths(&value))
}

fn split_paths(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
