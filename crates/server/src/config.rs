//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MEALTRACK_DATABASE_URL` - `PostgreSQL` connection string
//! - `MEALTRACK_SESSION_SECRET` - Session signing secret (min 32 chars)
//!
//! ## Optional
//! - `MEALTRACK_HOST` - Bind address (default: 127.0.0.1)
//! - `MEALTRACK_PORT` - Listen port (default: 5000)
//! - `MEALTRACK_ALLOWED_ORIGIN` - Dashboard origin for CORS
//!   (default: <http://localhost:3000>)
//! - `MEALTRACK_ALLOW_STATUS_ROLLBACK` - Permit backward status moves
//!   (default: false)
//! - `MEALTRACK_SEED_DEMO_USERS` - Create demo staff accounts on startup
//!   when the users table is empty (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Meal workflow service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Origin of the dashboard front end, allowed for CORS with credentials
    pub allowed_origin: String,
    /// Whether backward status moves are permitted in the workflow engine
    pub allow_status_rollback: bool,
    /// Whether to create demo staff accounts when the users table is empty
    pub seed_demo_users: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the session secret fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MEALTRACK_DATABASE_URL")?;
        let host = get_env_or_default("MEALTRACK_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("MEALTRACK_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("MEALTRACK_PORT", "5000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("MEALTRACK_PORT".to_string(), e.to_string()))?;
        let session_secret = get_required_secret("MEALTRACK_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "MEALTRACK_SESSION_SECRET")?;
        let allowed_origin = get_env_or_default("MEALTRACK_ALLOWED_ORIGIN", "http://localhost:3000");
        let allow_status_rollback = get_bool_env("MEALTRACK_ALLOW_STATUS_ROLLBACK")?;
        let seed_demo_users = get_bool_env("MEALTRACK_SEED_DEMO_USERS")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            database_url,
            host,
            port,
            session_secret,
            allowed_origin,
            allow_status_rollback,
            seed_demo_users,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a boolean environment variable (absent means false).
fn get_bool_env(key: &str) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(false),
        Ok(value) => match value.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("expected a boolean, got '{other}'"),
            )),
        },
    }
}

/// Validate that a session secret meets minimum length requirements and is
/// not an obvious placeholder.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }

    let lower = value.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_session_secret_placeholder() {
        let secret = SecretString::from("your-session-secret-goes-here-okay");
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_session_secret_valid() {
        let secret = SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6d");
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 5000,
            session_secret: SecretString::from("x".repeat(32)),
            allowed_origin: "http://localhost:3000".to_string(),
            allow_status_rollback: false,
            seed_demo_users: false,
            sentry_dsn: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 5000);
    }
}
