//! Configuration types.

use std::time::Duration;

use crate::agent::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::error::ConfigError;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name for identification.
    pub name: String,
    /// System prompt given to every new session.
    pub system_prompt: String,
    /// Provider round-trips allowed per user turn.
    pub max_iterations: usize,
    /// Extra attempts after a transient provider failure.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub retry_max_delay: Duration,
    /// Timeout applied to each provider attempt.
    pub provider_timeout: Duration,
    /// Session idle timeout (idle sessions are evicted from memory after this duration).
    pub session_idle_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "jaci-ai".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: 5,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
            provider_timeout: Duration::from_secs(30),
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl AgentConfig {
    /// Build from `CONVEXA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            system_prompt: std::env::var("CONVEXA_SYSTEM_PROMPT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.system_prompt),
            max_iterations: env_parse_nonzero("CONVEXA_MAX_ITERATIONS", defaults.max_iterations)?,
            max_retries: env_parse("CONVEXA_MAX_RETRIES", defaults.max_retries)?,
            provider_timeout: Duration::from_secs(env_parse_nonzero(
                "CONVEXA_PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout.as_secs(),
            )?),
            session_idle_timeout: Duration::from_secs(env_parse_nonzero(
                "CONVEXA_SESSION_IDLE_TIMEOUT_SECS",
                defaults.session_idle_timeout.as_secs(),
            )?),
            ..defaults
        })
    }
}

/// Server and storage settings for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub http_port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            db_path: std::env::var("CONVEXA_DB_PATH")
                .unwrap_or_else(|_| "./data/convexa.db".to_string()),
            http_port: env_parse("CONVEXA_HTTP_PORT", 8080)?,
        })
    }
}

/// Parse an optional environment variable, rejecting malformed values.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

/// Like `env_parse`, but zero is rejected.
fn env_parse_nonzero<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_nonzero(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_nonzero<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value: T = parse_value(key, raw)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: must be greater than zero"),
        });
    }
    Ok(value)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_turn_bounds() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert!(config.system_prompt.contains("Jaci.AI"));
    }

    #[test]
    fn parse_value_accepts_numbers() {
        let v: usize = parse_value("CONVEXA_MAX_ITERATIONS", " 7 ").unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn parse_value_rejects_garbage() {
        let err = parse_value::<u32>("CONVEXA_MAX_RETRIES", "three").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "CONVEXA_MAX_RETRIES"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_iterations_and_timeouts_are_rejected() {
        let err = parse_nonzero::<usize>("CONVEXA_MAX_ITERATIONS", "0").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "CONVEXA_MAX_ITERATIONS");
                assert!(message.contains("greater than zero"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_nonzero::<u64>("CONVEXA_PROVIDER_TIMEOUT_SECS", " 0 ").is_err());
        assert!(parse_nonzero::<u64>("CONVEXA_SESSION_IDLE_TIMEOUT_SECS", "0").is_err());
        assert_eq!(parse_nonzero::<u64>("CONVEXA_PROVIDER_TIMEOUT_SECS", "15").unwrap(), 15);
    }
}
