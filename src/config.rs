use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;

use crate::error::AppError;

const DEFAULT_DATABASE_URL: &str = "sqlite://message_mirror.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_TRANSITION_MS: u64 = 300;
const DEFAULT_PUSH_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Collection endpoint of the remote API. Always ends with `/`.
    pub api_base_url: Url,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub transition: Duration,
    pub start_offline: bool,
    pub reconcile_interval: Option<Duration>,
    pub push_buffer: usize,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let api_base_url = env::var("MESSAGE_API_URL")
            .map_err(|_| AppError::Config("MESSAGE_API_URL is not set".to_string()))?;
        let mut config = Self::for_base_url(&api_base_url)?;

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(addr) = env::var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;
        }
        if let Some(ms) = parse_var::<u64>("TRANSITION_MS")? {
            config.transition = Duration::from_millis(ms);
        }
        if let Some(offline) = parse_var::<bool>("START_OFFLINE")? {
            config.start_offline = offline;
        }
        config.reconcile_interval = parse_var::<u64>("RECONCILE_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(buffer) = parse_var::<usize>("PUSH_BUFFER")? {
            config.push_buffer = buffer.max(1);
        }

        Ok(config)
    }

    /// Defaults for everything except the remote endpoint.
    pub fn for_base_url(raw: &str) -> Result<Self, AppError> {
        let bind_addr = DEFAULT_BIND_ADDR
            .parse()
            .map_err(|_| AppError::Config("default bind address is invalid".to_string()))?;

        Ok(Self {
            api_base_url: normalize_base_url(raw)?,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr,
            transition: Duration::from_millis(DEFAULT_TRANSITION_MS),
            start_offline: false,
            reconcile_interval: None,
            push_buffer: DEFAULT_PUSH_BUFFER,
        })
    }
}

/// The remote treats the trailing slash as significant, so the collection
/// URL is stored with one and item URLs are built by appending `<id>/`.
pub fn normalize_base_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| AppError::Config(format!("Invalid API url {}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(AppError::Config(format!("API url {} cannot be a base", raw)));
    }
    Ok(url)
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = normalize_base_url("http://example.test/api/v2/message").unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/v2/message/");

        let url = normalize_base_url("http://example.test/api/v2/message/").unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/v2/message/");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = normalize_base_url("not a url").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::for_base_url("http://example.test/message/").unwrap();
        assert_eq!(config.transition, Duration::from_millis(300));
        assert!(!config.start_offline);
        assert!(config.reconcile_interval.is_none());
        assert_eq!(config.push_buffer, 64);
    }
}
