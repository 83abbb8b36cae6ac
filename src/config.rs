//! Environment configuration

use std::str::FromStr;
use std::time::Duration;
use crate::gateway::HttpGatewayConfig;
use crate::sync::SyncConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub page_size: u32,
    pub poll_interval: Duration,
    pub search_debounce: Duration,
    pub http_timeout: Duration,
    pub max_poll_backoff_ticks: u32,
}

impl Config {
    /// Reads `BREW_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("BREW_API_URL").filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing("BREW_API_URL"))?;
        let page_size: u32 = parse(&lookup, "BREW_PAGE_SIZE", 20)?;
        if page_size == 0 { return Err(ConfigError::Invalid { key: "BREW_PAGE_SIZE", value: "0".into() }); }
        Ok(Self {
            api_url,
            api_token: lookup("BREW_API_TOKEN").filter(|v| !v.is_empty()),
            page_size,
            poll_interval: Duration::from_secs(parse(&lookup, "BREW_POLL_INTERVAL_SECS", 30)?),
            search_debounce: Duration::from_millis(parse(&lookup, "BREW_SEARCH_DEBOUNCE_MS", 300)?),
            http_timeout: Duration::from_secs(parse(&lookup, "BREW_HTTP_TIMEOUT_SECS", 30)?),
            max_poll_backoff_ticks: parse(&lookup, "BREW_MAX_POLL_BACKOFF_TICKS", 8)?,
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            page_size: self.page_size,
            poll_interval: self.poll_interval,
            search_debounce: self.search_debounce,
            max_backoff_ticks: self.max_poll_backoff_ticks,
        }
    }

    pub fn gateway_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig::new(&self.api_url).with_timeout(self.http_timeout)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("BREW_API_URL", "http://localhost:8000/api")])).unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.sync_config().search_debounce, Duration::from_millis(300));
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn test_invalid_and_missing() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap_err(), ConfigError::Missing("BREW_API_URL"));
        let err = Config::from_lookup(lookup(&[("BREW_API_URL", "http://x"), ("BREW_POLL_INTERVAL_SECS", "soon")])).unwrap_err();
        assert_eq!(err, ConfigError::Invalid { key: "BREW_POLL_INTERVAL_SECS", value: "soon".into() });
        assert!(Config::from_lookup(lookup(&[("BREW_API_URL", "http://x"), ("BREW_PAGE_SIZE", "0")])).is_err());
    }
}
