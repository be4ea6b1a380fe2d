//! Application-level configuration loading: provider endpoint, polling and
//! cache timings, and the chat eligibility lists.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    cache::DEFAULT_FETCH_TIMEOUT, services::sync_service::SyncSettings,
    state::chat_access::EligibilityRules,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_MATCH_CONFIG_PATH";
const DEFAULT_PROVIDER_URL: &str = "https://v3.football.api-sports.io";
const DEFAULT_CACHE_NAMESPACE: &str = "live-match";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub provider_base_url: String,
    pub sync: SyncSettings,
    pub fetch_timeout: Duration,
    pub cache_namespace: String,
    pub eligibility: EligibilityRules,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        poll_interval = ?config.sync.poll_interval,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider_base_url: DEFAULT_PROVIDER_URL.into(),
            sync: SyncSettings::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.into(),
            eligibility: EligibilityRules::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    provider_base_url: Option<String>,
    cache_namespace: Option<String>,
    #[serde(default)]
    timings: RawTimings,
    eligibility: Option<EligibilityRules>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
/// Durations in seconds.
struct RawTimings {
    poll_interval_secs: Option<u64>,
    max_backoff_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    fixture_ttl_secs: Option<u64>,
    events_ttl_secs: Option<u64>,
    statistics_ttl_secs: Option<u64>,
    lineups_ttl_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let timings = value.timings;
        let secs = |raw: Option<u64>, fallback: Duration| raw.map_or(fallback, Duration::from_secs);

        Self {
            provider_base_url: value
                .provider_base_url
                .unwrap_or(defaults.provider_base_url),
            sync: SyncSettings {
                poll_interval: secs(timings.poll_interval_secs, defaults.sync.poll_interval),
                max_backoff: secs(timings.max_backoff_secs, defaults.sync.max_backoff),
                fixture_ttl: secs(timings.fixture_ttl_secs, defaults.sync.fixture_ttl),
                events_ttl: secs(timings.events_ttl_secs, defaults.sync.events_ttl),
                statistics_ttl: secs(timings.statistics_ttl_secs, defaults.sync.statistics_ttl),
                lineups_ttl: secs(timings.lineups_ttl_secs, defaults.sync.lineups_ttl),
            },
            fetch_timeout: secs(timings.fetch_timeout_secs, defaults.fetch_timeout),
            cache_namespace: value.cache_namespace.unwrap_or(defaults.cache_namespace),
            eligibility: value.eligibility.unwrap_or(defaults.eligibility),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.sync.poll_interval, Duration::from_secs(15));
        assert_eq!(config.sync.lineups_ttl, Duration::from_secs(600));
        assert_eq!(config.fetch_timeout, Duration::from_secs(12));
        assert_eq!(config.eligibility, EligibilityRules::default());
    }

    #[test]
    fn overrides_timings_and_eligibility() {
        let config = AppConfig::from_json(
            r#"{
                "provider_base_url": "http://localhost:9000",
                "timings": { "poll_interval_secs": 5, "fetch_timeout_secs": 3 },
                "eligibility": {
                    "top_leagues": [{ "name": "Ligue 1" }],
                    "major_tournaments": [],
                    "priority_teams": [],
                    "rivalries": [["Lyon", "Saint-Etienne"]],
                    "marquee": []
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.provider_base_url, "http://localhost:9000");
        assert_eq!(config.sync.poll_interval, Duration::from_secs(5));
        assert_eq!(config.sync.max_backoff, Duration::from_secs(120));
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.eligibility.top_leagues[0].id, None);
        assert_eq!(config.eligibility.rivalries.len(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::from_json(r#"{ "colours": [] }"#).is_err());
    }
}
