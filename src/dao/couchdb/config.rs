use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

/// Server-side wait of a `_changes` long-poll before it returns empty.
pub const DEFAULT_CHANGES_TIMEOUT: Duration = Duration::from_secs(25);
/// Upper bound for establishing a connection to the server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the chat database lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding chat, presence and cache documents.
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Long-poll duration of the room change feed.
    pub changes_timeout: Duration,
    pub connect_timeout: Duration,
}

impl CouchConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
            changes_timeout: DEFAULT_CHANGES_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read `COUCH_BASE_URL`, `COUCH_DB`, the optional `COUCH_USERNAME` /
    /// `COUCH_PASSWORD` pair and `COUCH_CHANGES_TIMEOUT_SECS`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> CouchResult<Self> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .ok_or(CouchDaoError::MissingEnvVar { var })
        };

        let mut config = Self::new(required("COUCH_BASE_URL")?, required("COUCH_DB")?);

        if let (Some(username), Some(password)) = (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            config = config.with_credentials(username, password);
        }

        if let Some(raw) = lookup("COUCH_CHANGES_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(CouchDaoError::InvalidEnvVar {
                    var: "COUCH_CHANGES_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
            config.changes_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn requires_url_and_database() {
        let err = CouchConfig::from_lookup(lookup(&[("COUCH_BASE_URL", "http://couch:5984")]))
            .unwrap_err();
        assert!(matches!(err, CouchDaoError::MissingEnvVar { var: "COUCH_DB" }));
    }

    #[test]
    fn reads_credentials_and_timeout() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_DB", "live_match"),
            ("COUCH_USERNAME", "admin"),
            ("COUCH_PASSWORD", "secret"),
            ("COUCH_CHANGES_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.database, "live_match");
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.changes_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn rejects_a_zero_timeout() {
        let err = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_DB", "live_match"),
            ("COUCH_CHANGES_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CouchDaoError::InvalidEnvVar { .. }));
    }
}
