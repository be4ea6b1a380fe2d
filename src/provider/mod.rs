//! Upstream fixture-data provider: HTTP client plus per-endpoint adapters.

pub mod adapter;
mod client;
mod raw;

use std::fmt;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub use client::ApiFootballClient;

/// Endpoints consumed from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Fixture,
    Events,
    Statistics,
    Lineups,
}

impl Endpoint {
    /// Path relative to the provider base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Fixture => "fixtures",
            Endpoint::Events => "fixtures/events",
            Endpoint::Statistics => "fixtures/statistics",
            Endpoint::Lineups => "fixtures/lineups",
        }
    }

    /// Query parameter carrying the fixture id.
    pub fn id_param(self) -> &'static str {
        match self {
            Endpoint::Fixture => "id",
            _ => "fixture",
        }
    }

    /// Cache key of this endpoint for one fixture.
    pub fn cache_key(self, fixture_id: u64) -> String {
        format!("{}:{}", self.path(), fixture_id)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Failures talking to the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to build provider client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("request to `{endpoint}` failed")]
    Request {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider answered {status} for `{endpoint}`")]
    Status {
        endpoint: Endpoint,
        status: StatusCode,
    },
    #[error("undecodable provider payload for `{endpoint}`")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider rejected `{endpoint}`: {message}")]
    Rejected { endpoint: Endpoint, message: String },
}

/// Read-only source of fixture data. Implementations return the untyped
/// `response` array; an empty array means "no data".
pub trait FixtureProvider: Send + Sync {
    fn fetch(
        &self,
        endpoint: Endpoint,
        fixture_id: u64,
    ) -> BoxFuture<'static, Result<Vec<Value>, ProviderError>>;
}
