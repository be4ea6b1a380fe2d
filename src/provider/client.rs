use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{Endpoint, FixtureProvider, ProviderError, raw::Envelope};

const API_KEY_HEADER: &str = "x-apisports-key";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// API-Football style HTTP client.
#[derive(Clone)]
pub struct ApiFootballClient {
    client: Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
}

impl ApiFootballClient {
    /// Client for `base_url` authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| ProviderError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: Arc::from(api_key),
        })
    }

    async fn get(&self, endpoint: Endpoint, fixture_id: u64) -> Result<Vec<Value>, ProviderError> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        debug!(%endpoint, fixture_id, "fetching from provider");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.api_key.as_ref())
            .query(&[(endpoint.id_param(), fixture_id)])
            .send()
            .await
            .map_err(|source| ProviderError::Request { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status { endpoint, status });
        }

        let envelope = response
            .json::<Envelope>()
            .await
            .map_err(|source| ProviderError::Decode { endpoint, source })?;

        if let Some(message) = envelope.error_message() {
            return Err(ProviderError::Rejected { endpoint, message });
        }
        Ok(envelope.response)
    }
}

impl FixtureProvider for ApiFootballClient {
    fn fetch(
        &self,
        endpoint: Endpoint,
        fixture_id: u64,
    ) -> BoxFuture<'static, Result<Vec<Value>, ProviderError>> {
        let client = self.clone();
        Box::pin(async move { client.get(endpoint, fixture_id).await })
    }
}
