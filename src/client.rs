use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::ResolvedConfig;
use crate::error::StatsError;

/// Raw response of one stats request. The body is kept verbatim.
#[derive(Debug, Clone)]
pub struct StatsResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl StatsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait StatsClient: Send + Sync {
    /// Issues `GET {base}/{location}/`. Transport failures are errors; any
    /// HTTP status is returned as a response.
    fn fetch_stats(&self, location: &str) -> Result<StatsResponse, StatsError>;
}

#[derive(Clone)]
pub struct StatsHttpClient {
    client: Client,
    base_url: String,
}

impl StatsHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, StatsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("epistats/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| StatsError::InvalidConfig(err.to_string()))?,
        );
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|err| StatsError::InvalidConfig(format!("api_key: {err}")))?;
        api_key.set_sensitive(true);
        headers.insert("Subscription-Key", api_key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| StatsError::FetchFailed {
                location: config.base_url.clone(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn stats_url(&self, location: &str) -> String {
        format!("{}/{location}/", self.base_url)
    }
}

impl StatsClient for StatsHttpClient {
    fn fetch_stats(&self, location: &str) -> Result<StatsResponse, StatsError> {
        let fetch_failed = |err: reqwest::Error| StatsError::FetchFailed {
            location: location.to_string(),
            message: err.to_string(),
        };
        let response = self
            .client
            .get(self.stats_url(location))
            .send()
            .map_err(fetch_failed)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(fetch_failed)?;
        Ok(StatsResponse {
            status,
            body: body.to_vec(),
        })
    }
}
