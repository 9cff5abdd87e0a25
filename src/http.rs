//! Blocking HTTP retrieval for absolute-URL references

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use url::Url;

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Thin wrapper around a blocking `reqwest` client
///
/// Every request is bounded by the configured timeout. No retries are
/// performed; a failed GET is reported to the caller as-is.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build a client using the timeout and user agent from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| Error::Settings {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// GET `url`, returning the body of a 2xx response.
    pub fn get(&self, url: &Url) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}
