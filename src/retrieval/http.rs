//! Plain HTTP fetcher
//!
//! This module handles the non-rendering retrieval path:
//! - Building the shared HTTP client with the configured user agent
//! - GET requests without script execution
//! - Error classification into transport failures
//!
//! Any HTTP response, including 4xx and 5xx, is a retrieved page. Only a
//! transport failure (bad URL, DNS, refused connection, timeout, broken body)
//! means the content could not be retrieved.

use crate::config::HttpConfig;
use crate::retrieval::{FetchPath, RetrievalError, RetrievedPage};
use chrono::Utc;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Maximum redirect hops followed by the plain fetcher
pub const MAX_REDIRECTS: usize = 10;

/// Builds the shared HTTP client used for plain fetches
///
/// # Arguments
///
/// * `config` - Timeouts for the client
/// * `user_agent` - The resolved user agent string
///
/// # Example
///
/// ```no_run
/// use grid_loader::config::HttpConfig;
/// use grid_loader::retrieval::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default(), "yacybot").unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig, user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches `url` without script execution
///
/// # Returns
///
/// * `Ok(RetrievedPage)` - A response was received, whatever its status
/// * `Err(RetrievalError)` - The request could not be completed
pub async fn plain_fetch(client: &Client, url: &str) -> Result<RetrievedPage, RetrievalError> {
    let parsed = url::Url::parse(url).map_err(|e| RetrievalError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = response
        .bytes()
        .await
        .map_err(|e| classify_error(url, e))?
        .to_vec();

    tracing::debug!("Plain fetch of {} returned HTTP {} ({} bytes)", url, status, body.len());

    Ok(RetrievedPage {
        url: url.to_string(),
        final_url,
        status: Some(status),
        headers,
        body,
        path: FetchPath::Plain,
        fetched_at: Utc::now(),
    })
}

/// Maps a reqwest error onto the retrieval error taxonomy
fn classify_error(url: &str, error: reqwest::Error) -> RetrievalError {
    if error.is_timeout() {
        RetrievalError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        RetrievalError::Connect {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        RetrievalError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}
