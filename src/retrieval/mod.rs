//! Content retrieval with render-to-plain fail-over
//!
//! This module contains the two retrieval paths and their composition:
//! - `render`: the shared render client (JavaScript-capable, cached)
//! - `http`: the plain HTTP fetcher
//! - `warc`: framing of retrieved pages into the stored asset
//!
//! A render is attempted first when the crawl allows it. Whatever goes wrong
//! inside the rendering engine is a `RenderFault`, which is answered with
//! exactly one plain fetch of the same URL. Only a failed plain fetch is
//! reported to the caller.

mod cache;
mod chromium;
mod http;
mod render;
mod warc;

pub use cache::{CachedPage, PageCache, DEFAULT_CACHE_CAPACITY};
pub use chromium::{ChromiumRenderer, ChromiumSettings};
pub use http::{build_http_client, plain_fetch, MAX_REDIRECTS};
pub use render::{RenderClient, RenderError, Renderer};
pub use warc::{build_payload, page_record, Payload};

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

/// Failures of the plain fetch path
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },
}

/// Which path produced a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPath {
    Render,
    Plain,
}

/// A page retrieved by either path
#[derive(Debug, Clone)]
pub struct RetrievedPage {
    /// The requested URL
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    /// HTTP status, `None` when the rendering engine does not report one
    pub status: Option<u16>,

    pub headers: Vec<(String, String)>,

    pub body: Vec<u8>,

    pub path: FetchPath,

    pub fetched_at: DateTime<Utc>,
}

impl RetrievedPage {
    /// Wraps a rendered DOM as a page
    pub fn rendered(url: &str, content: &str) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status: None,
            headers: vec![(
                "content-type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: content.as_bytes().to_vec(),
            path: FetchPath::Render,
            fetched_at: Utc::now(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Result of a single retrieval step
#[derive(Debug)]
pub enum FetchOutcome {
    /// The page was retrieved
    Success(RetrievedPage),

    /// The rendering engine failed; the page itself is not implicated
    RenderFault(RenderError),

    /// The content could not be retrieved
    Failure(RetrievalError),
}

/// Parameters of one retrieval
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub headless: bool,
    pub depth: u32,
    pub crawling_depth: u32,
    pub priority: i64,
}

/// Two-tier content retriever
///
/// Cheap to clone; clones share the render client and the HTTP client.
#[derive(Clone)]
pub struct ContentRetriever {
    render: Arc<RenderClient>,
    http: Client,
}

impl ContentRetriever {
    pub fn new(render: Arc<RenderClient>, http: Client) -> Self {
        Self { render, http }
    }

    pub fn render_client(&self) -> &Arc<RenderClient> {
        &self.render
    }

    /// Retrieves one URL, rendering first when `request.headless` is set
    ///
    /// # Returns
    ///
    /// * `Ok(RetrievedPage)` - From the render path, or from the plain path
    ///   after a render fault or when rendering was not allowed
    /// * `Err(RetrievalError)` - The plain fetch failed
    pub async fn fetch(&self, request: &FetchRequest<'_>) -> Result<RetrievedPage, RetrievalError> {
        tracing::debug!(
            "Retrieving {} (headless: {}, depth {}/{}, priority {})",
            request.url,
            request.headless,
            request.depth,
            request.crawling_depth,
            request.priority
        );

        let first = if request.headless {
            self.render_step(request.url).await
        } else {
            self.plain_step(request.url).await
        };

        let outcome = match first {
            FetchOutcome::RenderFault(fault) => {
                tracing::warn!(
                    "Render fault for {}, failing over to plain fetch: {}",
                    request.url,
                    fault
                );
                self.plain_step(request.url).await
            }
            other => other,
        };

        match outcome {
            FetchOutcome::Success(page) => Ok(page),
            FetchOutcome::Failure(e) => Err(e),
            // plain_step never yields a render fault
            FetchOutcome::RenderFault(fault) => Err(RetrievalError::Connect {
                url: request.url.to_string(),
                message: fault.to_string(),
            }),
        }
    }

    /// Attempts the render path
    pub async fn render_step(&self, url: &str) -> FetchOutcome {
        match self.render.render(url).await {
            Ok(content) => FetchOutcome::Success(RetrievedPage::rendered(url, &content)),
            Err(fault) => FetchOutcome::RenderFault(fault),
        }
    }

    /// Attempts the plain path
    pub async fn plain_step(&self, url: &str) -> FetchOutcome {
        match plain_fetch(&self.http, url).await {
            Ok(page) => FetchOutcome::Success(page),
            Err(e) => FetchOutcome::Failure(e),
        }
    }
}
