//! Shared render client
//!
//! The render client wraps the JavaScript-capable rendering engine behind the
//! `Renderer` trait and adds the process-wide page cache. One instance is
//! created by the listener and shared by every worker through an `Arc`.

use crate::memory::MemoryMonitor;
use crate::retrieval::cache::PageCache;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Faults of the rendering engine
///
/// None of these say anything about the page itself: the caller falls back to
/// a plain fetch on every variant.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Render of {url} failed: {message}")]
    Engine { url: String, message: String },

    #[error("Render of {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

/// A rendering engine that loads a page with scripts enabled
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Loads `url`, waits for the page to settle and returns the serialized DOM
    ///
    /// The engine gives up after `timeout` and releases whatever it opened for
    /// the page on every path, including the timeout.
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, RenderError>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Process-wide render client with a bounded page cache
///
/// Thread safety: `render`, `clear_cache` and `cache_len` may be called
/// concurrently from any number of workers. Cached content is reference
/// counted, so clearing the cache while a render is in flight only drops the
/// cache's own references.
pub struct RenderClient {
    renderer: Arc<dyn Renderer>,
    cache: PageCache,
    memory: Arc<dyn MemoryMonitor>,
    timeout: Duration,
}

impl RenderClient {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        cache: PageCache,
        memory: Arc<dyn MemoryMonitor>,
        timeout: Duration,
    ) -> Self {
        tracing::info!(
            "Render client using {} (cache capacity {}, timeout {:?})",
            renderer.name(),
            cache.capacity(),
            timeout
        );
        Self {
            renderer,
            cache,
            memory,
            timeout,
        }
    }

    /// Renders `url`, answering from the cache when possible
    ///
    /// After a fresh render the cache is cleared if memory is short.
    pub async fn render(&self, url: &str) -> Result<Arc<str>, RenderError> {
        if let Some(content) = self.cache.get(url).await {
            tracing::debug!("Render cache hit for {}", url);
            return Ok(content);
        }

        let before = self.memory.status();

        // The render runs in its own task, so a timeout here never cancels
        // the engine halfway and the page is still released when it finishes
        let renderer = Arc::clone(&self.renderer);
        let target = url.to_string();
        let timeout = self.timeout;
        let mut task = tokio::spawn(async move { renderer.render(&target, timeout).await });

        let content = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(RenderError::Engine {
                    url: url.to_string(),
                    message: format!("render task failed: {}", e),
                })
            }
            Err(_) => {
                tracing::debug!("Render of {} left to finish in the background", url);
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                });
            }
        };
        let content: Arc<str> = Arc::from(content);
        self.cache.insert(url, Arc::clone(&content)).await;

        let after = self.memory.status();
        if self.memory.short_status() {
            let dropped = self.cache.clear().await;
            tracing::info!(
                "Memory is short, cleared {} pages from the render cache",
                dropped
            );
        }

        tracing::info!(
            "Rendered {}; used {} bytes",
            url,
            before.available.saturating_sub(after.available)
        );
        Ok(content)
    }

    /// Drops every cached page
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }
}
