//! Chromium rendering engine
//!
//! Drives a headless Chromium over the DevTools protocol. The browser process
//! is launched on first use, so a host without Chromium still runs the loader:
//! every render then fails with `RenderError::Launch` and the retriever falls
//! back to plain fetching. When the DevTools connection drops, the next render
//! launches a fresh browser.

use crate::retrieval::render::{RenderError, Renderer};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Launch settings for the Chromium renderer
#[derive(Debug, Clone, Default)]
pub struct ChromiumSettings {
    /// Browser executable, auto-detected when `None`
    pub executable: Option<PathBuf>,

    /// User agent presented by rendered pages
    pub user_agent: String,
}

/// A launched browser and the liveness flag of its handler task
struct Session {
    browser: Arc<Browser>,
    alive: Arc<AtomicBool>,
}

pub struct ChromiumRenderer {
    settings: ChromiumSettings,
    session: Mutex<Option<Session>>,
}

impl ChromiumRenderer {
    pub fn new(settings: ChromiumSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
        }
    }

    /// True while a launched browser is connected
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| session.alive.load(Ordering::SeqCst))
    }

    /// Returns the running browser, launching a new one if there is none or
    /// the previous one lost its connection
    async fn browser(&self) -> Result<Arc<Browser>, RenderError> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            if current.alive.load(Ordering::SeqCst) {
                return Ok(Arc::clone(&current.browser));
            }
            tracing::warn!("Browser connection lost, relaunching");
        }
        *session = None;

        let launched = self.launch().await?;
        let browser = Arc::clone(&launched.browser);
        *session = Some(launched);
        Ok(browser)
    }

    async fn launch(&self) -> Result<Session, RenderError> {
        let mut builder =
            BrowserConfig::builder().arg(format!("--user-agent={}", self.settings.user_agent));
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        tracing::info!("Launching headless browser");
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        Ok(Session {
            browser: Arc::new(browser),
            alive: watch_handler(handler),
        })
    }
}

/// Polls the DevTools handler in its own task
///
/// The returned flag drops to false once the handler stream ends or fails.
fn watch_handler<S, T, E>(mut handler: S) -> Arc<AtomicBool>
where
    S: Stream<Item = Result<T, E>> + Unpin + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let alive = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&alive);
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("Browser handler stopped: {}", e);
                break;
            }
        }
        flag.store(false, Ordering::SeqCst);
    });
    alive
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, RenderError> {
        let engine_error = |e: chromiumoxide::error::CdpError| RenderError::Engine {
            url: url.to_string(),
            message: e.to_string(),
        };

        let browser = self.browser().await?;
        let page = browser.new_page("about:blank").await.map_err(engine_error)?;

        let loaded = tokio::time::timeout(timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            page.content().await
        })
        .await;

        // A dropped page keeps its tab open, so close it on every path
        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page for {}: {}", url, e);
        }

        match loaded {
            Ok(result) => result.map_err(engine_error),
            Err(_) => Err(RenderError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle(alive: &AtomicBool) {
        for _ in 0..50 {
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_handler_error_marks_browser_dead() {
        let events = vec![Ok(()), Err("websocket closed".to_string()), Ok(())];
        let alive = watch_handler(futures::stream::iter(events));

        settle(&alive).await;
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_handler_end_marks_browser_dead() {
        let alive = watch_handler(futures::stream::empty::<Result<(), String>>());

        settle(&alive).await;
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_running_handler_keeps_browser_alive() {
        let alive = watch_handler(futures::stream::pending::<Result<(), String>>());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(alive.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_launch_is_retried_on_next_render() {
        let renderer = ChromiumRenderer::new(ChromiumSettings {
            executable: Some(PathBuf::from("/nonexistent/chromium")),
            user_agent: "TestCrawler/1.0".to_string(),
        });

        for _ in 0..2 {
            let result = renderer
                .render("http://example.com/", Duration::from_secs(1))
                .await;
            assert!(matches!(result, Err(RenderError::Launch(_))));
            assert!(!renderer.is_connected().await);
        }
    }
}
