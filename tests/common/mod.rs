//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use grid_loader::config::HttpConfig;
use grid_loader::memory::{MemoryMonitor, MemoryStatus};
use grid_loader::retrieval::{
    build_http_client, ContentRetriever, PageCache, RenderClient, RenderError, Renderer,
};
use grid_loader::storage::{AssetStore, StorageError, StorageResult};
use grid_loader::ActionExecutor;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Renderer that either returns fixed HTML or always faults, counting calls
pub struct ScriptedRenderer {
    html: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRenderer {
    fn scripted(html: Option<&str>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            html: html.map(str::to_string),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn rendering(html: &str) -> Arc<Self> {
        Self::scripted(Some(html), Duration::ZERO)
    }

    /// Renders `html` after holding the page for `delay`
    pub fn rendering_slowly(html: &str, delay: Duration) -> Arc<Self> {
        Self::scripted(Some(html), delay)
    }

    pub fn faulting() -> Arc<Self> {
        Self::scripted(None, Duration::ZERO)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most renders ever in progress at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, url: &str, _timeout: Duration) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.html {
            Some(html) => Ok(html.clone()),
            None => Err(RenderError::Engine {
                url: url.to_string(),
                message: "script error".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Asset store that refuses every write
#[derive(Default)]
pub struct RefusingStore {
    attempts: AtomicUsize,
}

impl RefusingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStore for RefusingStore {
    async fn store(&self, _name: &str, _bytes: &[u8]) -> StorageResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable("store offline".to_string()))
    }

    async fn load(&self, _name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Memory monitor reporting a fixed state
pub struct FixedMemory(pub bool);

impl MemoryMonitor for FixedMemory {
    fn status(&self) -> MemoryStatus {
        MemoryStatus {
            total: 8 << 30,
            available: if self.0 { 100 << 20 } else { 4 << 30 },
        }
    }

    fn short_status(&self) -> bool {
        self.0
    }
}

/// Builds an executor around `renderer` and `store`
pub fn executor(
    renderer: Arc<ScriptedRenderer>,
    store: Arc<dyn AssetStore>,
    disable_headless: bool,
) -> ActionExecutor {
    let memory: Arc<dyn MemoryMonitor> = Arc::new(FixedMemory(false));
    let render = Arc::new(RenderClient::new(
        renderer,
        PageCache::new(100, chrono::Duration::minutes(5)),
        Arc::clone(&memory),
        Duration::from_secs(5),
    ));
    let http = build_http_client(&HttpConfig::default(), "grid-loader-test/1.0").unwrap();
    ActionExecutor::new(
        ContentRetriever::new(render, http),
        store,
        memory,
        disable_headless,
    )
}

/// Decodes a `.warc.gz` payload into its text
pub fn gunzip(bytes: &[u8]) -> String {
    let mut text = String::new();
    flate2::read::MultiGzDecoder::new(bytes)
        .read_to_string(&mut text)
        .unwrap();
    text
}

/// The job message of the basic loader scenario, loading `url`
pub fn scenario_message(url: &str) -> String {
    format!(
        r#"{{
          "metadata": {{"process": "yacy_grid_loader", "count": 1}},
          "data": [{{"id": "c1", "crawlingDepth": 3, "collection": "test"}}],
          "actions": [{{
            "type": "loader",
            "queue": "webloader",
            "id": "c1",
            "depth": 0,
            "urls": ["{url}"],
            "targetasset": "a/b.warc.gz",
            "actions": [{{
              "type": "parser",
              "queue": "yacyparser",
              "sourceasset": "a/b.warc.gz",
              "targetasset": "a/b.jsonlist"
            }}]
          }}]
        }}"#
    )
}
