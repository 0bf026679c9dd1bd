//! Bounded page cache of the render client
//!
//! Rendered pages are kept per URL with the time they were rendered, so that a
//! repeated render within the cache horizon can be answered without starting
//! the browser again. The cache holds at most `capacity` pages and drops the
//! oldest insertions first.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of pages kept by the render cache
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// A rendered page held in the cache
#[derive(Debug, Clone)]
pub struct CachedPage {
    /// Serialized DOM of the page
    pub content: Arc<str>,

    /// When the page was rendered
    pub fetched_at: DateTime<Utc>,
}

impl CachedPage {
    pub fn new(content: Arc<str>) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the page is older than the cache horizon
    pub fn is_stale(&self, horizon: Duration) -> bool {
        self.age() > horizon
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedPage>,
    order: VecDeque<String>,
}

/// URL-keyed page cache, safe to share between workers
///
/// Readers clone the `Arc<str>` of an entry out under a read lock, so clearing
/// the cache never invalidates content a worker is still using.
#[derive(Debug)]
pub struct PageCache {
    state: RwLock<CacheState>,
    capacity: usize,
    horizon: Duration,
}

impl PageCache {
    pub fn new(capacity: usize, horizon: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            capacity,
            horizon,
        }
    }

    /// Returns the cached content for `url` unless it is missing or stale
    pub async fn get(&self, url: &str) -> Option<Arc<str>> {
        let state = self.state.read().await;
        state
            .entries
            .get(url)
            .filter(|page| !page.is_stale(self.horizon))
            .map(|page| Arc::clone(&page.content))
    }

    /// Stores `content` for `url`, evicting the oldest pages beyond capacity
    pub async fn insert(&self, url: &str, content: Arc<str>) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.write().await;
        if state
            .entries
            .insert(url.to_string(), CachedPage::new(content))
            .is_none()
        {
            state.order.push_back(url.to_string());
        }

        while state.entries.len() > self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drops every cached page
    pub async fn clear(&self) -> usize {
        let mut state = self.state.write().await;
        let dropped = state.entries.len();
        state.entries.clear();
        state.order.clear();
        dropped
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
