use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-crawl configuration carried in the `data` section of a job message
///
/// Only the fields the loader reads are typed; everything else the producer
/// sent (`crawlingURL`, `collection`, `agentName`, ...) is kept in `extra` so
/// that forwarded messages stay intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlDescriptor {
    /// Identifier referenced by actions, unique within one message
    pub id: String,

    /// Maximum recursion depth of this crawl
    #[serde(rename = "crawlingDepth")]
    pub crawling_depth: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(
        rename = "loaderHeadless",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub loader_headless: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CrawlDescriptor {
    /// Creates a descriptor with default priority and headless loading allowed
    pub fn new(id: impl Into<String>, crawling_depth: u32) -> Self {
        Self {
            id: id.into(),
            crawling_depth,
            priority: None,
            loader_headless: None,
            extra: Map::new(),
        }
    }

    /// Crawl priority, 0 when the producer did not set one
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }

    /// Whether JavaScript rendering is permitted for this crawl (default true)
    pub fn loader_headless(&self) -> bool {
        self.loader_headless.unwrap_or(true)
    }

    /// The crawl start URL, used when a loader action names no URLs itself
    pub fn crawling_url(&self) -> Option<&str> {
        self.extra
            .get("crawlingURL")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }
}
