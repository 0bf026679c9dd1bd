use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Grid-Loader
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Loader behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Force plain fetching for every job, whatever the crawl allows
    #[serde(rename = "disable-headless")]
    pub disable_headless: bool,

    /// Worker count, 0 for the available hardware parallelism
    pub workers: usize,

    /// Queue this loader listens on
    pub queue: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            disable_headless: false,
            workers: 0,
            queue: "webloader".to_string(),
        }
    }
}

/// Which identity the loader presents to web servers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAgentKind {
    /// The `name` given in the configuration
    Custom,
    /// The YaCy crawler identity
    Crawler,
    /// The Googlebot identity
    Google,
    /// A desktop browser identity
    #[default]
    Browser,
}

/// User agent identification configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAgentConfig {
    #[serde(default)]
    pub kind: UserAgentKind,

    /// User agent string for `kind = "custom"`
    #[serde(default)]
    pub name: Option<String>,
}

/// Headless rendering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum number of rendered pages kept in memory
    #[serde(rename = "cache-capacity")]
    pub cache_capacity: usize,

    /// Age after which a cached page is rendered again (seconds)
    #[serde(rename = "cache-horizon-secs")]
    pub cache_horizon_secs: u64,

    /// Upper bound for a single render (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Browser executable, auto-detected when absent
    #[serde(rename = "chrome-path")]
    pub chrome_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 10_000,
            cache_horizon_secs: 3600,
            timeout_secs: 30,
            chrome_path: None,
        }
    }
}

/// Plain HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Memory pressure configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Fraction of available memory below which memory counts as short
    #[serde(rename = "short-ratio")]
    pub short_ratio: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { short_ratio: 0.1 }
    }
}

/// Asset store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite asset database
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/assets.db".to_string(),
        }
    }
}

/// Spool directory broker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Root of the spool directory
    #[serde(rename = "spool-dir")]
    pub spool_dir: String,

    /// Inbox poll interval when idle (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            spool_dir: "data/spool".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

/// User agent of the YaCy crawler identity
pub const CRAWLER_AGENT: &str =
    "yacybot (/global; amd64 Linux; rust; grid-loader) https://yacy.net/bot.html";

/// User agent of the Googlebot identity
pub const GOOGLE_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// User agent of the desktop browser identity
pub const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl UserAgentConfig {
    /// Resolves the configured identity to a user agent string
    ///
    /// A custom kind without a name falls back to the browser identity;
    /// validation rejects that combination before it gets here.
    pub fn user_agent(&self) -> String {
        match self.kind {
            UserAgentKind::Custom => self
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| BROWSER_AGENT.to_string()),
            UserAgentKind::Crawler => CRAWLER_AGENT.to_string(),
            UserAgentKind::Google => GOOGLE_AGENT.to_string(),
            UserAgentKind::Browser => BROWSER_AGENT.to_string(),
        }
    }
}

impl LoaderConfig {
    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
