//! Memory pressure signal
//!
//! The loader only consumes memory pressure as a boolean plus a snapshot for
//! logging. The executor reports it, and the render client clears its page
//! cache whenever it is raised.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a `/proc/meminfo` snapshot is reused before it is read again
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(1);

/// Snapshot of host memory in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStatus {
    pub total: u64,
    pub available: u64,
}

impl MemoryStatus {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }
}

/// Source of the memory pressure signal
///
/// Implementations must be cheap to call; the executor and the render client
/// query it once per action and once per render.
pub trait MemoryMonitor: Send + Sync {
    /// Current memory snapshot
    fn status(&self) -> MemoryStatus;

    /// True when memory is short and caches should be released
    fn short_status(&self) -> bool;
}

/// Memory monitor backed by `/proc/meminfo`
///
/// Snapshots are cached for `SNAPSHOT_TTL`, so the many callers on the async
/// workers share one file read per interval.
#[derive(Debug)]
pub struct SystemMemory {
    meminfo: PathBuf,
    short_ratio: f64,
    ttl: Duration,
    snapshot: Mutex<Option<(Instant, MemoryStatus)>>,
}

impl SystemMemory {
    /// Creates a monitor reporting pressure once available memory falls
    /// below `short_ratio` of the total
    pub fn new(short_ratio: f64) -> Self {
        Self::with_meminfo(Path::new("/proc/meminfo"), short_ratio)
    }

    pub fn with_meminfo(meminfo: &Path, short_ratio: f64) -> Self {
        Self {
            meminfo: meminfo.to_path_buf(),
            short_ratio,
            ttl: SNAPSHOT_TTL,
            snapshot: Mutex::new(None),
        }
    }

    /// Sets how long a snapshot is reused
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn read(&self) -> MemoryStatus {
        match std::fs::read_to_string(&self.meminfo) {
            Ok(content) => parse_meminfo(&content).unwrap_or_default(),
            Err(e) => {
                tracing::trace!("Cannot read {}: {}", self.meminfo.display(), e);
                MemoryStatus::default()
            }
        }
    }
}

impl MemoryMonitor for SystemMemory {
    fn status(&self) -> MemoryStatus {
        let mut snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((taken, status)) = *snapshot {
            if taken.elapsed() < self.ttl {
                return status;
            }
        }
        let status = self.read();
        *snapshot = Some((Instant::now(), status));
        status
    }

    fn short_status(&self) -> bool {
        let status = self.status();
        // An unknown total means we cannot judge, so no pressure is reported
        status.total > 0 && (status.available as f64) < (status.total as f64) * self.short_ratio
    }
}

/// Parses `MemTotal` and `MemAvailable` out of a meminfo listing
fn parse_meminfo(content: &str) -> Option<MemoryStatus> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let value = parts.next().and_then(|v| v.parse::<u64>().ok());
        match (key, value) {
            (Some("MemTotal:"), Some(kb)) => total = Some(kb * 1024),
            (Some("MemAvailable:"), Some(kb)) => available = Some(kb * 1024),
            _ => {}
        }
    }

    Some(MemoryStatus {
        total: total?,
        available: available?,
    })
}
