//! Spool directory broker
//!
//! A file based broker for running the loader without a message server:
//!
//! ```text
//! <spool>/inbox/*.json          messages waiting for a worker
//! <spool>/processing/           claimed by a worker
//! <spool>/done/  <spool>/failed/ settled messages
//! <spool>/outbox/<queue>/*.json published follow-up messages
//! ```
//!
//! A message is claimed by renaming it out of the inbox, so two workers can
//! never pick up the same file.

use crate::executor::ActionResult;
use crate::listener::broker::{Broker, BrokerError, Delivery};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const INBOX: &str = "inbox";
const PROCESSING: &str = "processing";
const DONE: &str = "done";
const FAILED: &str = "failed";
const OUTBOX: &str = "outbox";

pub struct SpoolBroker {
    root: PathBuf,
    poll_interval: Duration,
    drain: bool,
}

impl SpoolBroker {
    /// Opens the spool at `root`, creating its directories
    ///
    /// Messages left in `processing/` by an interrupted run go back to the inbox.
    pub async fn open(root: &Path, poll_interval: Duration) -> Result<Self, BrokerError> {
        for dir in [INBOX, PROCESSING, DONE, FAILED, OUTBOX] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }

        let broker = Self {
            root: root.to_path_buf(),
            poll_interval,
            drain: false,
        };
        broker.requeue_interrupted().await?;
        Ok(broker)
    }

    /// Makes `receive` return `None` as soon as the inbox is empty
    pub fn draining(mut self) -> Self {
        self.drain = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn requeue_interrupted(&self) -> Result<(), BrokerError> {
        let names = json_files(&self.root.join(PROCESSING)).await?;
        if !names.is_empty() {
            tracing::warn!(
                "Requeueing {} interrupted message(s) from {}",
                names.len(),
                self.root.join(PROCESSING).display()
            );
        }
        for name in names {
            tokio::fs::rename(
                self.root.join(PROCESSING).join(&name),
                self.root.join(INBOX).join(&name),
            )
            .await?;
        }
        Ok(())
    }

    /// Claims the oldest inbox message, if any
    async fn claim_next(&self) -> Result<Option<Delivery>, BrokerError> {
        for name in json_files(&self.root.join(INBOX)).await? {
            let claimed = self.root.join(PROCESSING).join(&name);
            match tokio::fs::rename(self.root.join(INBOX).join(&name), &claimed).await {
                Ok(()) => {
                    let body = tokio::fs::read(&claimed).await?;
                    tracing::debug!("Claimed spool message {}", name);
                    return Ok(Some(Delivery { id: name, body }));
                }
                // Claimed by another worker in the meantime
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Broker for SpoolBroker {
    async fn receive(&self) -> Result<Option<Delivery>, BrokerError> {
        loop {
            if let Some(delivery) = self.claim_next().await? {
                return Ok(Some(delivery));
            }
            if self.drain {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn acknowledge(
        &self,
        delivery: &Delivery,
        result: &ActionResult,
    ) -> Result<(), BrokerError> {
        let claimed = self.root.join(PROCESSING).join(&delivery.id);
        match result {
            ActionResult::Success => {
                tokio::fs::rename(&claimed, self.root.join(DONE).join(&delivery.id)).await?;
            }
            ActionResult::FailIrreversible(reason) => {
                let failed = self.root.join(FAILED).join(&delivery.id);
                tokio::fs::rename(&claimed, &failed).await?;
                tokio::fs::write(failed.with_extension("reason"), reason.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        if !is_valid_queue(queue) {
            return Err(BrokerError::InvalidQueue(queue.to_string()));
        }

        let dir = self.root.join(OUTBOX).join(queue);
        tokio::fs::create_dir_all(&dir).await?;

        // Written under a temporary name so consumers never see a partial file
        let name = format!("{}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"), Uuid::new_v4());
        let partial = dir.join(format!("{}.part", name));
        tokio::fs::write(&partial, &body).await?;
        tokio::fs::rename(&partial, dir.join(format!("{}.json", name))).await?;
        Ok(())
    }
}

fn is_valid_queue(queue: &str) -> bool {
    !queue.is_empty()
        && queue
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && queue != "."
        && queue != ".."
}

/// Names of the `*.json` files in `dir`, oldest name first
async fn json_files(dir: &Path) -> Result<Vec<String>, BrokerError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") && entry.file_type().await?.is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
