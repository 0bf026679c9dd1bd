//! Action executor
//!
//! Runs one loader action: validates it against the crawl descriptors of its
//! message, retrieves every URL it names, frames the pages as a WARC payload
//! and propagates that payload to the child actions.
//!
//! The result is binary. Anything that prevents retrieval is an irreversible
//! failure; once retrieval succeeded the action is a success, whether the
//! payload went to the asset store or had to be embedded in the children.

mod propagate;

pub use propagate::{propagate, StorageOutcome};

use crate::memory::MemoryMonitor;
use crate::message::{find_descriptor, Action, CrawlDescriptor};
use crate::retrieval::{ContentRetriever, FetchRequest, Payload};
use crate::storage::AssetStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Why an action failed for good
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("missing identifier")]
    MissingIdentifier,

    #[error("descriptor not found: {0}")]
    DescriptorNotFound(String),

    #[error("nothing to do: no target asset")]
    NothingToDo,

    #[error("no urls to load")]
    NoUrls,

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("payload framing failed: {0}")]
    Payload(String),

    /// The message was rejected before any action ran
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Terminal outcome of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    FailIrreversible(FailureReason),
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success)
    }
}

/// Executes loader actions
///
/// Shared by all workers; every field is either cheap to clone or behind an `Arc`.
pub struct ActionExecutor {
    retriever: ContentRetriever,
    store: Arc<dyn AssetStore>,
    memory: Arc<dyn MemoryMonitor>,
    disable_headless: bool,
}

impl ActionExecutor {
    /// Creates an executor
    ///
    /// # Arguments
    ///
    /// * `retriever` - Content retriever shared with the other workers
    /// * `store` - Asset store payloads are written to
    /// * `memory` - Memory pressure signal
    /// * `disable_headless` - Kill-switch forcing plain fetches for every crawl
    pub fn new(
        retriever: ContentRetriever,
        store: Arc<dyn AssetStore>,
        memory: Arc<dyn MemoryMonitor>,
        disable_headless: bool,
    ) -> Self {
        Self {
            retriever,
            store,
            memory,
            disable_headless,
        }
    }

    pub fn retriever(&self) -> &ContentRetriever {
        &self.retriever
    }

    /// Executes `action`, embedding the payload into its children when the
    /// asset store refuses it
    pub async fn execute(
        &self,
        action: &mut Action,
        data: &[CrawlDescriptor],
        worker_label: &str,
    ) -> ActionResult {
        let span = tracing::info_span!(
            "action",
            worker = worker_label,
            id = action.crawl_id().unwrap_or("-"),
            asset = action.target_asset().unwrap_or("-")
        );

        let result = self.run(action, data).instrument(span).await;
        if let ActionResult::FailIrreversible(reason) = &result {
            tracing::warn!(
                "[{}] Action for {} failed: {}",
                worker_label,
                action.target_asset().unwrap_or("<no asset>"),
                reason
            );
        }
        result
    }

    async fn run(&self, action: &mut Action, data: &[CrawlDescriptor]) -> ActionResult {
        if self.memory.short_status() {
            let status = self.memory.status();
            tracing::info!(
                "Memory is short: {} MB used of {} MB assigned",
                status.used() / (1024 * 1024),
                status.total / (1024 * 1024)
            );
        }

        let Some(id) = action.crawl_id() else {
            return ActionResult::FailIrreversible(FailureReason::MissingIdentifier);
        };

        let Some(descriptor) = find_descriptor(data, id) else {
            return ActionResult::FailIrreversible(FailureReason::DescriptorNotFound(
                id.to_string(),
            ));
        };

        let headless = descriptor.loader_headless() && !self.disable_headless;

        let Some(target_asset) = action.target_asset().map(str::to_string) else {
            return ActionResult::FailIrreversible(FailureReason::NothingToDo);
        };

        let depth = action.depth();
        if depth > descriptor.crawling_depth {
            tracing::warn!(
                "Action depth {} exceeds crawling depth {} of crawl {}",
                depth,
                descriptor.crawling_depth,
                descriptor.id
            );
        }

        let urls = resolve_urls(action, descriptor);
        if urls.is_empty() {
            return ActionResult::FailIrreversible(FailureReason::NoUrls);
        }

        let mut pages = Vec::with_capacity(urls.len());
        for url in &urls {
            let request = FetchRequest {
                url,
                headless,
                depth,
                crawling_depth: descriptor.crawling_depth,
                priority: descriptor.priority(),
            };
            match self.retriever.fetch(&request).await {
                Ok(page) => {
                    tracing::debug!(
                        "Loaded {} via {:?} (status {:?}, {} bytes)",
                        url,
                        page.path,
                        page.status,
                        page.body.len()
                    );
                    pages.push(page);
                }
                Err(e) => {
                    return ActionResult::FailIrreversible(FailureReason::Retrieval(e.to_string()))
                }
            }
        }

        let payload = match Payload::for_asset(&target_asset, &pages) {
            Ok(payload) => payload,
            Err(e) => return ActionResult::FailIrreversible(FailureReason::Payload(e.to_string())),
        };

        propagate(
            self.store.as_ref(),
            &target_asset,
            &payload,
            &mut action.actions,
        )
        .await;

        ActionResult::Success
    }
}

/// URLs to retrieve: the action's own, or the crawl's start URL
fn resolve_urls(action: &Action, descriptor: &CrawlDescriptor) -> Vec<String> {
    let urls: Vec<String> = action
        .urls
        .iter()
        .filter(|url| !url.trim().is_empty())
        .cloned()
        .collect();
    if !urls.is_empty() {
        return urls;
    }
    descriptor
        .crawling_url()
        .filter(|url| !url.trim().is_empty())
        .map(|url| vec![url.to_string()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_urls_prefers_action_urls() {
        let mut descriptor = CrawlDescriptor::new("c1", 0);
        descriptor
            .extra
            .insert("crawlingURL".to_string(), "http://start.example".into());
        let action = Action {
            urls: vec!["http://a.example".to_string(), " ".to_string()],
            ..Action::default()
        };

        assert_eq!(
            resolve_urls(&action, &descriptor),
            vec!["http://a.example".to_string()]
        );
        assert_eq!(
            resolve_urls(&Action::default(), &descriptor),
            vec!["http://start.example".to_string()]
        );
    }

    #[test]
    fn test_resolve_urls_without_any_source() {
        let descriptor = CrawlDescriptor::new("c1", 0);
        assert!(resolve_urls(&Action::default(), &descriptor).is_empty());
    }

    #[test]
    fn test_failure_reason_messages() {
        assert_eq!(
            FailureReason::MissingIdentifier.to_string(),
            "missing identifier"
        );
        assert_eq!(
            FailureReason::DescriptorNotFound("c9".to_string()).to_string(),
            "descriptor not found: c9"
        );
    }
}
