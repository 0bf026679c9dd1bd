//! Asset propagation
//!
//! A retrieved payload reaches the next stage exactly once: through the asset
//! store when it accepts the write, otherwise embedded in every child action.

use crate::message::Action;
use crate::retrieval::Payload;
use crate::storage::AssetStore;

/// Where a payload ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOutcome {
    /// Written to the asset store; children were left untouched
    Stored,

    /// The store refused the write; every child carries the payload
    Embedded,
}

/// Stores `payload` under `target_asset`, embedding it into `children` on failure
///
/// Never fails: a storage error degrades to embedding and is only logged. A
/// refused write with no child to carry the payload is logged as an error,
/// since nothing downstream will see the asset.
pub async fn propagate(
    store: &dyn AssetStore,
    target_asset: &str,
    payload: &Payload,
    children: &mut [Action],
) -> StorageOutcome {
    match store.store(target_asset, &payload.bytes).await {
        Ok(()) => {
            tracing::info!(
                "Stored asset {} ({} bytes, compressed: {})",
                target_asset,
                payload.len(),
                payload.compressed
            );
            StorageOutcome::Stored
        }
        Err(e) if children.is_empty() => {
            tracing::error!(
                "Asset store rejected {} and no child action can carry it, payload discarded: {}",
                target_asset,
                e
            );
            StorageOutcome::Embedded
        }
        Err(e) => {
            tracing::warn!(
                "Asset store rejected {}, embedding into {} child action(s): {}",
                target_asset,
                children.len(),
                e
            );
            for child in children.iter_mut() {
                child.set_binary_asset(target_asset, &payload.bytes);
            }
            StorageOutcome::Embedded
        }
    }
}
