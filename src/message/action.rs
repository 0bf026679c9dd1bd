use crate::MessageError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One node of a job's recursive action tree
///
/// A loader action names the URLs to retrieve and the `targetasset` the result
/// is stored under. Its children are the follow-up stages (parser, indexer,
/// crawler, ...) that consume that asset through `sourceasset`, or through an
/// embedded copy in `assets` when the asset store could not take it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Links the action to a crawl descriptor of the same message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Current recursion depth of the crawl
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targetasset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourceasset: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,

    /// Embedded binary assets, base64 encoded, keyed by asset name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    /// The crawl id, `None` when absent or empty
    pub fn crawl_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// The target asset name, `None` when absent or empty
    pub fn target_asset(&self) -> Option<&str> {
        self.targetasset.as_deref().filter(|asset| !asset.is_empty())
    }

    pub fn depth(&self) -> u32 {
        self.depth.unwrap_or(0)
    }

    /// Attaches `bytes` to this action under `name`
    pub fn set_binary_asset(&mut self, name: &str, bytes: &[u8]) {
        self.assets.insert(name.to_string(), STANDARD.encode(bytes));
    }

    /// Decodes the embedded asset `name`, if this action carries one
    pub fn binary_asset(&self, name: &str) -> Result<Option<Vec<u8>>, MessageError> {
        self.assets
            .get(name)
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map_err(|source| MessageError::AssetEncoding {
                        name: name.to_string(),
                        source,
                    })
            })
            .transpose()
    }

    /// Depth of the action tree rooted here (a leaf has height 1)
    pub fn tree_height(&self) -> usize {
        1 + self
            .actions
            .iter()
            .map(Action::tree_height)
            .max()
            .unwrap_or(0)
    }
}
