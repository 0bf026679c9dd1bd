//! Job message model
//!
//! This module defines the unit of work pulled from the broker:
//! - `JobMessage`: metadata, crawl descriptors and the root actions
//! - `CrawlDescriptor`: per-crawl settings referenced by actions
//! - `Action`: a node of the recursive pipeline action tree
//!
//! Messages are validated when decoded, so that a malformed tree is rejected
//! before any action is executed.

mod action;
mod descriptor;

pub use action::Action;
pub use descriptor::CrawlDescriptor;

use crate::MessageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Deepest action tree accepted from a producer
pub const MAX_ACTION_TREE_HEIGHT: usize = 64;

/// Producer-side metadata of a job message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub process: String,

    #[serde(default)]
    pub count: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A job message as exchanged with the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    #[serde(default)]
    pub metadata: Metadata,

    pub data: Vec<CrawlDescriptor>,

    pub actions: Vec<Action>,
}

impl JobMessage {
    /// Decodes and validates a message received from the broker
    ///
    /// # Errors
    ///
    /// * `MessageError::Json` - The body is not JSON or does not match the schema
    /// * `MessageError::DuplicateDescriptor` - Two descriptors share an id
    /// * `MessageError::Schema` - The action tree is too deep
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        let message: JobMessage = serde_json::from_slice(bytes)?;
        message.validate()?;
        Ok(message)
    }

    /// Encodes the message for publishing
    pub fn to_vec(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Checks the invariants serde cannot express
    pub fn validate(&self) -> Result<(), MessageError> {
        let mut seen = HashSet::new();
        for descriptor in &self.data {
            if !seen.insert(descriptor.id.as_str()) {
                return Err(MessageError::DuplicateDescriptor(descriptor.id.clone()));
            }
        }

        for action in &self.actions {
            let height = action.tree_height();
            if height > MAX_ACTION_TREE_HEIGHT {
                return Err(MessageError::Schema(format!(
                    "action tree is {} levels deep, limit is {}",
                    height, MAX_ACTION_TREE_HEIGHT
                )));
            }
        }

        Ok(())
    }

    /// Finds the crawl descriptor with the given id
    pub fn find_descriptor(&self, id: &str) -> Option<&CrawlDescriptor> {
        find_descriptor(&self.data, id)
    }

    /// Builds the next-stage message for one surviving child action
    pub fn derive(&self, child: Action) -> JobMessage {
        JobMessage {
            metadata: self.metadata.clone(),
            data: self.data.clone(),
            actions: vec![child],
        }
    }
}

/// Finds the crawl descriptor with the given id in a descriptor list
pub fn find_descriptor<'a>(data: &'a [CrawlDescriptor], id: &str) -> Option<&'a CrawlDescriptor> {
    data.iter().find(|descriptor| descriptor.id == id)
}
