//! Broker seam
//!
//! The loader only needs three things from a message broker: pull the next
//! delivery, settle it once its outcome is known, and publish follow-up
//! messages to other queues.

use crate::executor::ActionResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Errors raised by broker implementations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid queue name: {0:?}")]
    InvalidQueue(String),

    #[error("Broker is closed")]
    Closed,
}

/// One message pulled from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned identity, used to settle the delivery
    pub id: String,

    pub body: Vec<u8>,
}

/// Message broker used by the listener
///
/// A delivery returned by `receive` belongs to the caller until it is
/// acknowledged; no other worker sees it in the meantime.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Waits for the next delivery; `None` once the broker has nothing more to give
    async fn receive(&self) -> Result<Option<Delivery>, BrokerError>;

    /// Settles a delivery with the outcome of its execution
    async fn acknowledge(&self, delivery: &Delivery, result: &ActionResult)
        -> Result<(), BrokerError>;

    /// Publishes `body` to `queue`
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError>;
}

/// In-process broker backed by a tokio channel
///
/// Records everything published and acknowledged, which makes it the broker
/// of choice for embedding the loader and for tests.
pub struct MemoryBroker {
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    receiver: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    acknowledged: Mutex<Vec<(String, ActionResult)>>,
    next_id: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
            published: Mutex::new(Vec::new()),
            acknowledged: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Queues a message body for the listener, returning its delivery id
    pub async fn submit(&self, body: Vec<u8>) -> Result<String, BrokerError> {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let sender = self.sender.lock().await;
        let sender = sender.as_ref().ok_or(BrokerError::Closed)?;
        sender
            .send(Delivery {
                id: id.clone(),
                body,
            })
            .map_err(|_| BrokerError::Closed)?;
        Ok(id)
    }

    /// Stops accepting submissions; `receive` returns `None` once drained
    pub async fn close(&self) {
        self.sender.lock().await.take();
    }

    /// Everything published so far, as `(queue, body)` pairs
    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().await.clone()
    }

    /// Every acknowledgement so far, as `(delivery id, outcome)` pairs
    pub async fn acknowledged(&self) -> Vec<(String, ActionResult)> {
        self.acknowledged.lock().await.clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn receive(&self) -> Result<Option<Delivery>, BrokerError> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn acknowledge(
        &self,
        delivery: &Delivery,
        result: &ActionResult,
    ) -> Result<(), BrokerError> {
        self.acknowledged
            .lock()
            .await
            .push((delivery.id.clone(), result.clone()));
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        if queue.is_empty() {
            return Err(BrokerError::InvalidQueue(queue.to_string()));
        }
        self.published.lock().await.push((queue.to_string(), body));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_broker_delivers_in_order_then_closes() {
        let broker = MemoryBroker::new();
        let first = broker.submit(b"one".to_vec()).await.unwrap();
        broker.submit(b"two".to_vec()).await.unwrap();
        broker.close().await;

        let delivery = broker.receive().await.unwrap().unwrap();
        assert_eq!(delivery.id, first);
        assert_eq!(delivery.body, b"one");
        assert_eq!(broker.receive().await.unwrap().unwrap().body, b"two");
        assert!(broker.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let broker = MemoryBroker::new();
        broker.close().await;
        assert!(broker.submit(b"late".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_broker_records_publish_and_ack() {
        let broker = MemoryBroker::new();
        broker.publish("yacyparser", b"{}".to_vec()).await.unwrap();
        assert!(broker.publish("", b"{}".to_vec()).await.is_err());

        let delivery = Delivery {
            id: "mem-9".to_string(),
            body: Vec::new(),
        };
        broker
            .acknowledge(&delivery, &ActionResult::Success)
            .await
            .unwrap();

        assert_eq!(
            broker.published().await,
            vec![("yacyparser".to_string(), b"{}".to_vec())]
        );
        assert_eq!(
            broker.acknowledged().await,
            vec![("mem-9".to_string(), ActionResult::Success)]
        );
    }
}
