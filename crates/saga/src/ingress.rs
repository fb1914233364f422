//! Event ingress channel and derived-event egress.
//!
//! Everything that reaches a runner arrives as an [`Inbound`] envelope:
//! external messages, fired timers, and events published by transitions.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CorrelationId, ScheduleToken};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SagaError;

/// Identifies the timer arming that produced a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStamp {
    pub slot: String,
    pub token: ScheduleToken,
}

/// One event addressed to one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound<E> {
    pub key: CorrelationId,
    pub event: E,

    /// Set only for timer deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerStamp>,
}

impl<E> Inbound<E> {
    /// Creates an envelope for an externally originated event.
    pub fn new(key: CorrelationId, event: E) -> Self {
        Self {
            key,
            event,
            timer: None,
        }
    }

    /// Creates an envelope for a fired timer.
    pub fn from_timer(
        key: CorrelationId,
        event: E,
        slot: impl Into<String>,
        token: ScheduleToken,
    ) -> Self {
        Self {
            key,
            event,
            timer: Some(TimerStamp {
                slot: slot.into(),
                token,
            }),
        }
    }
}

/// Creates a bounded ingress channel.
pub fn channel<E>(capacity: usize) -> (IngressSender<E>, IngressReceiver<E>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IngressSender { tx }, IngressReceiver { rx })
}

/// Producer side of the ingress.
#[derive(Debug)]
pub struct IngressSender<E> {
    tx: mpsc::Sender<Inbound<E>>,
}

impl<E> Clone for IngressSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> IngressSender<E> {
    /// Enqueues a delivery, waiting for capacity.
    pub async fn send(&self, inbound: Inbound<E>) -> Result<(), SagaError> {
        self.tx
            .send(inbound)
            .await
            .map_err(|_| SagaError::IngressClosed)
    }

    /// Returns true once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the ingress, drained by [`crate::SagaRunner::listen`].
#[derive(Debug)]
pub struct IngressReceiver<E> {
    rx: mpsc::Receiver<Inbound<E>>,
}

impl<E> IngressReceiver<E> {
    /// Receives the next delivery, or None once every sender is gone.
    pub async fn recv(&mut self) -> Option<Inbound<E>> {
        self.rx.recv().await
    }
}

/// Trait for publishing derived events produced by transitions.
#[async_trait]
pub trait EventPublisher<E: Send + 'static>: Send + Sync {
    /// Publishes an event for the given key.
    async fn publish(&self, inbound: Inbound<E>) -> Result<(), SagaError>;
}

#[async_trait]
impl<E: Send + 'static> EventPublisher<E> for IngressSender<E> {
    async fn publish(&self, inbound: Inbound<E>) -> Result<(), SagaError> {
        self.send(inbound).await
    }
}

/// In-memory publisher for testing; records everything it is given.
#[derive(Debug)]
pub struct InMemoryEventPublisher<E> {
    published: Arc<RwLock<Vec<Inbound<E>>>>,
}

impl<E> Default for InMemoryEventPublisher<E> {
    fn default() -> Self {
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<E> Clone for InMemoryEventPublisher<E> {
    fn clone(&self) -> Self {
        Self {
            published: Arc::clone(&self.published),
        }
    }
}

impl<E: Clone> InMemoryEventPublisher<E> {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything published so far.
    pub fn published(&self) -> Vec<Inbound<E>> {
        self.published.read().unwrap().clone()
    }

    /// Returns the number of published events.
    pub fn published_count(&self) -> usize {
        self.published.read().unwrap().len()
    }
}

#[async_trait]
impl<E: Send + Sync + 'static> EventPublisher<E> for InMemoryEventPublisher<E> {
    async fn publish(&self, inbound: Inbound<E>) -> Result<(), SagaError> {
        self.published.write().unwrap().push(inbound);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (tx, mut rx) = channel::<u8>(4);
        let key = CorrelationId::new();

        tx.publish(Inbound::new(key, 1)).await.unwrap();
        tx.publish(Inbound::new(key, 2)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event, 1);
        assert_eq!(rx.recv().await.unwrap().event, 2);
    }

    #[tokio::test]
    async fn test_closed_ingress() {
        let (tx, rx) = channel::<u8>(1);
        drop(rx);

        assert!(tx.is_closed());
        let result = tx.publish(Inbound::new(CorrelationId::new(), 1)).await;
        assert!(matches!(result, Err(SagaError::IngressClosed)));
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_drop() {
        let (tx, mut rx) = channel::<u8>(1);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_timer_envelope_carries_stamp() {
        let key = CorrelationId::new();
        let token = ScheduleToken::new();
        let inbound = Inbound::from_timer(key, "tick", "slot", token);

        assert_eq!(
            inbound.timer,
            Some(TimerStamp {
                slot: "slot".to_string(),
                token,
            })
        );
        assert!(Inbound::new(key, "tick").timer.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_publisher_records() {
        let publisher = InMemoryEventPublisher::<u8>::new();
        let key = CorrelationId::new();

        publisher.publish(Inbound::new(key, 7u8)).await.unwrap();

        assert_eq!(publisher.published_count(), 1);
        assert_eq!(publisher.published()[0], Inbound::new(key, 7u8));
    }
}
