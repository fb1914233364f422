//! Scheduling gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{CorrelationId, ScheduleToken};

use crate::error::SagaError;
use crate::ingress::Inbound;

/// A request to deliver `event` to `key` after `delay`.
///
/// The token is minted by the runner and already persisted on the instance
/// under `slot` when the request is made.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest<E> {
    pub token: ScheduleToken,
    pub key: CorrelationId,
    pub slot: String,
    pub delay: Duration,
    pub event: E,
}

impl<E> ScheduleRequest<E> {
    /// Converts the request into the delivery it produces when it fires.
    pub fn into_inbound(self) -> Inbound<E> {
        Inbound::from_timer(self.key, self.event, self.slot, self.token)
    }
}

/// Trait for delayed event delivery.
#[async_trait]
pub trait SchedulingGateway<E: Send + 'static>: Send + Sync {
    /// Arms a timer. Returns the request's token.
    async fn schedule(&self, request: ScheduleRequest<E>) -> Result<ScheduleToken, SagaError>;

    /// Cancels a timer. Unknown or already fired tokens are ignored.
    async fn cancel(&self, token: ScheduleToken) -> Result<(), SagaError>;
}

#[derive(Debug)]
struct InMemorySchedulingState<E> {
    pending: HashMap<ScheduleToken, ScheduleRequest<E>>,
    cancelled: Vec<ScheduleToken>,
    scheduled_total: usize,
    fail_on_schedule: bool,
}

impl<E> Default for InMemorySchedulingState<E> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            cancelled: Vec::new(),
            scheduled_total: 0,
            fail_on_schedule: false,
        }
    }
}

/// In-memory scheduling gateway for testing.
///
/// Nothing fires on its own; tests call [`fire`](Self::fire) to take a
/// pending request and deliver the resulting [`Inbound`] themselves.
#[derive(Debug)]
pub struct InMemorySchedulingGateway<E> {
    state: Arc<RwLock<InMemorySchedulingState<E>>>,
}

impl<E> Default for InMemorySchedulingGateway<E> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemorySchedulingState::default())),
        }
    }
}

impl<E> Clone for InMemorySchedulingGateway<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E: Clone> InMemorySchedulingGateway<E> {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to reject schedule calls.
    pub fn set_fail_on_schedule(&self, fail: bool) {
        self.state.write().unwrap().fail_on_schedule = fail;
    }

    /// Returns the number of pending timers.
    pub fn pending_count(&self) -> usize {
        self.state.read().unwrap().pending.len()
    }

    /// Returns the total number of accepted schedule calls.
    pub fn scheduled_total(&self) -> usize {
        self.state.read().unwrap().scheduled_total
    }

    /// Returns true if the token is still pending.
    pub fn is_pending(&self, token: ScheduleToken) -> bool {
        self.state.read().unwrap().pending.contains_key(&token)
    }

    /// Returns the pending tokens armed for a key and slot.
    pub fn pending_for(&self, key: CorrelationId, slot: &str) -> Vec<ScheduleToken> {
        self.state
            .read()
            .unwrap()
            .pending
            .values()
            .filter(|request| request.key == key && request.slot == slot)
            .map(|request| request.token)
            .collect()
    }

    /// Returns every token cancelled so far, in order.
    pub fn cancelled(&self) -> Vec<ScheduleToken> {
        self.state.read().unwrap().cancelled.clone()
    }

    /// Removes a pending timer and returns its delivery.
    ///
    /// Returns None if the token was cancelled or already fired.
    pub fn fire(&self, token: ScheduleToken) -> Option<Inbound<E>> {
        self.state
            .write()
            .unwrap()
            .pending
            .remove(&token)
            .map(ScheduleRequest::into_inbound)
    }

    /// Fires the single pending timer for a key and slot.
    pub fn fire_for(&self, key: CorrelationId, slot: &str) -> Option<Inbound<E>> {
        let token = self.pending_for(key, slot).into_iter().next()?;
        self.fire(token)
    }
}

#[async_trait]
impl<E: Send + Sync + 'static> SchedulingGateway<E> for InMemorySchedulingGateway<E> {
    async fn schedule(&self, request: ScheduleRequest<E>) -> Result<ScheduleToken, SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_schedule {
            return Err(SagaError::Scheduling("Scheduler unavailable".to_string()));
        }

        let token = request.token;
        state.pending.insert(token, request);
        state.scheduled_total += 1;
        Ok(token)
    }

    async fn cancel(&self, token: ScheduleToken) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        state.pending.remove(&token);
        state.cancelled.push(token);
        Ok(())
    }
}
