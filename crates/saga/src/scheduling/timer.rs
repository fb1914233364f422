//! Timer-task scheduler on the tokio runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ScheduleToken;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::gateway::{ScheduleRequest, SchedulingGateway};
use crate::error::SagaError;
use crate::ingress::{EventPublisher, IngressSender};

type Timers = Arc<Mutex<HashMap<ScheduleToken, JoinHandle<()>>>>;

/// Runs one sleeping task per armed token and delivers fired timers into
/// the ingress.
///
/// Timers live only in process memory. A restart loses them; the persisted
/// tokens then simply never fire.
#[derive(Debug)]
pub struct TokioScheduler<E> {
    ingress: IngressSender<E>,
    timers: Timers,
}

impl<E> Clone for TokioScheduler<E> {
    fn clone(&self) -> Self {
        Self {
            ingress: self.ingress.clone(),
            timers: Arc::clone(&self.timers),
        }
    }
}

impl<E: Send + 'static> TokioScheduler<E> {
    /// Creates a scheduler that delivers into the given ingress.
    pub fn new(ingress: IngressSender<E>) -> Self {
        Self {
            ingress,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the number of armed, unfired timers.
    pub async fn pending_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Aborts every armed timer.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        tracing::info!(count, "aborted pending timers");
    }
}

#[async_trait]
impl<E: Send + 'static> SchedulingGateway<E> for TokioScheduler<E> {
    #[tracing::instrument(skip(self, request), fields(key = %request.key, slot = %request.slot, token = %request.token))]
    async fn schedule(&self, request: ScheduleRequest<E>) -> Result<ScheduleToken, SagaError> {
        let token = request.token;
        let delay = request.delay;
        let timers = Arc::clone(&self.timers);
        let ingress = self.ingress.clone();

        // Held across the spawn so a zero-delay task cannot look itself up
        // before it has been registered.
        let mut registered = self.timers.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if timers.lock().await.remove(&token).is_none() {
                return;
            }

            metrics::counter!("timers_fired_total").increment(1);
            let key = request.key;
            if let Err(e) = ingress.publish(request.into_inbound()).await {
                tracing::warn!(%key, %token, error = %e, "fired timer could not be delivered");
            }
        });
        registered.insert(token, handle);

        metrics::counter!("timers_scheduled_total").increment(1);
        tracing::debug!(?delay, "timer armed");
        Ok(token)
    }

    async fn cancel(&self, token: ScheduleToken) -> Result<(), SagaError> {
        if let Some(handle) = self.timers.lock().await.remove(&token) {
            handle.abort();
            metrics::counter!("timers_cancelled_total").increment(1);
            tracing::debug!(%token, "timer cancelled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::CorrelationId;

    use super::*;
    use crate::ingress::channel;

    fn request(delay: Duration) -> ScheduleRequest<&'static str> {
        ScheduleRequest {
            token: ScheduleToken::new(),
            key: CorrelationId::new(),
            slot: "slot".to_string(),
            delay,
            event: "tick",
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = channel::<&'static str>(8);
        let scheduler = TokioScheduler::new(tx);
        let req = request(Duration::from_secs(5));
        let (token, key) = (req.token, req.key);

        scheduler.schedule(req).await.unwrap();
        assert_eq!(scheduler.pending_count().await, 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(scheduler.pending_count().await, 1);

        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.key, key);
        assert_eq!(inbound.event, "tick");
        assert_eq!(inbound.timer.unwrap().token, token);
        assert_eq!(scheduler.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = channel::<&'static str>(8);
        let scheduler = TokioScheduler::new(tx);
        let req = request(Duration::from_secs(5));
        let token = req.token;

        scheduler.schedule(req).await.unwrap();
        scheduler.cancel(token).await.unwrap();
        scheduler.cancel(token).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await;
        assert!(received.is_err());
        assert_eq!(scheduler.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_timer_fires() {
        let (tx, mut rx) = channel::<&'static str>(8);
        let scheduler = TokioScheduler::new(tx);

        scheduler.schedule(request(Duration::ZERO)).await.unwrap();

        assert!(rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_everything() {
        let (tx, mut rx) = channel::<&'static str>(8);
        let scheduler = TokioScheduler::new(tx);
        scheduler.schedule(request(Duration::from_secs(1))).await.unwrap();
        scheduler.schedule(request(Duration::from_secs(2))).await.unwrap();

        scheduler.shutdown().await;

        assert_eq!(scheduler.pending_count().await, 0);
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(received.is_err());
    }
}
