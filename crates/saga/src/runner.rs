//! The saga runner: correlate, serialize, decide, persist, then act.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use common::{CorrelationId, ScheduleToken};
use domain::{Decision, Effect, InstanceOf, MachineEvent, StateMachine, Transition};
use instance_store::{InstanceRecord, InstanceStore};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::{RunnerConfig, UnhandledPolicy};
use crate::correlator::{Correlator, Resolution};
use crate::error::SagaError;
use crate::ingress::{EventPublisher, Inbound, IngressReceiver};
use crate::locks::KeyedLocks;
use crate::scheduling::{ScheduleRequest, SchedulingGateway};

/// What the originator of a delivery gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "body", rename_all = "snake_case")]
pub enum Reply<S> {
    /// The instance after the transition.
    Snapshot(S),

    /// A read-only event addressed a key with no instance.
    Unknown(CorrelationId),

    /// Handled; the transition does not reply.
    Accepted,

    /// Dropped without effect: stale timer, retired instance, or an
    /// unhandled event under [`UnhandledPolicy::Ignore`].
    Ignored,
}

impl<S> Reply<S> {
    /// Returns the snapshot, if any.
    pub fn into_snapshot(self) -> Option<S> {
        match self {
            Reply::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Returns true if the key had no instance.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Reply::Unknown(_))
    }
}

enum Pending<E> {
    Schedule(ScheduleRequest<E>),
    Cancel(ScheduleToken),
    Publish(E),
}

/// A decided transition, ready to be written.
struct Staged<M: StateMachine> {
    next: InstanceOf<M>,
    from: M::State,
    pending: Vec<Pending<M::Event>>,
    reply: bool,
    note: &'static str,
}

/// Drives instances of one state machine.
///
/// Mutating deliveries for the same key are serialized through a per-key
/// lock and every write is a compare-and-swap, so two runners sharing a
/// store still never lose an update. Side effects (timers, published
/// events) run only after the write they belong to has succeeded.
pub struct SagaRunner<M, S, G, P>
where
    M: StateMachine,
    S: InstanceStore,
    G: SchedulingGateway<M::Event>,
    P: EventPublisher<M::Event>,
{
    machine: M,
    correlator: Correlator<M, S>,
    gateway: G,
    publisher: P,
    locks: KeyedLocks,
    config: RunnerConfig,
}

impl<M, S, G, P> SagaRunner<M, S, G, P>
where
    M: StateMachine,
    S: InstanceStore,
    G: SchedulingGateway<M::Event>,
    P: EventPublisher<M::Event>,
{
    /// Creates a runner with the default configuration.
    pub fn new(machine: M, store: S, gateway: G, publisher: P) -> Self {
        Self::with_config(machine, store, gateway, publisher, RunnerConfig::default())
    }

    /// Creates a runner with an explicit configuration.
    pub fn with_config(machine: M, store: S, gateway: G, publisher: P, config: RunnerConfig) -> Self {
        Self {
            machine,
            correlator: Correlator::new(store),
            gateway,
            publisher,
            locks: KeyedLocks::new(),
            config,
        }
    }

    /// Returns the state machine.
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Returns the runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Delivers an externally originated event and waits for its reply.
    pub async fn dispatch(
        self: &Arc<Self>,
        key: CorrelationId,
        event: M::Event,
    ) -> Result<Reply<M::Snapshot>, SagaError>
    where
        S: 'static,
        G: 'static,
        P: 'static,
    {
        self.deliver(Inbound::new(key, event)).await
    }

    /// Processes one delivery to completion and waits for its reply.
    ///
    /// The work runs on its own task. Dropping the returned future does not
    /// stop a delivery between its write and its effects.
    pub async fn deliver(
        self: &Arc<Self>,
        inbound: Inbound<M::Event>,
    ) -> Result<Reply<M::Snapshot>, SagaError>
    where
        S: 'static,
        G: 'static,
        P: 'static,
    {
        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.process(inbound).await }).await?
    }

    /// Drains the ingress until it closes or `shutdown` flips, then waits for
    /// the deliveries still in flight.
    ///
    /// Each delivery runs on its own task, so different keys proceed in
    /// parallel while the per-key lock keeps each key sequential.
    pub async fn listen(
        self: Arc<Self>,
        mut ingress: IngressReceiver<M::Event>,
        mut shutdown: watch::Receiver<bool>,
    ) where
        S: 'static,
        G: 'static,
        P: 'static,
    {
        tracing::info!(saga_type = M::saga_type(), "ingress listener started");
        let mut deliveries = JoinSet::new();

        loop {
            tokio::select! {
                delivery = ingress.recv() => {
                    let Some(inbound) = delivery else {
                        tracing::info!("ingress closed, listener stopping");
                        break;
                    };

                    let runner = Arc::clone(&self);
                    deliveries.spawn(async move {
                        let key = inbound.key;
                        let event = inbound.event.event_type();
                        if let Err(e) = runner.process(inbound).await {
                            tracing::error!(
                                %key,
                                event,
                                error = %e,
                                retryable = e.is_retryable(),
                                "delivery failed"
                            );
                        }
                    });
                }
                Some(finished) = deliveries.join_next(), if !deliveries.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "delivery task failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("shutdown signalled, listener stopping");
                    break;
                }
            }
        }

        if !deliveries.is_empty() {
            tracing::info!(in_flight = deliveries.len(), "waiting for in-flight deliveries");
        }
        while let Some(finished) = deliveries.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "delivery task failed");
            }
        }
    }

    #[tracing::instrument(
        skip(self, inbound),
        fields(
            saga_type = M::saga_type(),
            key = %inbound.key,
            event = inbound.event.event_type(),
            timer = inbound.timer.is_some(),
        )
    )]
    async fn process(&self, inbound: Inbound<M::Event>) -> Result<Reply<M::Snapshot>, SagaError> {
        metrics::counter!("saga_events_total", "event" => inbound.event.event_type()).increment(1);
        let started = Instant::now();

        let result = if inbound.event.kind().mutates() {
            let _guard = self.locks.acquire(inbound.key).await;
            self.apply(&inbound).await
        } else {
            self.answer(&inbound).await
        };

        metrics::histogram!("saga_dispatch_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Read-only path: no lock, no write, no effects.
    async fn answer(&self, inbound: &Inbound<M::Event>) -> Result<Reply<M::Snapshot>, SagaError> {
        let instance = match self.correlator.resolve(inbound.key, &inbound.event).await? {
            Resolution::Existing(instance) => instance,
            Resolution::Created(_) | Resolution::Missing => {
                tracing::debug!("no instance for key");
                return Ok(Reply::Unknown(inbound.key));
            }
        };

        match self.machine.decide(&instance, &inbound.event) {
            Decision::Apply(transition) if transition.reply => {
                Ok(Reply::Snapshot(M::snapshot(&instance)))
            }
            Decision::Apply(_) => Ok(Reply::Accepted),
            Decision::Unhandled => self.unhandled(&instance, &inbound.event),
        }
    }

    /// Mutating path. Runs with the key's lock held.
    async fn apply(&self, inbound: &Inbound<M::Event>) -> Result<Reply<M::Snapshot>, SagaError> {
        let key = inbound.key;

        for attempt in 1..=self.config.max_attempts {
            let Some(instance) = self
                .correlator
                .resolve(key, &inbound.event)
                .await?
                .into_instance()
            else {
                return Ok(Reply::Unknown(key));
            };

            if let Some(stamp) = &inbound.timer
                && instance.token(&stamp.slot) != Some(stamp.token)
            {
                metrics::counter!("saga_stale_timers_total").increment(1);
                tracing::debug!(
                    slot = %stamp.slot,
                    token = %stamp.token,
                    state = %instance.state,
                    "stale timer ignored"
                );
                return Ok(Reply::Ignored);
            }

            if M::is_terminal(&instance.state) {
                metrics::counter!("saga_ignored_events_total", "event" => inbound.event.event_type())
                    .increment(1);
                tracing::debug!(state = %instance.state, "instance is retired, event ignored");
                return Ok(Reply::Ignored);
            }

            let transition = match self.machine.decide(&instance, &inbound.event) {
                Decision::Apply(transition) => transition,
                Decision::Unhandled => return self.unhandled(&instance, &inbound.event),
            };

            let staged = self.stage(&instance, transition);
            match self.commit(&instance, staged).await {
                Ok(committed) => return Ok(self.finish(committed, &inbound.event).await),
                Err(SagaError::Store(e)) if e.is_conflict() => {
                    metrics::counter!("saga_version_conflicts_total").increment(1);
                    tracing::debug!(attempt, error = %e, "version conflict, re-reading instance");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(attempts = self.config.max_attempts, "giving up after repeated conflicts");
        Err(SagaError::ConcurrencyExhausted {
            id: key,
            attempts: self.config.max_attempts,
        })
    }

    /// Applies a transition to a copy of the instance and collects the
    /// collaborator calls it implies. Timer tokens are minted here so the
    /// written instance already names them.
    fn stage(&self, instance: &InstanceOf<M>, transition: Transition<M>) -> Staged<M> {
        let mut next = instance.clone();
        next.state = transition.state;
        next.data = transition.data;

        let mut pending = Vec::with_capacity(transition.effects.len());
        for effect in transition.effects {
            match effect {
                Effect::Schedule { slot, delay, event } => {
                    let token = ScheduleToken::new();
                    if let Some(previous) = next.arm(slot, token) {
                        pending.push(Pending::Cancel(previous));
                    }
                    pending.push(Pending::Schedule(ScheduleRequest {
                        token,
                        key: next.id,
                        slot: slot.to_string(),
                        delay,
                        event,
                    }));
                }
                Effect::Unschedule { slot } => {
                    if let Some(previous) = next.disarm(slot) {
                        pending.push(Pending::Cancel(previous));
                    }
                }
                Effect::Publish(event) => pending.push(Pending::Publish(event)),
            }
        }

        Staged {
            next,
            from: instance.state,
            pending,
            reply: transition.reply,
            note: transition.note,
        }
    }

    /// Persists a staged transition with a compare-and-swap.
    async fn commit(
        &self,
        current: &InstanceOf<M>,
        mut staged: Staged<M>,
    ) -> Result<Staged<M>, SagaError> {
        if !current.is_new() && staged.next == *current {
            return Ok(staged);
        }

        let expected = current.version;
        let store = self.correlator.store();

        if self.config.remove_completed && M::is_terminal(&staged.next.state) {
            if !current.is_new() {
                store.remove(current.id, expected).await?;
            }
            tracing::info!(key = %current.id, "completed instance removed");
            return Ok(staged);
        }

        let record = InstanceRecord::from_state(staged.next.id, M::saga_type(), &staged.next)?;
        staged.next.version = store.compare_and_swap(expected, record).await?;
        Ok(staged)
    }

    /// Logs the outcome, runs post-write effects, and builds the reply.
    async fn finish(&self, staged: Staged<M>, event: &M::Event) -> Reply<M::Snapshot> {
        let Staged {
            next,
            from,
            pending,
            reply,
            note,
        } = staged;

        if from != next.state {
            metrics::counter!(
                "saga_transitions_total",
                "from" => from.to_string(),
                "to" => next.state.to_string()
            )
            .increment(1);
            tracing::info!(
                key = %next.id,
                %from,
                to = %next.state,
                event = event.event_type(),
                version = %next.version,
                note,
                "transition applied"
            );
        } else {
            tracing::debug!(state = %next.state, note, "handled without state change");
        }

        for action in pending {
            self.perform(next.id, action).await;
        }

        if reply {
            Reply::Snapshot(M::snapshot(&next))
        } else {
            Reply::Accepted
        }
    }

    /// Runs one collaborator call. The state is already durable, so failures
    /// are logged, not returned.
    async fn perform(&self, key: CorrelationId, action: Pending<M::Event>) {
        match action {
            Pending::Cancel(token) => {
                if let Err(e) = self.gateway.cancel(token).await {
                    tracing::warn!(
                        %key,
                        %token,
                        error = %e,
                        "timer cancel failed; its delivery will be dropped as stale"
                    );
                }
            }
            Pending::Schedule(request) => {
                let token = request.token;
                let slot = request.slot.clone();
                if let Err(e) = self.gateway.schedule(request).await {
                    tracing::warn!(
                        %key,
                        %token,
                        slot = %slot,
                        error = %e,
                        "recoverable inconsistency: state written but timer not armed"
                    );
                }
            }
            Pending::Publish(event) => {
                let event_type = event.event_type();
                if let Err(e) = self.publisher.publish(Inbound::new(key, event)).await {
                    tracing::warn!(
                        %key,
                        event = event_type,
                        error = %e,
                        "recoverable inconsistency: state written but derived event lost"
                    );
                }
            }
        }
    }

    fn unhandled(
        &self,
        instance: &InstanceOf<M>,
        event: &M::Event,
    ) -> Result<Reply<M::Snapshot>, SagaError> {
        metrics::counter!("saga_ignored_events_total", "event" => event.event_type()).increment(1);

        match self.config.unhandled {
            UnhandledPolicy::Ignore => {
                tracing::debug!(state = %instance.state, "no transition for event, ignored");
                Ok(Reply::Ignored)
            }
            UnhandledPolicy::Reject => Err(SagaError::UnhandledEvent {
                id: instance.id,
                state: instance.state.to_string(),
                event: event.event_type(),
            }),
        }
    }
}

impl<M, S, G, P> fmt::Debug for SagaRunner<M, S, G, P>
where
    M: StateMachine,
    S: InstanceStore,
    G: SchedulingGateway<M::Event>,
    P: EventPublisher<M::Event>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaRunner")
            .field("saga_type", &M::saga_type())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
