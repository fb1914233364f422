//! Developer transition table.

use common::CorrelationId;
use instance_store::Version;
use serde::{Deserialize, Serialize};

use super::{DeveloperConfig, DeveloperEvent, DeveloperState};
use crate::decision::Decision;
use crate::machine::{InstanceOf, StateMachine};
use crate::table::{Rule, StateFilter, TransitionTable};

/// Timer slot armed while a developer is performing.
pub const AUTO_TIRED: &str = "auto-tired";

/// Data carried by every developer instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperData {
    /// Naps taken since the last new day.
    pub sleep_count: u32,
}

/// What callers receive from `Wake` and `Query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperSnapshot {
    pub id: CorrelationId,
    pub state: DeveloperState,
    pub sleep_count: u32,
    pub version: Version,
}

/// The developer saga.
#[derive(Debug)]
pub struct DeveloperMachine {
    config: DeveloperConfig,
    table: TransitionTable<DeveloperMachine>,
}

impl DeveloperMachine {
    /// Builds the machine's transition table from the configuration.
    pub fn new(config: DeveloperConfig) -> Self {
        use DeveloperEvent::*;
        use DeveloperState::*;

        let tired_after = config.tired_after;
        let limit = config.sleep_limit;

        let table = TransitionTable::new()
            .rule(
                Rule::on(StateFilter::In(Initial), &Wake)
                    .to(Performing)
                    .schedule(AUTO_TIRED, tired_after, TiredTimeout)
                    .reply()
                    .note("start performing"),
            )
            .rule(
                Rule::on(StateFilter::In(Performing), &Wake)
                    .reply()
                    .note("already performing, busy"),
            )
            .rule(
                Rule::on(StateFilter::In(Performing), &TiredTimeout)
                    .then(|data: &mut DeveloperData| data.sleep_count += 1)
                    .to_computed(move |data: &DeveloperData| {
                        if data.sleep_count >= limit { Final } else { Sleeping }
                    })
                    .unschedule(AUTO_TIRED)
                    .note("tired"),
            )
            .rule(
                Rule::on(StateFilter::In(Sleeping), &Wake)
                    .when(move |data: &DeveloperData| data.sleep_count < limit)
                    .to(Performing)
                    .schedule(AUTO_TIRED, tired_after, TiredTimeout)
                    .reply()
                    .note("start performing"),
            )
            .rule(
                Rule::on(StateFilter::In(Final), &Wake)
                    .reply()
                    .note("at rest"),
            )
            .rule(Rule::on(StateFilter::In(Final), &TiredTimeout).note("at rest"))
            .rule(
                Rule::on(StateFilter::In(Final), &NewDay)
                    .then(|data: &mut DeveloperData| data.sleep_count = 0)
                    .to(Initial)
                    .reply()
                    .note("rested, ready to work"),
            )
            .rule(Rule::on(StateFilter::Any, &Query).reply())
            .rule(
                Rule::on(StateFilter::Any, &Retire)
                    .to(Fired)
                    .unschedule(AUTO_TIRED)
                    .note("retired"),
            );

        Self { config, table }
    }

    /// Returns the configuration the table was built from.
    pub fn config(&self) -> &DeveloperConfig {
        &self.config
    }
}

impl Default for DeveloperMachine {
    fn default() -> Self {
        Self::new(DeveloperConfig::default())
    }
}

impl StateMachine for DeveloperMachine {
    type State = DeveloperState;
    type Data = DeveloperData;
    type Event = DeveloperEvent;
    type Snapshot = DeveloperSnapshot;

    fn saga_type() -> &'static str {
        "Developer"
    }

    fn initial_state() -> DeveloperState {
        DeveloperState::Initial
    }

    fn is_terminal(state: &DeveloperState) -> bool {
        state.is_terminal()
    }

    fn decide(&self, instance: &InstanceOf<Self>, event: &DeveloperEvent) -> Decision<Self> {
        self.table.evaluate(instance, event)
    }

    fn snapshot(instance: &InstanceOf<Self>) -> DeveloperSnapshot {
        DeveloperSnapshot {
            id: instance.id,
            state: instance.state,
            sleep_count: instance.data.sleep_count,
            version: instance.version,
        }
    }
}
