//! Developer saga events.

use serde::{Deserialize, Serialize};

use crate::machine::{EventKind, MachineEvent};

/// Events a developer instance reacts to.
///
/// The correlation key travels next to the event, not inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeveloperEvent {
    /// Wake up and start performing. Creates the instance on first use.
    Wake,

    /// Delivered by the auto-tired timer.
    TiredTimeout,

    /// Start over after going home.
    NewDay,

    /// Ask how the developer is doing.
    Query,

    /// Retire the developer for good.
    Retire,
}

impl MachineEvent for DeveloperEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeveloperEvent::Wake => "Wake",
            DeveloperEvent::TiredTimeout => "TiredTimeout",
            DeveloperEvent::NewDay => "NewDay",
            DeveloperEvent::Query => "Query",
            DeveloperEvent::Retire => "Retire",
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            DeveloperEvent::Wake => EventKind::Creating,
            DeveloperEvent::Query => EventKind::ReadOnly,
            DeveloperEvent::TiredTimeout | DeveloperEvent::NewDay | DeveloperEvent::Retire => {
                EventKind::Mutating
            }
        }
    }
}
