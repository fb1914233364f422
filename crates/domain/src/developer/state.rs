//! Developer state machine states.

use serde::{Deserialize, Serialize};

/// The state of a developer in its lifecycle.
///
/// State transitions:
/// ```text
/// Initial ──Wake──► Performing ──TiredTimeout──► Sleeping
///    ▲                │    ▲                         │
///    │                │    └─────────Wake────────────┘
///  NewDay      TiredTimeout (naps ≥ limit)
///    │                ▼
///    └──────────── Final
///
/// any ──Retire──► Fired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeveloperState {
    /// Not started yet, or rested after a new day.
    #[default]
    Initial,

    /// Working until the auto-tired timer fires.
    Performing,

    /// Napping between working spells.
    Sleeping,

    /// Gone home for the day.
    Final,

    /// Retired for good (terminal state).
    Fired,
}

impl DeveloperState {
    /// Returns true if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeveloperState::Fired)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeveloperState::Initial => "Initial",
            DeveloperState::Performing => "Performing",
            DeveloperState::Sleeping => "Sleeping",
            DeveloperState::Final => "Final",
            DeveloperState::Fired => "Fired",
        }
    }
}

impl std::fmt::Display for DeveloperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
