//! Runner configuration.

use std::str::FromStr;

use thiserror::Error;

/// What the runner does with an event that has no transition in the
/// instance's current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnhandledPolicy {
    /// Acknowledge and drop the event; the instance is left untouched.
    #[default]
    Ignore,

    /// Fail the delivery with `SagaError::UnhandledEvent`.
    Reject,
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown unhandled-event policy '{0}', expected 'ignore' or 'reject'")]
pub struct ParsePolicyError(String);

impl FromStr for UnhandledPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(UnhandledPolicy::Ignore),
            "reject" => Ok(UnhandledPolicy::Reject),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// Tuning knobs for [`crate::SagaRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Compare-and-swap attempts per delivery before giving up.
    pub max_attempts: u32,

    /// Handling of events without a matching transition.
    pub unhandled: UnhandledPolicy,

    /// Delete instances once they reach a terminal state.
    pub remove_completed: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unhandled: UnhandledPolicy::Ignore,
            remove_completed: false,
        }
    }
}

impl RunnerConfig {
    /// Sets the attempt budget. Values below one are raised to one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the unhandled-event policy.
    pub fn with_unhandled(mut self, policy: UnhandledPolicy) -> Self {
        self.unhandled = policy;
        self
    }

    /// Enables or disables removal of terminal instances.
    pub fn with_remove_completed(mut self, remove: bool) -> Self {
        self.remove_completed = remove;
        self
    }
}
