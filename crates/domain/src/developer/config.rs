//! Developer saga configuration.

use std::time::Duration;

/// Tunables of the developer saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeveloperConfig {
    /// How long a developer performs before the auto-tired timer fires.
    pub tired_after: Duration,

    /// Number of naps after which the developer goes home.
    pub sleep_limit: u32,
}

impl DeveloperConfig {
    /// Overrides the auto-tired delay.
    pub fn with_tired_after(mut self, tired_after: Duration) -> Self {
        self.tired_after = tired_after;
        self
    }

    /// Overrides the nap limit.
    pub fn with_sleep_limit(mut self, sleep_limit: u32) -> Self {
        self.sleep_limit = sleep_limit;
        self
    }
}

impl Default for DeveloperConfig {
    fn default() -> Self {
        Self {
            tired_after: Duration::from_secs(5),
            sleep_limit: 2,
        }
    }
}
