//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::DeveloperConfig;
use saga::{RunnerConfig, UnhandledPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset means in-memory
/// - `TIRED_AFTER_SECS`: auto-tired delay in seconds (default: `5`)
/// - `SLEEP_LIMIT`: naps before a developer goes home (default: `2`)
/// - `CAS_MAX_ATTEMPTS`: write attempts per delivery (default: `3`)
/// - `UNHANDLED_POLICY`: `ignore` or `reject` (default: `ignore`)
/// - `REMOVE_COMPLETED`: delete retired instances (default: `false`)
/// - `INGRESS_CAPACITY`: ingress channel bound (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub tired_after: Duration,
    pub sleep_limit: u32,
    pub max_attempts: u32,
    pub unhandled: UnhandledPolicy,
    pub remove_completed: bool,
    pub ingress_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            tired_after: parse(&lookup, "TIRED_AFTER_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.tired_after),
            sleep_limit: parse(&lookup, "SLEEP_LIMIT").unwrap_or(defaults.sleep_limit),
            max_attempts: parse(&lookup, "CAS_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            unhandled: parse(&lookup, "UNHANDLED_POLICY").unwrap_or(defaults.unhandled),
            remove_completed: parse(&lookup, "REMOVE_COMPLETED").unwrap_or(defaults.remove_completed),
            ingress_capacity: parse(&lookup, "INGRESS_CAPACITY").unwrap_or(defaults.ingress_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the developer machine settings.
    pub fn developer(&self) -> DeveloperConfig {
        DeveloperConfig::default()
            .with_tired_after(self.tired_after)
            .with_sleep_limit(self.sleep_limit)
    }

    /// Returns the runner settings.
    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_unhandled(self.unhandled)
            .with_remove_completed(self.remove_completed)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let developer = DeveloperConfig::default();
        let runner = RunnerConfig::default();

        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            tired_after: developer.tired_after,
            sleep_limit: developer.sleep_limit,
            max_attempts: runner.max_attempts,
            unhandled: runner.unhandled,
            remove_completed: runner.remove_completed,
            ingress_capacity: 1024,
        }
    }
}
