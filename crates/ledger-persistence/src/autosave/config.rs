//! Auto-save configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-ledger auto-save behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Whether auto-save is enabled.
    pub enabled: bool,

    /// Delay in milliseconds between the first unsaved change and the write.
    ///
    /// Further changes inside that window ride along with the same write.
    /// Zero saves synchronously on every change.
    pub delay_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 2000, // 2 seconds
        }
    }
}

impl AutosaveConfig {
    /// Create a disabled auto-save config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enabled config with the given delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            enabled: true,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Settings for the shared autosave worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long the worker waits on an empty queue before exiting.
    pub idle_timeout_ms: u64,

    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 5000, // 5 seconds
            thread_name: "ledger-autosave".to_string(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
