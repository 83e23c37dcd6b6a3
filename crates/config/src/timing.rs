//! Poll intervals, settle delays and retry limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Timing configuration for a renewal run
///
/// All waits are fixed; nothing here is adaptive.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TimingConfig {
    /// Wait after publishing challenges before asking the CA to validate
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay_secs: u64,

    /// Interval between challenge status reloads
    #[serde(default = "default_validation_poll_interval")]
    #[validate(range(min = 1))]
    pub validation_poll_interval_secs: u64,

    /// Interval between order status reloads after finalization
    #[serde(default = "default_order_poll_interval")]
    #[validate(range(min = 1))]
    pub order_poll_interval_secs: u64,

    /// Upper bound on status reloads while waiting for validation or
    /// finalization. Unset means poll until the CA settles.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_validation_polls: Option<u32>,

    /// Attempts for DNS, WAF and certificate store writes
    #[serde(default = "default_retry_attempts")]
    #[validate(range(min = 1, max = 100))]
    pub retry_attempts: u32,

    /// Delay between two attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Maximum number of issuer links followed when building the chain
    #[serde(default = "default_chain_max_depth")]
    #[validate(range(min = 1, max = 64))]
    pub chain_max_depth: usize,
}

fn default_propagation_delay() -> u64 {
    90
}

fn default_validation_poll_interval() -> u64 {
    4
}

fn default_order_poll_interval() -> u64 {
    1
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    30
}

fn default_chain_max_depth() -> usize {
    10
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            propagation_delay_secs: default_propagation_delay(),
            validation_poll_interval_secs: default_validation_poll_interval(),
            order_poll_interval_secs: default_order_poll_interval(),
            max_validation_polls: None,
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay(),
            chain_max_depth: default_chain_max_depth(),
        }
    }
}

impl TimingConfig {
    /// Propagation settle delay
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    /// Challenge poll interval
    pub fn validation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.validation_poll_interval_secs)
    }

    /// Order poll interval
    pub fn order_poll_interval(&self) -> Duration {
        Duration::from_secs(self.order_poll_interval_secs)
    }

    /// Retry delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
