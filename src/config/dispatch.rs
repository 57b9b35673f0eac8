use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters governing the transaction dispatcher: retry policy,
/// broadcast handling, and reconnect backoff bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Per-attempt wait for a matching response
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Additional attempts after the first; total attempts made is
    /// `retries + 1`, and the overall timeout budget is `timeout * (retries + 1)`
    pub retries: u8,
    /// Whether an empty/short response still counts as a reply worth retrying
    pub retry_on_empty: bool,
    /// Close and reconnect the transport after any transaction error
    pub close_comm_on_error: bool,
    /// Enforce the RTU 3.5-character silent interval between sends
    pub strict: bool,
    /// Allow slave_id=0 requests to skip response waiting
    pub broadcast_enable: bool,
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub reconnect_delay_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retries: 2,
            retry_on_empty: false,
            close_comm_on_error: true,
            strict: true,
            broadcast_enable: false,
            reconnect_delay: Duration::from_millis(100),
            reconnect_delay_max: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), crate::ConfigValidationError> {
        if self.timeout.is_zero() {
            return Err(crate::ConfigValidationError::connection(
                "dispatch.timeout cannot be 0".to_string(),
            ));
        }
        if self.reconnect_delay > self.reconnect_delay_max {
            return Err(crate::ConfigValidationError::connection(
                "dispatch.reconnect_delay cannot exceed reconnect_delay_max".to_string(),
            ));
        }
        Ok(())
    }
}
