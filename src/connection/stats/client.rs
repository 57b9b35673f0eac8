use std::time::SystemTime;

/// Stats tracked for a single peer address, owned by the stats actor.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Number of active connections from this address
    pub active_connections: usize,
    /// Last activity (connect, disconnect, or request)
    pub last_active: SystemTime,
    /// Total number of requests served
    pub total_requests: u64,
    /// Number of requests that ended in an error
    pub total_errors: u64,
    /// Timestamp of the most recent error
    pub last_error: Option<SystemTime>,
    /// Exponential moving average of response time
    pub avg_response_time_ms: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            active_connections: 0,
            last_active: SystemTime::now(),
            total_requests: 0,
            total_errors: 0,
            last_error: None,
            avg_response_time_ms: 0,
        }
    }
}
