//! Tunable durations and buffer sizes.
//!
//! The inactivity windows are server-defined; the values here only shape
//! client-side behavior (local claim-window promotion, presence expiry,
//! polling cadence, reconnect backoff).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a `Pending` session waits for an operator claim before
    /// the client promotes it to `AiActive` locally. The server-side
    /// promotion arriving later is a structural no-op.
    pub claim_window: Duration,

    /// Lifetime of a typing indicator without a refresh.
    pub typing_ttl: Duration,

    /// Cadence of the presence sweep tick.
    pub presence_sweep_interval: Duration,

    /// Polling cadence for joined sessions while the push channel is
    /// degraded.
    pub poll_interval: Duration,

    /// Reconnect backoff, doubling from initial up to max.
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,

    /// Actor command queue depth.
    pub command_buffer: usize,

    /// Per-subscriber update queue depth.
    pub update_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            claim_window: Duration::from_secs(30),
            typing_ttl: Duration::from_secs(4),
            presence_sweep_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            command_buffer: 256,
            update_buffer: 100,
        }
    }
}
