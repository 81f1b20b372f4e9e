//! Retry policies for dialing the broker and opening consumer channels.
use backon::ExponentialBuilder;
use std::time::Duration;

pub const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Attempts at opening a consumer channel before a worker gives its slot back.
pub const MAX_CHANNEL_ATTEMPTS: usize = 10;

/// 200ms doubling up to 5s, forever.
///
/// Build a fresh iterator for every dial cycle: that is how the delay goes back to 200ms
/// after a successful connection.
pub fn dial_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(INITIAL_BACKOFF)
        .with_max_delay(MAX_BACKOFF)
        .with_factor(2.0)
        .without_max_times()
}

/// Same curve as [`dial_backoff`], with room for [`MAX_CHANNEL_ATTEMPTS`] attempts.
pub fn channel_backoff() -> ExponentialBuilder {
    dial_backoff().with_max_times(MAX_CHANNEL_ATTEMPTS - 1)
}
