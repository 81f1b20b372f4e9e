use std::time::Duration;

/// Failures observed while dialing RabbitMq or opening a channel on the shared connection.
///
/// These never reach the callers of `send`/`subscribe`: they are retried (or turned into a
/// `false`) by the component that hit them.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("Running in offline mode, no connection to RabbitMq is ever established")]
    Offline,
    #[error("There is no healthy connection to RabbitMq at the moment")]
    Unavailable,
    #[error("Gave up connecting to RabbitMq after {0:?}")]
    DialTimeout(Duration),
    #[error("The RabbitMq broker rejected the operation")]
    Broker(#[from] lapin::Error),
}
