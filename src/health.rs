//! Lightweight liveness probe for the broker connection.
use crate::amqp::ConnectionHandle;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl From<bool> for HealthStatus {
    fn from(healthy: bool) -> Self {
        if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// `true` if a live connection exists and a throwaway channel can be opened on it.
///
/// Always `true` in offline mode. Does not wait for a reconnect in progress and leaves no
/// state behind on the broker.
pub async fn ping(connection: &ConnectionHandle) -> bool {
    if connection.is_offline() {
        return true;
    }
    match connection.probe().await {
        Ok(()) => true,
        Err(e) => {
            debug!("RabbitMQ health probe failed: {}", e);
            false
        }
    }
}
