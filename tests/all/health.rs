use crate::helpers::get_connected_hutch;
use hutch::HealthStatus;

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn a_connected_hutch_is_healthy() {
    let hutch = get_connected_hutch().await;

    assert!(hutch.ping().await);
    assert_eq!(hutch.health().await, HealthStatus::Healthy);
}
