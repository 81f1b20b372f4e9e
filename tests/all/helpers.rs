use hutch::amqp::configuration::{RabbitMqSettings, RABBIT_URI};
use hutch::Hutch;
use std::time::Duration;
use uuid::Uuid;

pub fn get_rabbitmq_settings() -> RabbitMqSettings {
    let mut settings = RabbitMqSettings {
        publish_timeout_seconds: Some(3),
        ..RabbitMqSettings::default()
    };
    if let Ok(uri) = std::env::var(RABBIT_URI) {
        settings.uri = uri.into();
    }
    settings
}

/// A `Hutch` whose connection is already up.
pub async fn get_connected_hutch() -> Hutch {
    let hutch = Hutch::start(get_rabbitmq_settings()).unwrap();
    tokio::time::timeout(
        Duration::from_secs(10),
        hutch.connection().wait_until_connected(),
    )
    .await
    .expect("RabbitMQ is not reachable");
    hutch
}

pub fn random_queue_name() -> String {
    format!("hutch-test-{}", Uuid::new_v4())
}
