use crate::helpers::{get_connected_hutch, random_queue_name};
use hutch::amqp::{options::ExchangeDeclareOptions, ConnectionState};
use lapin::ExchangeKind;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn a_lost_connection_is_restored() {
    let hutch = get_connected_hutch().await;
    let connection = hutch.connection();

    // Unknown exchange types are a connection-level error: the broker closes the connection.
    let channel = connection.open_channel().await.unwrap();
    let declared = channel
        .exchange_declare(
            &random_queue_name(),
            ExchangeKind::Custom("no-such-exchange-type".into()),
            ExchangeDeclareOptions::default(),
            <_>::default(),
        )
        .await;
    assert!(declared.is_err());

    tokio::time::timeout(Duration::from_secs(10), async {
        while connection.state() == ConnectionState::Connected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("The connection loss went unnoticed");

    // Redial delay plus the first backoff step, well within the 5s cap.
    tokio::time::timeout(Duration::from_secs(10), connection.wait_until_connected())
        .await
        .expect("The connection was not restored");
    assert!(hutch.ping().await);

    let queue_name = random_queue_name();
    let channel = connection.open_channel().await.unwrap();
    channel
        .queue_declare(&queue_name, <_>::default(), <_>::default())
        .await
        .unwrap();
    assert!(hutch.send(&queue_name, &json!({ "id": 1 })).await);
}
