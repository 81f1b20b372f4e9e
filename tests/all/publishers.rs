use crate::helpers::{get_connected_hutch, random_queue_name};
use hutch::amqp::options::QueueDeclareOptions;
use hutch::pool::CheckIn;
use serde_json::json;

/// Publishing through the default exchange needs the queue to exist, otherwise the broker
/// silently drops the message.
async fn declare_queue(hutch: &hutch::Hutch, queue_name: &str) {
    let channel = hutch.connection().open_channel().await.unwrap();
    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                durable: true,
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
            <_>::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn confirmed_channels_are_reused_through_the_pool() {
    let hutch = get_connected_hutch().await;
    let queue_name = random_queue_name();
    declare_queue(&hutch, &queue_name).await;
    let pool = hutch.publisher().channel_pool();
    assert_eq!(pool.idle(), 0);

    assert!(hutch.send(&queue_name, &json!({ "id": 1 })).await);
    assert_eq!(pool.idle(), 1);

    assert!(hutch.send(&queue_name, &json!({ "id": 2 })).await);
    assert_eq!(pool.idle(), 1);
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn concurrent_sends_never_overfill_the_pool() {
    let hutch = get_connected_hutch().await;
    let queue_name = random_queue_name();
    declare_queue(&hutch, &queue_name).await;

    let sends = (0..80).map(|id| hutch.send(&queue_name, &json!({ "id": id })));
    let outcomes = futures_util::future::join_all(sends).await;

    assert!(outcomes.into_iter().all(|ok| ok));
    let pool = hutch.publisher().channel_pool();
    assert!(pool.idle() <= pool.capacity());
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn a_pooled_channel_closed_while_idle_is_replaced() {
    let hutch = get_connected_hutch().await;
    let queue_name = random_queue_name();
    declare_queue(&hutch, &queue_name).await;
    let pool = hutch.publisher().channel_pool();

    // Park an open channel in the pool, then close it behind the pool's back.
    let channel = hutch.connection().open_confirm_channel().await.unwrap();
    let alias = channel.clone();
    assert_eq!(pool.check_in(channel).await, CheckIn::Pooled);
    alias.close(200, "closing for test").await.unwrap();
    assert_eq!(pool.idle(), 1);

    assert!(hutch.send(&queue_name, &json!({ "id": 1 })).await);
    assert_eq!(pool.idle(), 1);
    let reused = pool.try_checkout().unwrap();
    assert!(reused.status().connected());
}
