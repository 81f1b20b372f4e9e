use crate::helpers::{get_connected_hutch, random_queue_name};
use async_trait::async_trait;
use hutch::amqp::options::QueueDeclareOptions;
use hutch::consumers::{Delivery, Handler};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Counters {
    handled: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Acks every message after sleeping for 10ms.
struct SlowAck(Counters);

#[async_trait]
impl Handler for SlowAck {
    async fn handle(&self, delivery: &Delivery) {
        let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.handled.fetch_add(1, Ordering::SeqCst);
        delivery.ack().await.unwrap();
    }
}

/// Panics on every message.
struct Poisoned(Counters);

#[async_trait]
impl Handler for Poisoned {
    async fn handle(&self, _delivery: &Delivery) {
        self.0.handled.fetch_add(1, Ordering::SeqCst);
        panic!("cannot process this message");
    }
}

async fn wait_for(counter: &AtomicUsize, expected: usize) {
    tokio::time::timeout(Duration::from_secs(15), async {
        while counter.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for deliveries");
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn a_sent_message_reaches_the_subscriber() {
    let hutch = get_connected_hutch().await;
    let queue_name = random_queue_name();
    let counters = Counters::default();

    let subscription = hutch.subscribe(&queue_name, 1, SlowAck(counters.clone()));
    // Give the worker time to declare the queue.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(subscription.active_workers(), 1);

    assert!(hutch.send(&queue_name, &json!({ "id": 1 })).await);
    wait_for(&counters.handled, 1).await;

    subscription.abort();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn at_most_max_workers_handlers_run_concurrently() {
    let hutch = get_connected_hutch().await;
    let queue_name = random_queue_name();
    let counters = Counters::default();

    let subscription = hutch.subscribe(&queue_name, 3, SlowAck(counters.clone()));
    tokio::time::sleep(Duration::from_secs(1)).await;
    for id in 0..10 {
        assert!(hutch.send(&queue_name, &json!({ "id": id })).await);
    }

    wait_for(&counters.handled, 10).await;
    assert!(counters.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert!(subscription.active_workers() <= 3);

    subscription.abort();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn a_panicking_handler_drops_the_message_and_keeps_consuming() {
    let hutch = get_connected_hutch().await;
    let queue_name = random_queue_name();
    let counters = Counters::default();

    let subscription = hutch.subscribe(&queue_name, 1, Poisoned(counters.clone()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(hutch.send(&queue_name, &json!({ "id": 1 })).await);
    assert!(hutch.send(&queue_name, &json!({ "id": 2 })).await);
    wait_for(&counters.handled, 2).await;

    // Nacked without requeue: nothing is redelivered.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(counters.handled.load(Ordering::SeqCst), 2);
    assert!(subscription.is_running());

    let channel = hutch.connection().open_channel().await.unwrap();
    let queue = channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                passive: true,
                ..QueueDeclareOptions::default()
            },
            <_>::default(),
        )
        .await
        .unwrap();
    assert_eq!(queue.message_count(), 0);

    subscription.abort();
}
