use crate::amqp::{
    backoff::{channel_backoff, MAX_CHANNEL_ATTEMPTS},
    ConnectionError, ConnectionHandle,
};
use crate::consumers::{Delivery, Handler};
use crate::pool::PooledChannel;
use amq_protocol_types::FieldTable;
use backon::Retryable;
use futures_util::{FutureExt, StreamExt};
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions},
    Channel, Consumer,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Unacknowledged deliveries a worker may hold at once.
pub(crate) const PREFETCH_COUNT: u16 = 5;
/// Pause before a worker whose consume stream ended (or failed to start) exits.
const EXIT_DELAY: Duration = Duration::from_secs(2);

/// Everything a worker needs, shared by all the workers of a subscription.
pub(super) struct Worker<H> {
    pub(super) connection: ConnectionHandle,
    pub(super) queue_name: String,
    pub(super) handler: Arc<H>,
}

/// How a delivery left the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Handled,
    /// The handler panicked: the delivery was nacked without requeue.
    Panicked,
}

impl<H: Handler> Worker<H> {
    /// Consume from the queue until the delivery stream ends.
    ///
    /// `_slot` is released when the worker exits, letting the subscription spawn a replacement.
    #[tracing::instrument(skip_all, name = "consumer_worker", fields(queue_name = %self.queue_name))]
    pub(super) async fn run(self: Arc<Self>, _slot: OwnedSemaphorePermit) {
        let Some(channel) = self.open_channel().await else {
            warn!(
                attempts = MAX_CHANNEL_ATTEMPTS,
                "Could not open a consumer channel, giving the worker slot back"
            );
            return;
        };

        let mut consumer = match self.start_consuming(&channel).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!("Failed to set up the consumer: {}", e);
                PooledChannel::close(channel).await;
                tokio::time::sleep(EXIT_DELAY).await;
                return;
            }
        };
        info!("Worker started consuming");

        while let Some(next) = consumer.next().await {
            match next {
                Ok(delivery) => {
                    let delivery = Delivery::new(&self.queue_name, delivery);
                    dispatch(self.handler.as_ref(), &delivery).await;
                }
                Err(e) => {
                    error!("Consumer error: {}", e);
                    break;
                }
            }
        }

        info!("Delivery stream ended, worker exiting");
        PooledChannel::close(channel).await;
        tokio::time::sleep(EXIT_DELAY).await;
    }

    /// Open a channel on the shared connection, backing off between attempts.
    async fn open_channel(&self) -> Option<Channel> {
        let mut attempt = 0;
        (|| self.connection.open_channel())
            .retry(channel_backoff())
            .when(|e| !matches!(e, ConnectionError::Offline))
            .notify(|e, delay| {
                attempt += 1;
                warn!(attempt, ?delay, "Failed to open a consumer channel: {}", e);
            })
            .await
            .ok()
    }

    /// Declare the queue (durable, shared, kept when unused), set the prefetch window and
    /// open a manual-ack consume stream.
    async fn start_consuming(&self, channel: &Channel) -> Result<Consumer, lapin::Error> {
        channel
            .queue_declare(
                &self.queue_name,
                QueueDeclareOptions {
                    passive: false,
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions { global: false })
            .await?;
        channel
            .basic_consume(
                &self.queue_name,
                &format!("{}-{}", self.queue_name, Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
    }
}

/// Hand a delivery to the handler, containing panics to that one delivery.
pub(crate) async fn dispatch<H: Handler + ?Sized>(handler: &H, delivery: &Delivery) -> Dispatch {
    match AssertUnwindSafe(handler.handle(delivery))
        .catch_unwind()
        .await
    {
        Ok(()) => Dispatch::Handled,
        Err(panic) => {
            error!(
                queue_name = %delivery.queue_name,
                delivery_tag = delivery.delivery_tag,
                "Message handler panicked, dropping the message: {}",
                panic_message(panic.as_ref())
            );
            if let Err(e) = delivery.nack(false).await {
                error!(delivery_tag = delivery.delivery_tag, "Failed to nack message: {}", e);
            }
            Dispatch::Panicked
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
