use amq_protocol_types::{DeliveryTag, ShortString};
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions},
    BasicProperties,
};
use serde::de::DeserializeOwned;

/// A message received from a queue, waiting to be acked or nacked by the [`Handler`].
///
/// Settling the delivery is the handler's job: the worker only steps in when the handler
/// panics, nacking the delivery without requeueing it.
///
/// [`Handler`]: crate::consumers::Handler
#[derive(Debug)]
pub struct Delivery {
    /// The name of the queue the message was consumed from.
    pub queue_name: String,

    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,

    // AMQP forbids settling the same delivery twice, so the acker is only reachable
    // through the methods below.
    pub(crate) acker: Acker,
}

impl Delivery {
    pub(crate) fn new(queue_name: &str, delivery: lapin::message::Delivery) -> Self {
        Self {
            queue_name: queue_name.to_owned(),
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange,
            routing_key: delivery.routing_key,
            redelivered: delivery.redelivered,
            properties: delivery.properties,
            data: delivery.data,
            acker: delivery.acker,
        }
    }

    /// Deserialize the payload from JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }

    /// Positive acknowledgement - the message can be removed from the queue.
    pub async fn ack(&self) -> Result<(), lapin::Error> {
        self.acker.ack(BasicAckOptions { multiple: false }).await
    }

    /// Negative acknowledgement, putting the message back on the queue if `requeue` is `true`.
    pub async fn nack(&self, requeue: bool) -> Result<(), lapin::Error> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
    }

    /// Remove the message from the queue without processing it.
    pub async fn reject(&self) -> Result<(), lapin::Error> {
        self.acker
            .reject(BasicRejectOptions { requeue: false })
            .await
    }
}
