use crate::amqp::{configuration::RabbitMqSettings, ConnectionError};
use lapin::{options::ConfirmSelectOptions, Channel, Connection, ConnectionProperties};
use redact::Secret;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

#[derive(Clone)]
/// All the information required to connect to a RabbitMq broker.
pub struct ConnectionFactory {
    uri: Secret<String>,
    /// The timeout observed when trying to connect to RabbitMq.
    connection_timeout: Duration,
}

impl ConnectionFactory {
    /// Create a new connection factory from settings.
    ///
    /// A connection timeout can be (optionally) specified in `settings`.
    /// If the connection timeout is left unspecified, it will be defaulted to 10 seconds.
    pub fn new_from_config(settings: &RabbitMqSettings) -> Result<Self, anyhow::Error> {
        settings.validate()?;
        Ok(Self {
            uri: settings.uri.clone(),
            connection_timeout: settings.connection_timeout(),
        })
    }

    /// Establish a new connection to a RabbitMq broker.
    ///
    /// This is a single attempt: retrying is up to the [`ConnectionSupervisor`].
    /// `amqps://` uris are dialed over TLS.
    ///
    /// [`ConnectionSupervisor`]: crate::amqp::ConnectionSupervisor
    #[tracing::instrument(name = "rabbitmq_connect", skip(self))]
    pub async fn new_connection(&self) -> Result<Connection, ConnectionError> {
        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let connection = timeout(
            self.connection_timeout,
            Connection::connect(self.uri.expose_secret(), properties),
        )
        .await
        .map_err(|_| ConnectionError::DialTimeout(self.connection_timeout))??;
        Ok(connection)
    }
}

/// Open a channel in publisher-confirm mode on `connection`.
///
/// The broker closing the channel is only logged: the pool notices closed channels on checkout.
pub(crate) async fn create_confirm_channel(
    connection: &Connection,
) -> Result<Channel, ConnectionError> {
    let channel = connection.create_channel().await?;
    channel
        .confirm_select(ConfirmSelectOptions { nowait: false })
        .await?;
    let channel_id = channel.id();
    channel.on_error(move |e| {
        warn!(channel_id, "RabbitMQ closed a publisher channel: {:?}", e);
    });
    Ok(channel)
}
