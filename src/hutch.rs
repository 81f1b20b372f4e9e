use crate::amqp::{
    configuration::RabbitMqSettings, ConnectionFactory, ConnectionHandle, ConnectionSupervisor,
};
use crate::consumers::{Handler, Subscription, WorkerPoolManager};
use crate::health::{self, HealthStatus};
use crate::pool::ChannelPool;
use crate::publishers::Publisher;
use serde::Serialize;
use std::future::Future;

/// The messaging subsystem of an application: one supervised connection, a publisher and
/// the consumer worker pools, all sharing that connection.
///
/// `Hutch::start` must be called from within a tokio runtime. Dropping the `Hutch` stops the
/// connection supervisor; call [`Hutch::shutdown`] to stop the consumers as well.
pub struct Hutch {
    supervisor: ConnectionSupervisor,
    publisher: Publisher,
    workers: WorkerPoolManager,
}

impl Hutch {
    /// Validate `settings` and start supervising the connection.
    ///
    /// In offline mode nothing is dialed: `send` returns `settings.offline_send_result`,
    /// `subscribe` does nothing and `ping` is always `true`.
    pub fn start(settings: RabbitMqSettings) -> Result<Self, anyhow::Error> {
        settings.validate()?;
        let supervisor = if settings.offline {
            ConnectionSupervisor::offline()
        } else {
            ConnectionSupervisor::start(ConnectionFactory::new_from_config(&settings)?)
        };

        let publisher = Publisher::builder(
            supervisor.handle(),
            ChannelPool::new(settings.channel_pool_size),
        )
        .publish_timeout(settings.publish_timeout())
        .offline_result(settings.offline_send_result)
        .build();
        let workers = WorkerPoolManager::new(supervisor.handle());

        Ok(Self {
            supervisor,
            publisher,
            workers,
        })
    }

    /// Publish `payload`, serialized as JSON, on `queue_name`.
    ///
    /// `true` means the broker confirmed the message. `false` covers every failure and is the
    /// caller's cue to retry if it wants to.
    pub fn send<T: Serialize + ?Sized>(
        &self,
        queue_name: &str,
        payload: &T,
    ) -> impl Future<Output = bool> + Send + '_ {
        self.publisher.send(queue_name, payload)
    }

    /// Consume `queue_name` with up to `max_workers` concurrent workers running `handler`.
    pub fn subscribe<H: Handler>(
        &self,
        queue_name: &str,
        max_workers: usize,
        handler: H,
    ) -> Subscription {
        self.workers.subscribe(queue_name, max_workers, handler)
    }

    /// `true` if the broker is reachable right now.
    pub async fn ping(&self) -> bool {
        health::ping(&self.supervisor.handle()).await
    }

    pub async fn health(&self) -> HealthStatus {
        self.ping().await.into()
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn connection(&self) -> ConnectionHandle {
        self.supervisor.handle()
    }

    /// Stop every consumer and the connection supervisor.
    pub fn shutdown(self) {
        self.workers.shutdown();
    }
}
