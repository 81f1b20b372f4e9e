use crate::amqp::ConnectionHandle;
use crate::consumers::{worker::Worker, Handler};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Pause after spawning a worker, so a broker outage does not turn into a respawn storm.
const SPAWN_INTERVAL: Duration = Duration::from_millis(200);

/// Runs a bounded, self-healing set of consumer workers for each subscribed queue.
///
/// Each subscription gets `max_workers` slots. A supervising task keeps trying to fill every
/// free slot with a new worker; workers give their slot back when their consume stream ends
/// (broker restart, channel closed, ...), which makes the supervisor spawn a replacement.
#[derive(Clone)]
pub struct WorkerPoolManager {
    connection: ConnectionHandle,
    subscriptions: Arc<Mutex<Vec<AbortHandle>>>,
}

/// A handle on the workers consuming from one queue.
///
/// Dropping the handle does not stop the workers: use [`Subscription::abort`] or
/// [`WorkerPoolManager::shutdown`].
pub struct Subscription {
    queue_name: String,
    max_workers: usize,
    slots: Arc<Semaphore>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of workers currently holding a slot.
    pub fn active_workers(&self) -> usize {
        self.max_workers
            .saturating_sub(self.slots.available_permits())
    }

    /// `false` in offline mode or once aborted.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the supervising task together with all of its workers.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl WorkerPoolManager {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            subscriptions: Arc::default(),
        }
    }

    /// Consume from `queue_name` with at most `max_workers` concurrent workers, each
    /// invoking `handler` on one delivery at a time.
    ///
    /// Does nothing in offline mode. A `max_workers` of zero is treated as one, values above
    /// [`Semaphore::MAX_PERMITS`] as that maximum.
    pub fn subscribe<H: Handler>(
        &self,
        queue_name: &str,
        max_workers: usize,
        handler: H,
    ) -> Subscription {
        let max_workers = if max_workers == 0 {
            warn!(queue_name, "`max_workers` must be at least 1, using 1");
            1
        } else if max_workers > Semaphore::MAX_PERMITS {
            warn!(
                queue_name,
                max_workers,
                "`max_workers` is too large, using {}",
                Semaphore::MAX_PERMITS
            );
            Semaphore::MAX_PERMITS
        } else {
            max_workers
        };
        let slots = Arc::new(Semaphore::new(max_workers));

        if self.connection.is_offline() {
            info!(queue_name, "Offline mode: not subscribing to RabbitMQ");
            return Subscription {
                queue_name: queue_name.to_owned(),
                max_workers,
                slots,
                task: None,
            };
        }

        let worker = Arc::new(Worker {
            connection: self.connection.clone(),
            queue_name: queue_name.to_owned(),
            handler: Arc::new(handler),
        });
        let task = tokio::spawn(keep_workers_running(
            Arc::clone(&slots),
            SPAWN_INTERVAL,
            move |slot| Arc::clone(&worker).run(slot),
        ));
        {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscriptions.retain(|subscription| !subscription.is_finished());
            subscriptions.push(task.abort_handle());
        }
        info!(queue_name, max_workers, "Subscribed");

        Subscription {
            queue_name: queue_name.to_owned(),
            max_workers,
            slots,
            task: Some(task),
        }
    }

    /// Stop every subscription made through this manager.
    pub fn shutdown(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in subscriptions {
            subscription.abort();
        }
    }
}

/// Fill free slots with workers, forever.
///
/// Workers live in a `JoinSet`: aborting this task aborts them too.
pub(crate) async fn keep_workers_running<F, Fut>(
    slots: Arc<Semaphore>,
    spawn_interval: Duration,
    spawn_worker: F,
) where
    F: Fn(OwnedSemaphorePermit) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut workers = JoinSet::new();
    loop {
        tokio::select! {
            slot = Arc::clone(&slots).acquire_owned() => {
                let Ok(slot) = slot else {
                    return;
                };
                workers.spawn(spawn_worker(slot));
                tokio::time::sleep(spawn_interval).await;
            }
            Some(exited) = workers.join_next() => {
                if let Err(e) = exited {
                    if e.is_panic() {
                        error!("Consumer worker crashed: {:?}", e);
                    }
                }
            }
        }
    }
}
