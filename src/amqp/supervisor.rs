//! Keeps a single connection to RabbitMq alive for the whole process.
use crate::amqp::{
    backoff::{dial_backoff, MAX_BACKOFF},
    factory::{create_confirm_channel, ConnectionFactory},
    ConnectionError,
};
use backon::BackoffBuilder;
use lapin::{Channel, Connection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Pause between noticing a closed connection and dialing again.
const REDIAL_DELAY: Duration = Duration::from_millis(200);
/// Pause before respawning a supervisor that crashed.
const RESPAWN_DELAY: Duration = Duration::from_secs(1);
/// How often the connection status is polled while waiting for a close notification.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Shared {
    /// Written only by the supervisor task.
    connection: RwLock<Option<Connection>>,
    state: watch::Sender<ConnectionState>,
    offline: bool,
}

/// Read access to the connection owned by the [`ConnectionSupervisor`].
///
/// The connection itself never leaves the handle: callers get channels opened on it.
/// Cloning the handle is cheap.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    fn new(offline: bool) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connection: RwLock::new(None),
                state,
                offline,
            }),
        }
    }

    /// `true` if the embedding application runs us in offline/test mode.
    pub fn is_offline(&self) -> bool {
        self.shared.offline
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Resolves once the supervisor has a live connection.
    ///
    /// Never resolves in offline mode.
    pub async fn wait_until_connected(&self) {
        let mut state = self.shared.state.subscribe();
        while *state.borrow_and_update() != ConnectionState::Connected {
            if state.changed().await.is_err() {
                futures_util::future::pending::<()>().await;
            }
        }
    }

    /// Open a plain channel on the current connection.
    ///
    /// Waits while the supervisor is (re)dialing.
    pub async fn open_channel(&self) -> Result<Channel, ConnectionError> {
        if self.shared.offline {
            return Err(ConnectionError::Offline);
        }
        let guard = self.shared.connection.read().await;
        match guard.as_ref() {
            Some(connection) if connection.status().connected() => {
                Ok(connection.create_channel().await?)
            }
            _ => Err(ConnectionError::Unavailable),
        }
    }

    /// Open a channel with publisher confirms enabled on the current connection.
    pub async fn open_confirm_channel(&self) -> Result<Channel, ConnectionError> {
        if self.shared.offline {
            return Err(ConnectionError::Offline);
        }
        let guard = self.shared.connection.read().await;
        match guard.as_ref() {
            Some(connection) if connection.status().connected() => {
                create_confirm_channel(connection).await
            }
            _ => Err(ConnectionError::Unavailable),
        }
    }

    /// Open and immediately close a throwaway channel, without waiting for a reconnect in
    /// progress.
    pub async fn probe(&self) -> Result<(), ConnectionError> {
        if self.shared.offline {
            return Err(ConnectionError::Offline);
        }
        let guard = self
            .shared
            .connection
            .try_read()
            .map_err(|_| ConnectionError::Unavailable)?;
        let connection = guard
            .as_ref()
            .filter(|c| c.status().connected())
            .ok_or(ConnectionError::Unavailable)?;
        let channel = connection.create_channel().await?;
        channel.close(200, "health probe").await?;
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.state.send_replace(state);
    }

    async fn is_connected(&self) -> bool {
        self.shared
            .connection
            .read()
            .await
            .as_ref()
            .map(|c| c.status().connected())
            .unwrap_or(false)
    }
}

/// Owns the process-wide connection to RabbitMq and replaces it whenever it breaks.
///
/// Dial failures are retried forever with an exponential backoff (200ms doubling up to 5s);
/// they are only observable as the connection being unavailable for a while.
/// If the supervising task itself crashes it is respawned after one second.
///
/// Dropping the supervisor stops it.
pub struct ConnectionSupervisor {
    handle: ConnectionHandle,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor on the current tokio runtime.
    pub fn start(factory: ConnectionFactory) -> Self {
        let handle = ConnectionHandle::new(false);
        let task = tokio::spawn(supervise(factory, handle.clone()));
        Self {
            handle,
            task: Some(task),
        }
    }

    /// A supervisor that never dials: the connection stays absent.
    pub fn offline() -> Self {
        info!("Running in offline mode. Nothing will be sent to or received from RabbitMQ.");
        Self {
            handle: ConnectionHandle::new(true),
            task: None,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Aborts the wrapped task when dropped, so that aborting `supervise` also stops the keeper.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn supervise(factory: ConnectionFactory, handle: ConnectionHandle) {
    loop {
        let mut keeper = AbortOnDrop(tokio::spawn(keep_connected(
            factory.clone(),
            handle.clone(),
        )));
        match (&mut keeper.0).await {
            Ok(()) => return,
            Err(e) if e.is_panic() => {
                error!("RabbitMQ connection keeper crashed, restarting it: {:?}", e);
                handle.set_state(ConnectionState::Disconnected);
                tokio::time::sleep(RESPAWN_DELAY).await;
            }
            Err(_) => return,
        }
    }
}

async fn keep_connected(factory: ConnectionFactory, handle: ConnectionHandle) {
    loop {
        let closed = Arc::new(Notify::new());
        {
            // Readers wait here until we have a fresh connection.
            let mut guard = handle.shared.connection.write().await;
            handle.set_state(ConnectionState::Connecting);
            *guard = None;

            let mut backoff = dial_backoff().build();
            let mut attempt: u64 = 0;
            let connection = loop {
                attempt += 1;
                match factory.new_connection().await {
                    Ok(connection) => break connection,
                    Err(e) => {
                        let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                        warn!(attempt, ?delay, "RabbitMQ is not ready yet: {}", e);
                        tokio::time::sleep(delay).await;
                    }
                }
            };

            let notify = Arc::clone(&closed);
            connection.on_error(move |e| {
                warn!("RabbitMQ broken connection: {:?}", e);
                notify.notify_one();
            });
            *guard = Some(connection);
            handle.set_state(ConnectionState::Connected);
            info!(attempt, "Connected to RabbitMQ");
        }

        wait_for_close(&handle, &closed).await;
        handle.set_state(ConnectionState::Disconnected);
        info!("RabbitMQ connection closed, reconnecting");
        tokio::time::sleep(REDIAL_DELAY).await;
    }
}

/// Resolves when the connection reports an error or is no longer connected.
async fn wait_for_close(handle: &ConnectionHandle, closed: &Notify) {
    loop {
        tokio::select! {
            _ = closed.notified() => return,
            _ = tokio::time::sleep(STATUS_POLL_INTERVAL) => {
                if !handle.is_connected().await {
                    return;
                }
            }
        }
    }
}
