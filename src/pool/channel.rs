use deadpool::unmanaged::{Object, Pool};
use lapin::{Channel, ChannelState};
use tracing::debug;

/// A channel that can sit idle in a [`ChannelPool`].
#[async_trait::async_trait]
pub trait PooledChannel: Send + Sync + 'static {
    /// `false` once the broker (or we) closed the channel.
    fn is_open(&self) -> bool;

    /// Close the channel, giving up on it.
    async fn close(self);
}

#[async_trait::async_trait]
impl PooledChannel for Channel {
    fn is_open(&self) -> bool {
        matches!(self.status().state(), ChannelState::Connected)
    }

    async fn close(self) {
        if !self.is_open() {
            return;
        }
        if let Err(e) = Channel::close(&self, 200, "channel discarded").await {
            debug!(channel_id = self.id(), "Failed to close a discarded channel: {}", e);
        }
    }
}

/// What happened to a channel handed back with [`ChannelPool::check_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckIn {
    /// The channel is idle in the pool, ready for the next publisher.
    Pooled,
    /// The pool was full (or the channel closed): the channel has been closed.
    Discarded,
}

/// `ChannelPool` holds up to `capacity` idle channels.
///
/// A channel is owned by exactly one party at a time: either the pool or the task that
/// checked it out. Ownership moves out on [`ChannelPool::try_checkout`] and back in on
/// [`ChannelPool::check_in`]; cloning the pool shares the same idle set.
pub struct ChannelPool<C: PooledChannel = Channel> {
    idle: Pool<C>,
    capacity: usize,
}

impl<C: PooledChannel> Clone for ChannelPool<C> {
    fn clone(&self) -> Self {
        Self {
            idle: self.idle.clone(),
            capacity: self.capacity,
        }
    }
}

impl<C: PooledChannel> ChannelPool<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Pool::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle channels currently in the pool.
    pub fn idle(&self) -> usize {
        self.idle.status().size
    }

    /// Take an idle channel out of the pool, if any. Never waits.
    ///
    /// The channel might have been closed by the broker while idle: check [`PooledChannel::is_open`].
    pub fn try_checkout(&self) -> Option<C> {
        self.idle.try_get().ok().map(Object::take)
    }

    /// Hand a channel back to the pool. Never waits for room: a full pool closes the channel.
    pub async fn check_in(&self, channel: C) -> CheckIn {
        if !channel.is_open() {
            return CheckIn::Discarded;
        }
        match self.idle.try_add(channel) {
            Ok(()) => CheckIn::Pooled,
            Err((channel, _)) => {
                debug!(capacity = self.capacity, "Channel pool is full, closing channel");
                channel.close().await;
                CheckIn::Discarded
            }
        }
    }
}
