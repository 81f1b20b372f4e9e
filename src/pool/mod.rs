//! A bounded pool of idle publisher channels, built on [`deadpool`]'s unmanaged pool.
//!
//! The pool never blocks: checkout pops an idle channel if there is one, and handing a
//! channel back to a full pool closes it instead of queueing it.
//!
//! ```rust
//! use hutch::pool::ChannelPool;
//! use hutch::amqp::Channel;
//!
//! let pool: ChannelPool<Channel> = ChannelPool::new(50);
//! assert!(pool.try_checkout().is_none());
//! assert_eq!(pool.idle(), 0);
//! ```

mod channel;

pub use channel::{ChannelPool, CheckIn, PooledChannel};
