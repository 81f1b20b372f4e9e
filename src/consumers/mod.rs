//! Facilities to consume messages from RabbitMq queues. Check out [`WorkerPoolManager`] as a
//! starting point.
pub use handler::{AsyncClosure, ClosureHandler, Handler};
pub use incoming_message::Delivery;
pub use worker_pool::{Subscription, WorkerPoolManager};

mod handler;
mod incoming_message;
mod worker;
mod worker_pool;
