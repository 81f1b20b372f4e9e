//! `hutch` keeps a RabbitMq connection alive for the whole process and builds the two
//! things an application needs on top of it: a publisher backed by a pool of reusable
//! channels, and self-healing pools of consumer workers.
//!
//! [`Hutch`] wires everything together and is the best starting point:
//!
//! ```rust,no_run
//! use hutch::{amqp::configuration::RabbitMqSettings, consumers::{ClosureHandler, Delivery}, Hutch};
//!
//! async fn handle(delivery: &Delivery) {
//!     let _ = delivery.ack().await;
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let hutch = Hutch::start(RabbitMqSettings::from_env()?)?;
//! hutch.subscribe("orders", 3, ClosureHandler(handle));
//! assert!(hutch.send("orders", &serde_json::json!({ "id": 1 })).await);
//! # Ok(())
//! # }
//! ```

pub mod amqp;
pub mod consumers;
pub mod health;
pub mod pool;
pub mod publishers;

mod hutch;

pub use crate::hutch::Hutch;
pub use health::HealthStatus;
