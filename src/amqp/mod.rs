//! Helpers for connecting to a rabbitmq broker and keeping that connection alive.

pub mod backoff;
pub mod configuration;
mod error;
mod factory;
mod supervisor;

pub use error::ConnectionError;
pub use factory::ConnectionFactory;
pub use supervisor::{ConnectionHandle, ConnectionSupervisor, ConnectionState};

pub use lapin::{options, types, BasicProperties, Channel, Connection};
