mod client;
mod error;
mod mock;

pub use client::{Broker, RedisBroker};
pub use error::{QueueError, QueueResult};
pub use mock::MockBroker;
