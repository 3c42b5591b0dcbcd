//! Generic topic/handler event delivery (C6): an [`EventBus`] abstraction
//! plus an [`EventConsumer`] that drives a fixed handler list over a
//! topic with independent per-handler retry and dead-letter handoff.
//! Producers elsewhere in the workspace (the submitter's
//! `payment-completed` event, the dispatcher's dispatch events) depend on
//! this crate for the bus trait rather than the other way around, so
//! there is no dependency cycle back into the crates that publish events.

pub mod bus;
pub mod consumer;
pub mod handler;
pub mod message;

pub use bus::{EventBus, InProcessEventBus};
pub use consumer::{ConsumerConfig, EventConsumer};
pub use handler::Handler;
pub use message::{ErrorRecord, Message};
