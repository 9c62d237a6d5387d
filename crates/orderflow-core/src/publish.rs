//! Outbound event publishing.
//!
//! Wraps the bus with envelope construction. Publishing is at-most-once:
//! a failed publish is reported to the caller and never retried, because
//! the state write it follows has already committed and a retry loop
//! could emit duplicates.

use orderflow_bus::BusService;
use orderflow_types::{Customer, EventEnvelope, EventKind};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
	/// Error that occurs when the envelope cannot be serialized.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs on the bus.
	#[error("Bus error: {0}")]
	Bus(String),
}

/// Publishes order events onto the shared exchange.
#[derive(Clone)]
pub struct EventPublisher {
	bus: Arc<BusService>,
}

impl EventPublisher {
	/// Creates a publisher over the given bus.
	pub fn new(bus: Arc<BusService>) -> Self {
		Self { bus }
	}

	/// Publishes an event envelope under the event's routing key.
	///
	/// `order` is relayed verbatim; derived events carry exactly the
	/// partial order the inbound event carried.
	pub async fn emit(
		&self,
		kind: EventKind,
		order: serde_json::Value,
		customer: Option<Customer>,
	) -> Result<(), PublishError> {
		let envelope = EventEnvelope::new(kind, order, customer);
		let payload = serde_json::to_vec(&envelope)
			.map_err(|e| PublishError::Serialization(e.to_string()))?;

		self.bus
			.publish(kind.routing_key(), payload)
			.await
			.map_err(|e| PublishError::Bus(e.to_string()))?;

		tracing::debug!(event = %kind, "Event published");
		Ok(())
	}

	/// Publishes a raw payload under an arbitrary routing key.
	///
	/// Used for out-of-band announcements such as the startup beacon.
	pub async fn announce(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), PublishError> {
		self.bus
			.publish(routing_key, payload)
			.await
			.map_err(|e| PublishError::Bus(e.to_string()))
	}
}
