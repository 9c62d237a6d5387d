//! Event bus adapter for the orderflow system.
//!
//! This module provides the abstraction over the shared message broker:
//! topology declaration (exchange, queue, bindings), fire-and-forget
//! publishing and manual-acknowledgment consumption. Transports are
//! pluggable behind the [`BusInterface`] trait; the in-process topic
//! exchange under `implementations` is the default and the test transport.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use orderflow_types::{ConfigSchema, EventKind, ImplementationRegistry};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during bus operations.
#[derive(Debug, Error)]
pub enum BusError {
	/// Error that occurs when the broker cannot be reached.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs on an established channel.
	#[error("Channel error: {0}")]
	Channel(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Resolution of a manually acknowledged delivery.
///
/// `Reject` is permanent: the message is not requeued. The policy is an
/// explicit enum so a dead-letter variant can be introduced without
/// changing the dispatcher contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
	/// Successfully handled (including benign no-ops).
	Ack,
	/// Permanently rejected, no redelivery.
	Reject,
}

/// A raw message delivered to a manual-acknowledgment consumer.
///
/// The handler must resolve every delivery exactly once via [`ack`] or
/// [`reject`]. A delivery dropped unresolved counts as rejected, so a
/// panicking handler can never wedge the queue.
///
/// [`ack`]: Delivery::ack
/// [`reject`]: Delivery::reject
pub struct Delivery {
	/// Routing key the message was published under.
	pub routing_key: String,
	/// Raw message body.
	pub body: Vec<u8>,
	acker: Option<Box<dyn FnOnce(AckOutcome) + Send>>,
}

impl Delivery {
	/// Creates a delivery whose resolution is reported through `acker`.
	pub fn new(
		routing_key: impl Into<String>,
		body: Vec<u8>,
		acker: impl FnOnce(AckOutcome) + Send + 'static,
	) -> Self {
		Self {
			routing_key: routing_key.into(),
			body,
			acker: Some(Box::new(acker)),
		}
	}

	/// Acknowledges the delivery as successfully handled.
	pub fn ack(mut self) {
		self.resolve(AckOutcome::Ack);
	}

	/// Permanently rejects the delivery (no requeue).
	pub fn reject(mut self) {
		self.resolve(AckOutcome::Reject);
	}

	fn resolve(&mut self, outcome: AckOutcome) {
		if let Some(acker) = self.acker.take() {
			acker(outcome);
		}
	}
}

impl Drop for Delivery {
	fn drop(&mut self) {
		self.resolve(AckOutcome::Reject);
	}
}

impl fmt::Debug for Delivery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Delivery")
			.field("routing_key", &self.routing_key)
			.field("body_len", &self.body.len())
			.field("resolved", &self.acker.is_none())
			.finish()
	}
}

/// Broker topology for one service on the shared domain exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
	/// Exchange name, `<domain>.<environment>`.
	pub exchange: String,
	/// Queue name, `<domain>.<service>.<environment>[.<instance>].queue`.
	pub queue: String,
	/// Routing keys the queue is bound to.
	pub bindings: Vec<String>,
}

impl Topology {
	/// Builds the standard order-lifecycle topology for a service.
	///
	/// The bindings are the fixed set of routing keys the order domain
	/// consumes.
	pub fn for_service(
		domain: &str,
		service: &str,
		environment: &str,
		instance: Option<&str>,
	) -> Self {
		let queue = match instance {
			Some(instance) => format!("{}.{}.{}.{}.queue", domain, service, environment, instance),
			None => format!("{}.{}.{}.queue", domain, service, environment),
		};
		Self {
			exchange: format!("{}.{}", domain, environment),
			queue,
			bindings: EventKind::consumed()
				.iter()
				.map(|kind| kind.routing_key().to_string())
				.collect(),
		}
	}
}

/// Trait defining the low-level interface for bus transports.
///
/// Implementations own one connection and one channel to the broker.
/// `declare` must be idempotent: repeated calls converge to the same
/// topology without error. `publish` is fire-and-forget with no delivery
/// confirmation; before the transport is ready it must buffer (or block),
/// never silently drop. Concurrent use of the channel is serialized
/// internally (single writer), so callers may share the transport freely.
#[async_trait]
pub trait BusInterface: Send + Sync {
	/// Returns the configuration schema for this transport.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Establishes the connection and channel. Idempotent.
	async fn connect(&self) -> Result<(), BusError>;

	/// Declares the exchange, queue and bindings. Idempotent.
	async fn declare(&self, topology: &Topology) -> Result<(), BusError>;

	/// Publishes a payload under the given routing key.
	async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), BusError>;

	/// Registers a manual-acknowledgment consumer on the queue.
	///
	/// The receiver yields raw deliveries with their routing key; channel
	/// closure signals connection loss.
	async fn subscribe(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, BusError>;
}

/// Type alias for bus transport factory functions.
pub type BusFactory = fn(&toml::Value) -> Result<Box<dyn BusInterface>, BusError>;

/// Registry trait for bus transport implementations.
pub trait BusRegistry: ImplementationRegistry<Factory = BusFactory> {}

/// Get all registered bus transport implementations.
pub fn get_all_implementations() -> Vec<(&'static str, BusFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// High-level bus service wrapping a transport.
///
/// Adds bounded reconnect-with-backoff on `connect`: transient broker
/// unavailability at startup is retried before being declared fatal.
pub struct BusService {
	backend: Box<dyn BusInterface>,
	connect_timeout: Duration,
}

impl BusService {
	/// Creates a new BusService over the given transport.
	pub fn new(backend: Box<dyn BusInterface>, connect_timeout: Duration) -> Self {
		Self {
			backend,
			connect_timeout,
		}
	}

	/// Connects, retrying with exponential backoff up to the configured
	/// timeout before reporting the broker as unreachable.
	pub async fn connect(&self) -> Result<(), BusError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.connect_timeout),
			..ExponentialBackoff::default()
		};

		backoff::future::retry(policy, || async {
			self.backend.connect().await.map_err(|e| {
				tracing::warn!(error = %e, "Broker not reachable, retrying");
				backoff::Error::transient(e)
			})
		})
		.await
	}

	/// Declares the given topology. Idempotent.
	pub async fn declare(&self, topology: &Topology) -> Result<(), BusError> {
		tracing::debug!(
			exchange = %topology.exchange,
			queue = %topology.queue,
			"Declaring topology"
		);
		self.backend.declare(topology).await
	}

	/// Publishes a payload under the given routing key. Fire-and-forget.
	pub async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), BusError> {
		self.backend.publish(routing_key, payload).await
	}

	/// Registers a manual-acknowledgment consumer on the queue.
	pub async fn subscribe(
		&self,
		queue: &str,
	) -> Result<mpsc::UnboundedReceiver<Delivery>, BusError> {
		self.backend.subscribe(queue).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[test]
	fn unresolved_delivery_counts_as_rejected() {
		let outcome = Arc::new(std::sync::Mutex::new(None));
		let recorded = outcome.clone();
		{
			let _delivery = Delivery::new("order.paid", vec![], move |o| {
				*recorded.lock().unwrap() = Some(o);
			});
		}
		assert_eq!(*outcome.lock().unwrap(), Some(AckOutcome::Reject));
	}

	#[test]
	fn delivery_resolves_exactly_once() {
		let count = Arc::new(AtomicUsize::new(0));
		let recorded = count.clone();
		let delivery = Delivery::new("order.paid", vec![], move |_| {
			recorded.fetch_add(1, Ordering::SeqCst);
		});
		delivery.ack();
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn topology_names() {
		let topology = Topology::for_service("restaurant", "orders", "dev", None);
		assert_eq!(topology.exchange, "restaurant.dev");
		assert_eq!(topology.queue, "restaurant.orders.dev.queue");
		assert!(topology.bindings.contains(&"order.created".to_string()));
		assert_eq!(topology.bindings.len(), 6);

		let scoped = Topology::for_service("restaurant", "orders", "dev", Some("a1"));
		assert_eq!(scoped.queue, "restaurant.orders.dev.a1.queue");
	}
}
