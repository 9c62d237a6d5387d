//! In-process bus transport.
//!
//! A direct-routing topic exchange living inside the process, standing in
//! for a networked broker in development and tests. Routing-key matching,
//! per-queue channels and manual-acknowledgment bookkeeping behave like the
//! real topology; delivery is at-least-once only across process restarts,
//! which this transport does not survive.

use crate::{AckOutcome, BusError, BusInterface, Delivery, Topology};
use async_trait::async_trait;
use orderflow_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

/// In-process topic exchange.
///
/// Clones share the same broker state, so a test can keep a handle for
/// inspecting acknowledgment outcomes while the service owns a boxed clone.
#[derive(Clone)]
pub struct MemoryBus {
	state: Arc<Mutex<BrokerState>>,
	outcomes: Arc<StdMutex<Vec<(String, AckOutcome)>>>,
}

#[derive(Default)]
struct BrokerState {
	ready: bool,
	exchange: Option<String>,
	queues: HashMap<String, QueueState>,
	/// Payloads published before `connect`; flushed on readiness.
	buffered: Vec<(String, Vec<u8>)>,
}

struct QueueState {
	bindings: HashSet<String>,
	tx: mpsc::UnboundedSender<Delivery>,
	rx: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl MemoryBus {
	/// Creates an empty broker with no declared topology.
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(BrokerState::default())),
			outcomes: Arc::new(StdMutex::new(Vec::new())),
		}
	}

	/// Snapshot of resolved acknowledgment outcomes, in resolution order.
	pub fn outcomes(&self) -> Vec<(String, AckOutcome)> {
		self.outcomes.lock().unwrap().clone()
	}

	fn route(&self, state: &BrokerState, routing_key: &str, payload: &[u8]) {
		for (queue, entry) in &state.queues {
			if !entry.bindings.contains(routing_key) {
				continue;
			}
			let ledger = self.outcomes.clone();
			let key = routing_key.to_string();
			let delivery = Delivery::new(routing_key, payload.to_vec(), move |outcome| {
				ledger.lock().unwrap().push((key, outcome));
			});
			if entry.tx.send(delivery).is_err() {
				tracing::debug!(queue = %queue, routing_key, "Consumer gone, message dropped");
			}
		}
	}
}

impl Default for MemoryBus {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl BusInterface for MemoryBus {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryBusSchema)
	}

	async fn connect(&self) -> Result<(), BusError> {
		let mut state = self.state.lock().await;
		if !state.ready {
			state.ready = true;
			let buffered = std::mem::take(&mut state.buffered);
			for (routing_key, payload) in buffered {
				self.route(&state, &routing_key, &payload);
			}
		}
		Ok(())
	}

	async fn declare(&self, topology: &Topology) -> Result<(), BusError> {
		let mut state = self.state.lock().await;
		state.exchange.get_or_insert_with(|| topology.exchange.clone());

		let entry = state
			.queues
			.entry(topology.queue.clone())
			.or_insert_with(|| {
				let (tx, rx) = mpsc::unbounded_channel();
				QueueState {
					bindings: HashSet::new(),
					tx,
					rx: Some(rx),
				}
			});
		// Re-declaration converges: bindings accumulate, nothing errors.
		entry
			.bindings
			.extend(topology.bindings.iter().cloned());
		Ok(())
	}

	async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), BusError> {
		let mut state = self.state.lock().await;
		if !state.ready {
			state.buffered.push((routing_key.to_string(), payload));
			return Ok(());
		}
		self.route(&state, routing_key, &payload);
		Ok(())
	}

	async fn subscribe(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, BusError> {
		let mut state = self.state.lock().await;
		let entry = state
			.queues
			.get_mut(queue)
			.ok_or_else(|| BusError::Channel(format!("Queue not declared: {}", queue)))?;
		entry
			.rx
			.take()
			.ok_or_else(|| BusError::Channel(format!("Queue already has a consumer: {}", queue)))
	}
}

/// Configuration schema for the in-process transport.
pub struct MemoryBusSchema;

impl ConfigSchema for MemoryBusSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No configuration required
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the in-process transport.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::BusFactory;

	fn factory() -> Self::Factory {
		create_bus
	}
}

impl crate::BusRegistry for Registry {}

/// Factory function to create an in-process bus from configuration.
pub fn create_bus(_config: &toml::Value) -> Result<Box<dyn BusInterface>, BusError> {
	Ok(Box::new(MemoryBus::new()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn topology(queue: &str, bindings: &[&str]) -> Topology {
		Topology {
			exchange: "restaurant.test".into(),
			queue: queue.into(),
			bindings: bindings.iter().map(|s| s.to_string()).collect(),
		}
	}

	#[tokio::test]
	async fn routes_by_binding() {
		let bus = MemoryBus::new();
		bus.connect().await.unwrap();
		bus.declare(&topology("q1", &["order.created"])).await.unwrap();
		let mut rx = bus.subscribe("q1").await.unwrap();

		bus.publish("order.created", b"a".to_vec()).await.unwrap();
		bus.publish("order.paid", b"b".to_vec()).await.unwrap();

		let delivery = rx.recv().await.unwrap();
		assert_eq!(delivery.routing_key, "order.created");
		assert_eq!(delivery.body, b"a");
		delivery.ack();
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn buffers_until_connected() {
		let bus = MemoryBus::new();
		bus.declare(&topology("q1", &["order.created"])).await.unwrap();
		let mut rx = bus.subscribe("q1").await.unwrap();

		// Published before readiness: must be held, not dropped.
		bus.publish("order.created", b"early".to_vec()).await.unwrap();
		assert!(rx.try_recv().is_err());

		bus.connect().await.unwrap();
		let delivery = rx.recv().await.unwrap();
		assert_eq!(delivery.body, b"early");
	}

	#[tokio::test]
	async fn declare_is_idempotent() {
		let bus = MemoryBus::new();
		bus.connect().await.unwrap();
		let t = topology("q1", &["order.created"]);
		bus.declare(&t).await.unwrap();
		bus.declare(&t).await.unwrap();
		let mut rx = bus.subscribe("q1").await.unwrap();

		bus.publish("order.created", b"once".to_vec()).await.unwrap();
		assert!(rx.recv().await.is_some());
		// Single queue, single delivery even after double declaration.
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn records_ack_outcomes() {
		let bus = MemoryBus::new();
		bus.connect().await.unwrap();
		bus.declare(&topology("q1", &["order.paid"])).await.unwrap();
		let mut rx = bus.subscribe("q1").await.unwrap();

		bus.publish("order.paid", b"x".to_vec()).await.unwrap();
		bus.publish("order.paid", b"y".to_vec()).await.unwrap();

		rx.recv().await.unwrap().ack();
		rx.recv().await.unwrap().reject();

		let outcomes = bus.outcomes();
		assert_eq!(
			outcomes,
			vec![
				("order.paid".to_string(), AckOutcome::Ack),
				("order.paid".to_string(), AckOutcome::Reject),
			]
		);
	}

	#[tokio::test]
	async fn subscribe_requires_declared_queue() {
		let bus = MemoryBus::new();
		bus.connect().await.unwrap();
		assert!(matches!(
			bus.subscribe("nope").await,
			Err(BusError::Channel(_))
		));
	}
}
