//! Event-driven engine for the order service.
//!
//! The engine owns the consume loop: it connects the bus, declares the
//! service topology, subscribes the queue and dispatches every delivery
//! to a handler on its own task, gated by a concurrency limit. Shutdown
//! stops intake first, then drains in-flight handlers up to a bounded
//! timeout.

use crate::commands::OrderCommands;
use crate::handlers::OrderHandler;
use crate::publish::EventPublisher;
use crate::state::TransitionPolicy;
use crate::EngineError;
use orderflow_bus::{BusService, Delivery, Topology};
use orderflow_config::Config;
use orderflow_storage::RepositoryService;
use orderflow_types::{EventEnvelope, EventKind};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// The order lifecycle engine.
///
/// Cheap to clone; clones share the underlying services.
#[derive(Clone)]
pub struct OrderEngine {
	config: Arc<Config>,
	repository: Arc<RepositoryService>,
	bus: Arc<BusService>,
	publisher: EventPublisher,
	handler: Arc<OrderHandler>,
	topology: Topology,
}

impl OrderEngine {
	/// Wires the engine from its services and configuration.
	pub fn new(config: Config, repository: Arc<RepositoryService>, bus: Arc<BusService>) -> Self {
		let topology = Topology::for_service(
			&config.service.domain,
			&config.service.name,
			&config.service.environment,
			config.service.instance.as_deref(),
		);
		let publisher = EventPublisher::new(bus.clone());
		let handler = Arc::new(OrderHandler::new(
			repository.clone(),
			publisher.clone(),
			TransitionPolicy {
				strict_sequencing: config.lifecycle.strict_sequencing,
			},
		));

		Self {
			config: Arc::new(config),
			repository,
			bus,
			publisher,
			handler,
			topology,
		}
	}

	/// The engine configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// The topology this engine declares and consumes from.
	pub fn topology(&self) -> &Topology {
		&self.topology
	}

	/// The order repository.
	pub fn repository(&self) -> &Arc<RepositoryService> {
		&self.repository
	}

	/// The outbound publisher.
	pub fn publisher(&self) -> &EventPublisher {
		&self.publisher
	}

	/// The local command surface.
	pub fn commands(&self) -> OrderCommands {
		OrderCommands::new(self.repository.clone(), self.publisher.clone())
	}

	/// Runs the consume loop until `shutdown` resolves or the broker
	/// connection is lost.
	///
	/// On shutdown the loop stops taking deliveries and waits for
	/// in-flight handlers up to the configured drain timeout; handlers
	/// still running after that are abandoned (their deliveries resolve
	/// as rejected when dropped).
	pub async fn run<S>(&self, shutdown: S) -> Result<(), EngineError>
	where
		S: Future<Output = ()>,
	{
		self.bus
			.connect()
			.await
			.map_err(|e| EngineError::Bus(e.to_string()))?;
		self.bus
			.declare(&self.topology)
			.await
			.map_err(|e| EngineError::Bus(e.to_string()))?;
		let mut deliveries = self
			.bus
			.subscribe(&self.topology.queue)
			.await
			.map_err(|e| EngineError::Bus(e.to_string()))?;

		tracing::info!(
			queue = %self.topology.queue,
			exchange = %self.topology.exchange,
			"Engine consuming"
		);

		let max_in_flight = self.config.lifecycle.max_in_flight;
		let semaphore = Arc::new(Semaphore::new(max_in_flight as usize));
		let mut shutdown = std::pin::pin!(shutdown);

		loop {
			tokio::select! {
				maybe_delivery = deliveries.recv() => {
					match maybe_delivery {
						Some(delivery) => self.spawn_handler(&semaphore, delivery).await,
						None => {
							return Err(EngineError::Bus(
								"Broker connection lost".to_string(),
							));
						},
					}
				},
				_ = &mut shutdown => {
					tracing::info!("Shutdown requested, draining in-flight handlers");
					break;
				},
			}
		}

		drop(deliveries);
		let drain = Duration::from_secs(self.config.lifecycle.drain_timeout_seconds);
		match tokio::time::timeout(drain, semaphore.acquire_many(max_in_flight)).await {
			Ok(Ok(_permits)) => tracing::info!("All in-flight handlers finished"),
			Ok(Err(_)) => {},
			Err(_) => {
				tracing::warn!(
					timeout_seconds = drain.as_secs(),
					"Drain timeout elapsed with handlers still in flight"
				);
			},
		}
		Ok(())
	}

	/// Spawns a handler task for one delivery, waiting for a concurrency
	/// permit first so a flood of deliveries cannot exhaust the runtime.
	async fn spawn_handler(&self, semaphore: &Arc<Semaphore>, delivery: Delivery) {
		let Ok(permit) = semaphore.clone().acquire_owned().await else {
			return;
		};
		let engine = self.clone();
		tokio::spawn(async move {
			engine.process_delivery(delivery).await;
			drop(permit);
		});
	}

	/// Parses, routes and acknowledges one delivery.
	///
	/// Acknowledgment policy: malformed payloads and handler failures
	/// reject (no requeue, the broker discards); everything else acks,
	/// including unknown event tags and benign no-ops.
	async fn process_delivery(&self, delivery: Delivery) {
		let envelope: EventEnvelope = match serde_json::from_slice(&delivery.body) {
			Ok(envelope) => envelope,
			Err(e) => {
				tracing::warn!(
					routing_key = %delivery.routing_key,
					error = %e,
					"Rejecting malformed message"
				);
				delivery.reject();
				return;
			},
		};

		if envelope.order_id().is_none() {
			tracing::warn!(
				event = %envelope.event,
				"Rejecting event without an order id"
			);
			delivery.reject();
			return;
		}

		let result = match EventKind::from_tag(&envelope.event) {
			None => {
				// Forward compatibility: unknown events are someone
				// else's, never a redelivery storm.
				tracing::warn!(event = %envelope.event, "Unknown event tag, ignoring");
				delivery.ack();
				return;
			},
			Some(EventKind::OrderCreated) => self.handler.handle_created(&envelope).await,
			Some(EventKind::OrderConfirmed) => {
				tracing::warn!(event = %envelope.event, "No handler for event, ignoring");
				delivery.ack();
				return;
			},
			Some(kind) => self.handler.handle_lifecycle(kind, &envelope).await,
		};

		match result {
			Ok(_) => delivery.ack(),
			Err(e) => {
				tracing::error!(event = %envelope.event, error = %e, "Handler failed");
				delivery.reject();
			},
		}
	}
}
