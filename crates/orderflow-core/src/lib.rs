//! Core orchestration for the orderflow system.
//!
//! Wires configuration-selected bus and storage backends into the
//! [`OrderEngine`], which consumes lifecycle events from the shared
//! exchange, runs them through the order state machine and publishes
//! derived events. The [`OrderCommands`] surface covers the operations
//! the service performs on its own orders.

use orderflow_bus::{BusFactory, BusService};
use orderflow_config::Config;
use orderflow_storage::{RepositoryFactory, RepositoryService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod commands;
pub mod engine;
pub mod handlers;
pub mod publish;
pub mod state;

pub use commands::{CommandError, OrderCommands};
pub use engine::OrderEngine;
pub use handlers::{HandlerError, HandlerOutcome, OrderHandler};
pub use publish::{EventPublisher, PublishError};
pub use state::{transition, Decision, IgnoreReason, TransitionPolicy};

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	/// Error that occurs during configuration or wiring.
	#[error("Configuration error: {0}")]
	Config(String),
	/// Error that occurs on the bus.
	#[error("Bus error: {0}")]
	Bus(String),
	/// Error that occurs in storage.
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Shortens long identifiers for log fields.
pub(crate) fn truncate_id(id: &str) -> String {
	if id.len() > 12 {
		format!("{}..{}", &id[..6], &id[id.len() - 4..])
	} else {
		id.to_string()
	}
}

/// Builder that assembles an [`OrderEngine`] from configuration and
/// registered backend factories.
pub struct EngineBuilder {
	config: Config,
	bus_factories: HashMap<String, BusFactory>,
	repository_factories: HashMap<String, RepositoryFactory>,
}

impl EngineBuilder {
	/// Creates a builder with no factories registered.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			bus_factories: HashMap::new(),
			repository_factories: HashMap::new(),
		}
	}

	/// Registers every backend shipped with the workspace.
	pub fn with_default_factories(mut self) -> Self {
		for (name, factory) in orderflow_bus::get_all_implementations() {
			self.bus_factories.insert(name.to_string(), factory);
		}
		for (name, factory) in orderflow_storage::get_all_implementations() {
			self.repository_factories.insert(name.to_string(), factory);
		}
		self
	}

	/// Registers a bus transport factory under a name.
	pub fn with_bus_factory(mut self, name: &str, factory: BusFactory) -> Self {
		self.bus_factories.insert(name.to_string(), factory);
		self
	}

	/// Registers a repository backend factory under a name.
	pub fn with_repository_factory(mut self, name: &str, factory: RepositoryFactory) -> Self {
		self.repository_factories.insert(name.to_string(), factory);
		self
	}

	/// Instantiates the configured backends and wires the engine.
	///
	/// Each backend's configuration section is validated against the
	/// schema the backend itself declares.
	pub fn build(self) -> Result<OrderEngine, EngineError> {
		let bus_name = &self.config.bus.primary;
		let bus_config = self
			.config
			.bus
			.implementations
			.get(bus_name)
			.ok_or_else(|| {
				EngineError::Config(format!("No configuration for bus '{}'", bus_name))
			})?;
		let bus_factory = self.bus_factories.get(bus_name).ok_or_else(|| {
			EngineError::Config(format!("No factory registered for bus '{}'", bus_name))
		})?;
		let bus_backend =
			bus_factory(bus_config).map_err(|e| EngineError::Bus(e.to_string()))?;
		bus_backend
			.config_schema()
			.validate(bus_config)
			.map_err(|e| EngineError::Config(format!("Bus '{}': {}", bus_name, e)))?;
		tracing::info!(implementation = %bus_name, "Loaded bus transport");

		let storage_name = &self.config.storage.primary;
		let storage_config = self
			.config
			.storage
			.implementations
			.get(storage_name)
			.ok_or_else(|| {
				EngineError::Config(format!("No configuration for storage '{}'", storage_name))
			})?;
		let repository_factory = self.repository_factories.get(storage_name).ok_or_else(|| {
			EngineError::Config(format!(
				"No factory registered for storage '{}'",
				storage_name
			))
		})?;
		let repository_backend = repository_factory(storage_config)
			.map_err(|e| EngineError::Storage(e.to_string()))?;
		repository_backend
			.config_schema()
			.validate(storage_config)
			.map_err(|e| EngineError::Config(format!("Storage '{}': {}", storage_name, e)))?;
		tracing::info!(implementation = %storage_name, "Loaded storage backend");

		let bus = Arc::new(BusService::new(
			bus_backend,
			Duration::from_secs(self.config.bus.connect_timeout_seconds),
		));
		let repository = Arc::new(RepositoryService::new(repository_backend));

		Ok(OrderEngine::new(self.config, repository, bus))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
		[service]
		domain = "restaurant"
		name = "orders"
		environment = "test"

		[bus]
		primary = "memory"
		[bus.implementations.memory]

		[storage]
		primary = "memory"
		[storage.implementations.memory]
	"#;

	#[test]
	fn builds_from_default_factories() {
		let config: Config = CONFIG.parse().unwrap();
		let engine = EngineBuilder::new(config)
			.with_default_factories()
			.build()
			.unwrap();
		assert_eq!(engine.topology().exchange, "restaurant.test");
		assert_eq!(engine.topology().queue, "restaurant.orders.test.queue");
	}

	#[test]
	fn unknown_backend_is_a_config_error() {
		let config: Config = CONFIG.parse().unwrap();
		let result = EngineBuilder::new(config).build();
		assert!(matches!(result, Err(EngineError::Config(_))));
	}

	#[test]
	fn truncates_long_ids_only() {
		assert_eq!(truncate_id("o1"), "o1");
		assert_eq!(
			truncate_id("9b2f6c1e-aaaa-bbbb-cccc-000011112222"),
			"9b2f6c..2222"
		);
	}
}
