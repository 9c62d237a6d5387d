//! Order repository for the orderflow system.
//!
//! This module provides the durable-storage contract for order records:
//! idempotent creation, lookup, conditional (compare-and-set) state updates
//! and read-only listings. Backends are pluggable behind the
//! [`RepositoryInterface`] trait; the repository is the single source of
//! truth for order state — nothing in the pipeline caches it.

use async_trait::async_trait;
use orderflow_types::{ConfigSchema, ImplementationRegistry, Order, OrderState};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested record is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
	/// The record was inserted.
	Inserted,
	/// A record with this id already existed and was left untouched.
	AlreadyExists,
}

/// Trait defining the interface for order repository backends.
///
/// Implementations must make `create` idempotent on id and `update_state`
/// atomic with respect to concurrent callers: the update applies only if
/// the persisted state matches the expectation at the moment of the write.
#[async_trait]
pub trait RepositoryInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Inserts the order unless a record with its id already exists.
	/// A second create for the same id never overwrites or duplicates.
	async fn create(&self, order: &Order) -> Result<CreateOutcome, StorageError>;

	/// Looks up an order by id.
	async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StorageError>;

	/// Conditionally moves an order to `next`.
	///
	/// With `expected` set, the write applies only while the persisted
	/// state equals it; `None` applies unconditionally. Returns whether
	/// the update actually applied — a zero-match write is a normal
	/// outcome under concurrent transitions, not an error.
	async fn update_state(
		&self,
		id: &str,
		expected: Option<OrderState>,
		next: OrderState,
	) -> Result<bool, StorageError>;

	/// Lists orders that are not cancelled.
	async fn list_active(&self) -> Result<Vec<Order>, StorageError>;

	/// Lists every order.
	async fn list_all(&self) -> Result<Vec<Order>, StorageError>;
}

/// Type alias for repository backend factory functions.
pub type RepositoryFactory = fn(&toml::Value) -> Result<Box<dyn RepositoryInterface>, StorageError>;

/// Registry trait for repository implementations.
pub trait RepositoryRegistry: ImplementationRegistry<Factory = RepositoryFactory> {}

/// Get all registered repository implementations.
pub fn get_all_implementations() -> Vec<(&'static str, RepositoryFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level repository service wrapping a backend.
///
/// The service is the surface the rest of the system talks to; it adds
/// structured logging around mutations and keeps the backend boxed so the
/// composition root can select it from configuration.
pub struct RepositoryService {
	backend: Box<dyn RepositoryInterface>,
}

impl RepositoryService {
	/// Creates a new RepositoryService with the specified backend.
	pub fn new(backend: Box<dyn RepositoryInterface>) -> Self {
		Self { backend }
	}

	/// Inserts the order unless its id is already present.
	pub async fn create(&self, order: &Order) -> Result<CreateOutcome, StorageError> {
		let outcome = self.backend.create(order).await?;
		match outcome {
			CreateOutcome::Inserted => {
				tracing::debug!(order_id = %order.id, "Order stored");
			},
			CreateOutcome::AlreadyExists => {
				tracing::debug!(order_id = %order.id, "Order already stored, create ignored");
			},
		}
		Ok(outcome)
	}

	/// Looks up an order by id.
	pub async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StorageError> {
		self.backend.find_by_id(id).await
	}

	/// Conditionally moves an order to `next`. Returns whether it applied.
	pub async fn update_state(
		&self,
		id: &str,
		expected: Option<OrderState>,
		next: OrderState,
	) -> Result<bool, StorageError> {
		let applied = self.backend.update_state(id, expected, next).await?;
		if applied {
			tracing::debug!(order_id = %id, state = %next, "Order state updated");
		}
		Ok(applied)
	}

	/// Lists orders that are not cancelled.
	pub async fn list_active(&self) -> Result<Vec<Order>, StorageError> {
		self.backend.list_active().await
	}

	/// Lists every order.
	pub async fn list_all(&self) -> Result<Vec<Order>, StorageError> {
		self.backend.list_all().await
	}
}
