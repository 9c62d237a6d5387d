//! In-memory repository backend.
//!
//! Stores order records in a HashMap behind a read-write lock. Conditional
//! updates run under the write lock, which makes the compare-and-set
//! atomic with respect to concurrent handlers in the same process.

use crate::{CreateOutcome, RepositoryInterface, StorageError};
use async_trait::async_trait;
use orderflow_types::{ConfigSchema, Order, OrderState, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory repository implementation.
///
/// Fast and persistence-free; the default for development and tests.
pub struct MemoryRepository {
	store: Arc<RwLock<HashMap<String, Order>>>,
}

impl MemoryRepository {
	/// Creates an empty repository.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RepositoryInterface for MemoryRepository {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryRepositorySchema)
	}

	async fn create(&self, order: &Order) -> Result<CreateOutcome, StorageError> {
		let mut store = self.store.write().await;
		if store.contains_key(&order.id) {
			return Ok(CreateOutcome::AlreadyExists);
		}
		store.insert(order.id.clone(), order.clone());
		Ok(CreateOutcome::Inserted)
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StorageError> {
		let store = self.store.read().await;
		Ok(store.get(id).cloned())
	}

	async fn update_state(
		&self,
		id: &str,
		expected: Option<OrderState>,
		next: OrderState,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		let Some(order) = store.get_mut(id) else {
			return Ok(false);
		};
		if let Some(expected) = expected {
			if order.state != expected {
				return Ok(false);
			}
		}
		order.state = next;
		Ok(true)
	}

	async fn list_active(&self) -> Result<Vec<Order>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.values()
			.filter(|order| order.state != OrderState::Cancelled)
			.cloned()
			.collect())
	}

	async fn list_all(&self) -> Result<Vec<Order>, StorageError> {
		let store = self.store.read().await;
		Ok(store.values().cloned().collect())
	}
}

/// Configuration schema for MemoryRepository.
pub struct MemoryRepositorySchema;

impl ConfigSchema for MemoryRepositorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No configuration required
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the in-memory backend.
pub struct Registry;

impl orderflow_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::RepositoryFactory;

	fn factory() -> Self::Factory {
		create_repository
	}
}

impl crate::RepositoryRegistry for Registry {}

/// Factory function to create an in-memory repository from configuration.
pub fn create_repository(
	_config: &toml::Value,
) -> Result<Box<dyn RepositoryInterface>, StorageError> {
	Ok(Box::new(MemoryRepository::new()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use orderflow_types::OrderDraft;

	fn order(id: &str, state: OrderState) -> Order {
		Order {
			id: id.into(),
			customer_id: "c1".into(),
			dish_id: None,
			items: vec!["soup".into()],
			total: 12.5,
			order_type: "dine-in".into(),
			released_on: Utc::now(),
			state,
		}
	}

	#[tokio::test]
	async fn create_is_idempotent_on_id() {
		let repo = MemoryRepository::new();
		assert_eq!(
			repo.create(&order("o1", OrderState::Created)).await.unwrap(),
			CreateOutcome::Inserted
		);
		// Second create with an advanced state must not reset the record.
		assert_eq!(
			repo.create(&order("o1", OrderState::Paid)).await.unwrap(),
			CreateOutcome::AlreadyExists
		);
		let stored = repo.find_by_id("o1").await.unwrap().unwrap();
		assert_eq!(stored.state, OrderState::Created);
	}

	#[tokio::test]
	async fn conditional_update_applies_only_on_match() {
		let repo = MemoryRepository::new();
		repo.create(&order("o1", OrderState::Created)).await.unwrap();

		assert!(repo
			.update_state("o1", Some(OrderState::Created), OrderState::Paid)
			.await
			.unwrap());
		// Same expectation again: zero-match, benign.
		assert!(!repo
			.update_state("o1", Some(OrderState::Created), OrderState::Paid)
			.await
			.unwrap());
		assert_eq!(
			repo.find_by_id("o1").await.unwrap().unwrap().state,
			OrderState::Paid
		);
	}

	#[tokio::test]
	async fn unconditional_update() {
		let repo = MemoryRepository::new();
		repo.create(&order("o1", OrderState::Created)).await.unwrap();
		assert!(repo
			.update_state("o1", None, OrderState::Ready)
			.await
			.unwrap());
		assert!(!repo
			.update_state("missing", None, OrderState::Ready)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn concurrent_cas_applies_once() {
		let repo = Arc::new(MemoryRepository::new());
		repo.create(&order("o1", OrderState::Created)).await.unwrap();

		let mut applied = 0;
		let mut tasks = Vec::new();
		for _ in 0..8 {
			let repo = repo.clone();
			tasks.push(tokio::spawn(async move {
				repo.update_state("o1", Some(OrderState::Created), OrderState::Paid)
					.await
					.unwrap()
			}));
		}
		for task in tasks {
			if task.await.unwrap() {
				applied += 1;
			}
		}
		assert_eq!(applied, 1);
	}

	#[tokio::test]
	async fn active_listing_excludes_cancelled() {
		let repo = MemoryRepository::new();
		repo.create(&order("o1", OrderState::Created)).await.unwrap();
		repo.create(&order("o2", OrderState::Cancelled)).await.unwrap();

		assert_eq!(repo.list_all().await.unwrap().len(), 2);
		let active = repo.list_active().await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].id, "o1");
	}

	#[tokio::test]
	async fn stores_draft_materialization() {
		let repo = MemoryRepository::new();
		let order = OrderDraft {
			customer_id: Some("c9".into()),
			..Default::default()
		}
		.into_order();
		repo.create(&order).await.unwrap();
		let stored = repo.find_by_id(&order.id).await.unwrap().unwrap();
		assert_eq!(stored.customer_id, "c9");
		assert_eq!(stored.state, OrderState::Created);
	}
}
