//! File-based repository backend.
//!
//! Stores one JSON document per order under a base directory, providing
//! simple persistence without an external database. Writes go through a
//! temp-file-then-rename step so a crash never leaves a half-written
//! record, and all mutations are serialized through an internal mutex so
//! the compare-and-set contract holds within the process. Multi-process
//! deployments need a backend with real transactional writes.

use crate::{CreateOutcome, RepositoryInterface, StorageError};
use async_trait::async_trait;
use orderflow_types::{
	ConfigSchema, Field, FieldType, Order, OrderState, Schema, ValidationError,
};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// File-based repository implementation.
pub struct FileRepository {
	/// Base directory for order documents.
	base_path: PathBuf,
	/// Serializes read-modify-write cycles.
	write_lock: Mutex<()>,
}

impl FileRepository {
	/// Creates a repository rooted at the given directory.
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Converts an order id to a filesystem-safe document path.
	fn document_path(&self, id: &str) -> PathBuf {
		let safe_id = id.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_id))
	}

	async fn read_document(&self, id: &str) -> Result<Option<Order>, StorageError> {
		let path = self.document_path(id);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		let order = serde_json::from_slice(&data)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok(Some(order))
	}

	async fn write_document(&self, order: &Order) -> Result<(), StorageError> {
		let path = self.document_path(&order.id);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let data = serde_json::to_vec(order)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn read_all(&self) -> Result<Vec<Order>, StorageError> {
		let mut orders = Vec::new();
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(orders),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => match serde_json::from_slice::<Order>(&data) {
					Ok(order) => orders.push(order),
					Err(e) => {
						tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable order document");
					},
				},
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable order document");
				},
			}
		}
		Ok(orders)
	}
}

#[async_trait]
impl RepositoryInterface for FileRepository {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileRepositorySchema)
	}

	async fn create(&self, order: &Order) -> Result<CreateOutcome, StorageError> {
		let _guard = self.write_lock.lock().await;
		if self.read_document(&order.id).await?.is_some() {
			return Ok(CreateOutcome::AlreadyExists);
		}
		self.write_document(order).await?;
		Ok(CreateOutcome::Inserted)
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StorageError> {
		self.read_document(id).await
	}

	async fn update_state(
		&self,
		id: &str,
		expected: Option<OrderState>,
		next: OrderState,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let Some(mut order) = self.read_document(id).await? else {
			return Ok(false);
		};
		if let Some(expected) = expected {
			if order.state != expected {
				return Ok(false);
			}
		}
		order.state = next;
		self.write_document(&order).await?;
		Ok(true)
	}

	async fn list_active(&self) -> Result<Vec<Order>, StorageError> {
		Ok(self
			.read_all()
			.await?
			.into_iter()
			.filter(|order| order.state != OrderState::Cancelled)
			.collect())
	}

	async fn list_all(&self) -> Result<Vec<Order>, StorageError> {
		self.read_all().await
	}
}

/// Configuration schema for FileRepository.
pub struct FileRepositorySchema;

impl ConfigSchema for FileRepositorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)])
			.validate(config)
	}
}

/// Registry for the file backend.
pub struct Registry;

impl orderflow_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::RepositoryFactory;

	fn factory() -> Self::Factory {
		create_repository
	}
}

impl crate::RepositoryRegistry for Registry {}

/// Factory function to create a file repository from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory for order documents
///   (default: "./data/orders")
pub fn create_repository(
	config: &toml::Value,
) -> Result<Box<dyn RepositoryInterface>, StorageError> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/orders")
		.to_string();

	Ok(Box::new(FileRepository::new(PathBuf::from(storage_path))))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	fn order(id: &str, state: OrderState) -> Order {
		Order {
			id: id.into(),
			customer_id: "c1".into(),
			dish_id: None,
			items: vec![],
			total: 0.0,
			order_type: "delivery".into(),
			released_on: Utc::now(),
			state,
		}
	}

	#[tokio::test]
	async fn create_find_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileRepository::new(dir.path().to_path_buf());

		assert_eq!(
			repo.create(&order("o1", OrderState::Created)).await.unwrap(),
			CreateOutcome::Inserted
		);
		assert_eq!(
			repo.create(&order("o1", OrderState::Paid)).await.unwrap(),
			CreateOutcome::AlreadyExists
		);

		let stored = repo.find_by_id("o1").await.unwrap().unwrap();
		assert_eq!(stored.state, OrderState::Created);
		assert!(repo.find_by_id("o2").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn conditional_update_and_listing() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileRepository::new(dir.path().to_path_buf());
		repo.create(&order("o1", OrderState::Created)).await.unwrap();
		repo.create(&order("o2", OrderState::Created)).await.unwrap();

		assert!(repo
			.update_state("o2", Some(OrderState::Created), OrderState::Cancelled)
			.await
			.unwrap());
		assert!(!repo
			.update_state("o2", Some(OrderState::Created), OrderState::Paid)
			.await
			.unwrap());

		assert_eq!(repo.list_all().await.unwrap().len(), 2);
		let active = repo.list_active().await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].id, "o1");
	}

	#[tokio::test]
	async fn sanitizes_hostile_ids() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileRepository::new(dir.path().to_path_buf());
		repo.create(&order("../escape", OrderState::Created))
			.await
			.unwrap();
		let stored = repo.find_by_id("../escape").await.unwrap().unwrap();
		assert_eq!(stored.id, "../escape");
		// Document stayed inside the base directory.
		assert!(dir.path().join(".._escape.json").exists());
	}
}
