//! Local command surface for the order service.
//!
//! These are the operations the owning service performs on its own
//! orders, as opposed to reacting to events from peers: creation (which
//! announces `order_created` to the rest of the domain), lookups, and
//! cancellation. Cancellation is a soft delete and is only legal while
//! the order has not progressed past its initial state.

use crate::publish::EventPublisher;
use orderflow_storage::{CreateOutcome, RepositoryService};
use orderflow_types::{EventKind, Order, OrderDraft, OrderState};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the command API.
#[derive(Debug, Error)]
pub enum CommandError {
	/// Error that occurs when the order does not exist.
	#[error("Order not found: {0}")]
	NotFound(String),
	/// Error that occurs when cancelling an order that already progressed.
	#[error("Order {0} cannot be cancelled in state {1}")]
	CancelRejected(String, OrderState),
	/// Error that occurs in the repository.
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<orderflow_storage::StorageError> for CommandError {
	fn from(e: orderflow_storage::StorageError) -> Self {
		CommandError::Storage(e.to_string())
	}
}

/// Command API over the order repository and publisher.
#[derive(Clone)]
pub struct OrderCommands {
	repository: Arc<RepositoryService>,
	publisher: EventPublisher,
}

impl OrderCommands {
	/// Creates a command surface over the given repository and publisher.
	pub fn new(repository: Arc<RepositoryService>, publisher: EventPublisher) -> Self {
		Self {
			repository,
			publisher,
		}
	}

	/// Creates an order and announces it to the domain.
	///
	/// The record is persisted before `order_created` goes out, so a
	/// consumer reacting to the announcement always finds the order.
	/// Re-creating an existing id returns the stored record unchanged
	/// and announces nothing.
	pub async fn create(&self, draft: OrderDraft) -> Result<Order, CommandError> {
		let order = draft.into_order();

		match self.repository.create(&order).await? {
			CreateOutcome::Inserted => {
				let payload = serde_json::to_value(&order)
					.map_err(|e| CommandError::Storage(e.to_string()))?;
				if let Err(e) = self.publisher.emit(EventKind::OrderCreated, payload, None).await {
					tracing::error!(order_id = %order.id, error = %e, "Failed to announce order creation");
				}
				tracing::info!(order_id = %order.id, "Order created");
				Ok(order)
			},
			CreateOutcome::AlreadyExists => self
				.repository
				.find_by_id(&order.id)
				.await?
				.ok_or_else(|| CommandError::NotFound(order.id.clone())),
		}
	}

	/// Looks up an order by id.
	pub async fn get(&self, id: &str) -> Result<Order, CommandError> {
		self.repository
			.find_by_id(id)
			.await?
			.ok_or_else(|| CommandError::NotFound(id.to_string()))
	}

	/// Lists orders that are not cancelled.
	pub async fn list_active(&self) -> Result<Vec<Order>, CommandError> {
		Ok(self.repository.list_active().await?)
	}

	/// Lists every order, cancelled included.
	pub async fn list_all(&self) -> Result<Vec<Order>, CommandError> {
		Ok(self.repository.list_all().await?)
	}

	/// Cancels an order that has not yet progressed.
	///
	/// Only legal while the order is still in its initial state; the
	/// write is conditional on that, so a payment racing the cancel
	/// cannot be silently discarded.
	pub async fn cancel(&self, id: &str) -> Result<Order, CommandError> {
		let order = self
			.repository
			.find_by_id(id)
			.await?
			.ok_or_else(|| CommandError::NotFound(id.to_string()))?;

		if order.state != OrderState::Created {
			return Err(CommandError::CancelRejected(id.to_string(), order.state));
		}

		let applied = self
			.repository
			.update_state(id, Some(OrderState::Created), OrderState::Cancelled)
			.await?;
		if !applied {
			// The order progressed between read and write.
			let current = self
				.repository
				.find_by_id(id)
				.await?
				.ok_or_else(|| CommandError::NotFound(id.to_string()))?;
			return Err(CommandError::CancelRejected(id.to_string(), current.state));
		}

		tracing::info!(order_id = %id, "Order cancelled");
		Ok(Order {
			state: OrderState::Cancelled,
			..order
		})
	}
}
