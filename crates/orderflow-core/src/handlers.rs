//! Inbound event handlers.
//!
//! One handler per event family: creation materializes a record,
//! lifecycle events run the state machine and pair its decision with a
//! conditional write keyed on the observed state. Handlers return an
//! outcome for the dispatcher to acknowledge on; only infrastructure
//! failures surface as errors (and reject the delivery).

use crate::publish::EventPublisher;
use crate::state::{transition, Decision, TransitionPolicy};
use crate::truncate_id;
use orderflow_storage::{CreateOutcome, RepositoryService};
use orderflow_types::{EventEnvelope, EventKind, OrderDraft, OrderState};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while handling an event.
#[derive(Debug, Error)]
pub enum HandlerError {
	/// Error that occurs when the envelope payload is unusable.
	#[error("Envelope error: {0}")]
	Envelope(String),
	/// Error that occurs in the repository.
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<orderflow_storage::StorageError> for HandlerError {
	fn from(e: orderflow_storage::StorageError) -> Self {
		HandlerError::Storage(e.to_string())
	}
}

/// What a handler did with an event. Every outcome acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
	/// A new order record was stored.
	Created,
	/// The order moved to the given state.
	Applied(OrderState),
	/// Nothing changed; duplicate, stale, unknown order, or lost race.
	NoOp,
}

/// Handles the order event family.
pub struct OrderHandler {
	repository: Arc<RepositoryService>,
	publisher: EventPublisher,
	policy: TransitionPolicy,
}

impl OrderHandler {
	/// Creates a handler over the given repository and publisher.
	pub fn new(
		repository: Arc<RepositoryService>,
		publisher: EventPublisher,
		policy: TransitionPolicy,
	) -> Self {
		Self {
			repository,
			publisher,
			policy,
		}
	}

	/// Materializes an order record from an `order_created` event.
	///
	/// Replays are benign: an existing record is left untouched.
	#[instrument(skip_all, fields(order_id = %truncate_id(envelope.order_id().unwrap_or(""))))]
	pub async fn handle_created(
		&self,
		envelope: &EventEnvelope,
	) -> Result<HandlerOutcome, HandlerError> {
		let draft: OrderDraft = serde_json::from_value(envelope.object.order.clone())
			.map_err(|e| HandlerError::Envelope(e.to_string()))?;
		let order = draft.into_order();

		match self.repository.create(&order).await? {
			CreateOutcome::Inserted => {
				tracing::info!(state = %order.state, "Order record created");
				Ok(HandlerOutcome::Created)
			},
			CreateOutcome::AlreadyExists => {
				tracing::info!("Order already exists, creation replay ignored");
				Ok(HandlerOutcome::NoOp)
			},
		}
	}

	/// Runs a lifecycle event through the state machine.
	///
	/// The state write is conditional on the state the decision was
	/// computed from, so concurrent duplicates apply at most once. The
	/// derived event (payment confirmation) goes out only after the write
	/// has applied, relaying the inbound partial order and customer.
	#[instrument(skip_all, fields(event = %kind, order_id = %truncate_id(envelope.order_id().unwrap_or(""))))]
	pub async fn handle_lifecycle(
		&self,
		kind: EventKind,
		envelope: &EventEnvelope,
	) -> Result<HandlerOutcome, HandlerError> {
		let id = envelope
			.order_id()
			.ok_or_else(|| HandlerError::Envelope("missing order id".to_string()))?;

		let Some(order) = self.repository.find_by_id(id).await? else {
			tracing::warn!("Event references an unknown order, ignoring");
			return Ok(HandlerOutcome::NoOp);
		};

		match transition(order.state, kind, self.policy) {
			Decision::Ignore(reason) => {
				tracing::info!(state = %order.state, %reason, "Event ignored");
				Ok(HandlerOutcome::NoOp)
			},
			Decision::Apply { next, derived } => {
				let applied = self
					.repository
					.update_state(id, Some(order.state), next)
					.await?;
				if !applied {
					tracing::info!(state = %order.state, "Lost transition race, ignoring");
					return Ok(HandlerOutcome::NoOp);
				}

				if let Some(derived) = derived {
					// At-most-once: the transition is committed either way.
					if let Err(e) = self
						.publisher
						.emit(
							derived,
							envelope.object.order.clone(),
							envelope.object.customer.clone(),
						)
						.await
					{
						tracing::error!(error = %e, event = %derived, "Failed to publish derived event");
					}
				}

				tracing::info!(from = %order.state, to = %next, "Order state transitioned");
				Ok(HandlerOutcome::Applied(next))
			},
		}
	}
}
