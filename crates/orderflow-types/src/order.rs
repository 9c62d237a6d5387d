//! Order records and lifecycle states.
//!
//! An order is created once and then mutated exclusively through validated
//! state transitions; no field other than `state` ever changes after the
//! record is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an order.
///
/// `Created` is the only initial state. `Completed`, `Cancelled` and
/// `Refunded` are terminal: once reached, no further transition applies.
/// States are stored and transmitted in their upper-case wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
	Created,
	Initialized,
	Paid,
	Ready,
	Completed,
	Cancelled,
	Refunded,
}

impl OrderState {
	/// Returns true for states that admit no further transition.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderState::Completed | OrderState::Cancelled | OrderState::Refunded
		)
	}
}

impl fmt::Display for OrderState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			OrderState::Created => "CREATED",
			OrderState::Initialized => "INITIALIZED",
			OrderState::Paid => "PAID",
			OrderState::Ready => "READY",
			OrderState::Completed => "COMPLETED",
			OrderState::Cancelled => "CANCELLED",
			OrderState::Refunded => "REFUNDED",
		};
		f.write_str(s)
	}
}

/// A persisted order record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Globally unique identifier, caller-supplied or generated on creation.
	pub id: String,
	/// Identifier of the customer that placed the order.
	#[serde(default)]
	pub customer_id: String,
	/// Identifier of the dish, when the order references one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dish_id: Option<String>,
	/// Ordered sequence of line items.
	#[serde(default)]
	pub items: Vec<String>,
	/// Total amount of the order.
	#[serde(default)]
	pub total: f64,
	/// Category tag, e.g. "dine-in" or "delivery".
	#[serde(rename = "type", default)]
	pub order_type: String,
	/// Timestamp of record creation.
	pub released_on: DateTime<Utc>,
	/// Current lifecycle state.
	pub state: OrderState,
}

/// Creation payload for an order.
///
/// Every field the caller may omit has a defined default, matching the
/// behavior of the create entry points: a missing id is generated, a
/// missing release timestamp becomes the record-creation time and a
/// missing state starts the lifecycle at `Created`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDraft {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dish_id: Option<String>,
	#[serde(default)]
	pub items: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total: Option<f64>,
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub order_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub released_on: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<OrderState>,
}

impl OrderDraft {
	/// Materializes the draft into a full order record, filling defaults.
	pub fn into_order(self) -> Order {
		Order {
			id: self
				.id
				.filter(|id| !id.is_empty())
				.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
			customer_id: self.customer_id.unwrap_or_default(),
			dish_id: self.dish_id,
			items: self.items,
			total: self.total.unwrap_or_default(),
			order_type: self.order_type.unwrap_or_default(),
			released_on: self.released_on.unwrap_or_else(Utc::now),
			state: self.state.unwrap_or(OrderState::Created),
		}
	}
}

/// Customer reference relayed alongside lifecycle events.
///
/// The pipeline never interprets customers beyond their id; any extra
/// fields present on the wire are carried through into derived events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
	pub id: String,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn draft_fills_defaults() {
		let order = OrderDraft {
			customer_id: Some("c1".into()),
			items: vec!["soup".into()],
			total: Some(12.5),
			order_type: Some("dine-in".into()),
			..Default::default()
		}
		.into_order();

		assert!(!order.id.is_empty());
		assert_eq!(order.state, OrderState::Created);
		assert_eq!(order.items, vec!["soup".to_string()]);
	}

	#[test]
	fn draft_keeps_supplied_id_and_state() {
		let order = OrderDraft {
			id: Some("o1".into()),
			state: Some(OrderState::Paid),
			..Default::default()
		}
		.into_order();

		assert_eq!(order.id, "o1");
		assert_eq!(order.state, OrderState::Paid);
	}

	#[test]
	fn state_wire_form_is_upper_case() {
		let json = serde_json::to_string(&OrderState::Created).unwrap();
		assert_eq!(json, "\"CREATED\"");
		let back: OrderState = serde_json::from_str("\"CANCELLED\"").unwrap();
		assert_eq!(back, OrderState::Cancelled);
	}

	#[test]
	fn terminal_states() {
		assert!(OrderState::Completed.is_terminal());
		assert!(OrderState::Cancelled.is_terminal());
		assert!(OrderState::Refunded.is_terminal());
		assert!(!OrderState::Paid.is_terminal());
	}
}
