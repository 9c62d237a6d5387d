//! Event vocabulary and wire envelope.
//!
//! Order lifecycle services exchange UTF-8 JSON messages of the shape
//! `{"event": "<tag>", "object": {"order": {...}, "customer"?: {...}}}`.
//! The routing key used on the wire is the dot-separated form of the event
//! tag (`order_created` travels as `order.created`).

use crate::Customer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed enumeration of the known event tags.
///
/// The first six are consumed by the order service; `OrderConfirmed` is only
/// ever produced, as the derived event of a successful payment transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	OrderCreated,
	OrderInitialized,
	OrderPaid,
	OrderReady,
	OrderDelivered,
	OrderRefunded,
	OrderConfirmed,
}

impl EventKind {
	/// The underscore-form tag carried in the envelope body.
	pub fn tag(&self) -> &'static str {
		match self {
			EventKind::OrderCreated => "order_created",
			EventKind::OrderInitialized => "order_initialized",
			EventKind::OrderPaid => "order_paid",
			EventKind::OrderReady => "order_ready",
			EventKind::OrderDelivered => "order_delivered",
			EventKind::OrderRefunded => "order_refunded",
			EventKind::OrderConfirmed => "order_confirmed",
		}
	}

	/// The dot-form routing key used by the broker for queue delivery.
	pub fn routing_key(&self) -> &'static str {
		match self {
			EventKind::OrderCreated => "order.created",
			EventKind::OrderInitialized => "order.initialized",
			EventKind::OrderPaid => "order.paid",
			EventKind::OrderReady => "order.ready",
			EventKind::OrderDelivered => "order.delivered",
			EventKind::OrderRefunded => "order.refunded",
			EventKind::OrderConfirmed => "order.confirmed",
		}
	}

	/// Parses an envelope tag. Unknown tags yield `None`; callers must
	/// treat those as handled so future event types never cause
	/// redelivery storms.
	pub fn from_tag(tag: &str) -> Option<Self> {
		match tag {
			"order_created" => Some(EventKind::OrderCreated),
			"order_initialized" => Some(EventKind::OrderInitialized),
			"order_paid" => Some(EventKind::OrderPaid),
			"order_ready" => Some(EventKind::OrderReady),
			"order_delivered" => Some(EventKind::OrderDelivered),
			"order_refunded" => Some(EventKind::OrderRefunded),
			"order_confirmed" => Some(EventKind::OrderConfirmed),
			_ => None,
		}
	}

	/// The fixed set of routing keys the order service binds its queue to.
	pub const fn consumed() -> [EventKind; 6] {
		[
			EventKind::OrderCreated,
			EventKind::OrderPaid,
			EventKind::OrderInitialized,
			EventKind::OrderRefunded,
			EventKind::OrderReady,
			EventKind::OrderDelivered,
		]
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

/// Payload of an event envelope.
///
/// `order` is kept schemaless: transition events carry only a partial order
/// (at minimum `{"id": ...}`) and derived events must relay the inbound
/// partial verbatim, so typing it would lose fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventObject {
	pub order: serde_json::Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer: Option<Customer>,
}

/// A message on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
	/// Underscore-form event tag, e.g. `order_paid`.
	pub event: String,
	pub object: EventObject,
}

impl EventEnvelope {
	/// Builds an envelope for a known event kind.
	pub fn new(kind: EventKind, order: serde_json::Value, customer: Option<Customer>) -> Self {
		Self {
			event: kind.tag().to_string(),
			object: EventObject { order, customer },
		}
	}

	/// Extracts `object.order.id` when present and non-empty.
	///
	/// Every consumable event must reference an order by id; envelopes
	/// without one are rejected by the dispatcher.
	pub fn order_id(&self) -> Option<&str> {
		self.object
			.order
			.get("id")
			.and_then(|v| v.as_str())
			.filter(|id| !id.is_empty())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn tag_and_routing_key_agree() {
		for kind in EventKind::consumed() {
			assert_eq!(kind.routing_key(), kind.tag().replace('_', "."));
			assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
		}
	}

	#[test]
	fn unknown_tag_is_none() {
		assert_eq!(EventKind::from_tag("order_exploded"), None);
		assert_eq!(EventKind::from_tag(""), None);
	}

	#[test]
	fn envelope_round_trip() {
		let envelope = EventEnvelope::new(
			EventKind::OrderPaid,
			json!({"id": "o1"}),
			Some(Customer {
				id: "c1".into(),
				extra: serde_json::Map::new(),
			}),
		);
		let bytes = serde_json::to_vec(&envelope).unwrap();
		let parsed: EventEnvelope = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(parsed.event, "order_paid");
		assert_eq!(parsed.order_id(), Some("o1"));
		assert_eq!(parsed.object.customer.unwrap().id, "c1");
	}

	#[test]
	fn missing_or_empty_order_id() {
		let envelope: EventEnvelope =
			serde_json::from_value(json!({"event": "order_paid", "object": {"order": {}}}))
				.unwrap();
		assert_eq!(envelope.order_id(), None);

		let envelope: EventEnvelope = serde_json::from_value(
			json!({"event": "order_paid", "object": {"order": {"id": ""}}}),
		)
		.unwrap();
		assert_eq!(envelope.order_id(), None);
	}
}
