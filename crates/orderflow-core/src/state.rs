//! Order lifecycle state machine.
//!
//! A pure transition table: given the persisted state and an inbound
//! lifecycle event, it decides the next state, whether a derived event
//! must be published, or why the event is a no-op. The table never
//! touches storage — handlers pair a decision with a conditional write
//! keyed on the state the decision was computed from.

use once_cell::sync::Lazy;
use orderflow_types::{EventKind, OrderState};
use std::collections::HashMap;
use std::fmt;

/// Sequencing policy for lifecycle transitions.
///
/// Permissive mode accepts any non-terminal, non-duplicate transition so
/// reordered deliveries still converge. Strict mode additionally requires
/// the persisted state to be one of the expected predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionPolicy {
	pub strict_sequencing: bool,
}

/// Why an event produced no state change. All of these acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
	/// The order is in a terminal state; nothing moves it again.
	Terminal,
	/// The order is already in the target state. Suppressing the apply
	/// here is what keeps a replayed `order_paid` from emitting a second
	/// `order_confirmed`.
	AlreadyApplied,
	/// Strict sequencing rejected the predecessor state.
	OutOfSequence,
	/// The event does not drive a state transition at all.
	NoTransition,
}

impl fmt::Display for IgnoreReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let reason = match self {
			IgnoreReason::Terminal => "order in terminal state",
			IgnoreReason::AlreadyApplied => "transition already applied",
			IgnoreReason::OutOfSequence => "out-of-sequence event",
			IgnoreReason::NoTransition => "event drives no transition",
		};
		f.write_str(reason)
	}
}

/// Outcome of evaluating an event against the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	/// Move the order to `next`; publish `derived` if set, after the
	/// state write has applied.
	Apply {
		next: OrderState,
		derived: Option<EventKind>,
	},
	/// Leave the order untouched and acknowledge.
	Ignore(IgnoreReason),
}

struct Rule {
	next: OrderState,
	derived: Option<EventKind>,
	/// Predecessors accepted under strict sequencing.
	strict_from: &'static [OrderState],
}

static TRANSITIONS: Lazy<HashMap<EventKind, Rule>> = Lazy::new(|| {
	HashMap::from([
		(
			EventKind::OrderInitialized,
			Rule {
				next: OrderState::Initialized,
				derived: None,
				strict_from: &[OrderState::Created],
			},
		),
		(
			EventKind::OrderPaid,
			Rule {
				next: OrderState::Paid,
				derived: Some(EventKind::OrderConfirmed),
				strict_from: &[OrderState::Created, OrderState::Initialized],
			},
		),
		(
			EventKind::OrderReady,
			Rule {
				next: OrderState::Ready,
				derived: None,
				strict_from: &[OrderState::Paid],
			},
		),
		(
			EventKind::OrderDelivered,
			Rule {
				next: OrderState::Completed,
				derived: None,
				strict_from: &[OrderState::Ready],
			},
		),
		(
			EventKind::OrderRefunded,
			Rule {
				next: OrderState::Refunded,
				derived: None,
				strict_from: &[OrderState::Paid, OrderState::Ready],
			},
		),
	])
});

/// Evaluates one lifecycle event against the persisted state.
pub fn transition(current: OrderState, event: EventKind, policy: TransitionPolicy) -> Decision {
	let Some(rule) = TRANSITIONS.get(&event) else {
		return Decision::Ignore(IgnoreReason::NoTransition);
	};
	if current.is_terminal() {
		return Decision::Ignore(IgnoreReason::Terminal);
	}
	if current == rule.next {
		return Decision::Ignore(IgnoreReason::AlreadyApplied);
	}
	if policy.strict_sequencing && !rule.strict_from.contains(&current) {
		return Decision::Ignore(IgnoreReason::OutOfSequence);
	}
	Decision::Apply {
		next: rule.next,
		derived: rule.derived,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const PERMISSIVE: TransitionPolicy = TransitionPolicy {
		strict_sequencing: false,
	};
	const STRICT: TransitionPolicy = TransitionPolicy {
		strict_sequencing: true,
	};

	#[test]
	fn paid_derives_confirmed() {
		assert_eq!(
			transition(OrderState::Created, EventKind::OrderPaid, PERMISSIVE),
			Decision::Apply {
				next: OrderState::Paid,
				derived: Some(EventKind::OrderConfirmed),
			}
		);
	}

	#[test]
	fn only_payment_derives_an_event() {
		for kind in [
			EventKind::OrderInitialized,
			EventKind::OrderReady,
			EventKind::OrderDelivered,
			EventKind::OrderRefunded,
		] {
			match transition(OrderState::Created, kind, PERMISSIVE) {
				Decision::Apply { derived, .. } => assert_eq!(derived, None),
				Decision::Ignore(_) => {},
			}
		}
	}

	#[test]
	fn terminal_states_are_frozen() {
		for terminal in [
			OrderState::Completed,
			OrderState::Cancelled,
			OrderState::Refunded,
		] {
			assert_eq!(
				transition(terminal, EventKind::OrderPaid, PERMISSIVE),
				Decision::Ignore(IgnoreReason::Terminal)
			);
		}
	}

	#[test]
	fn duplicate_transition_is_already_applied() {
		assert_eq!(
			transition(OrderState::Paid, EventKind::OrderPaid, PERMISSIVE),
			Decision::Ignore(IgnoreReason::AlreadyApplied)
		);
		// Terminal check wins over duplicate detection.
		assert_eq!(
			transition(OrderState::Refunded, EventKind::OrderRefunded, PERMISSIVE),
			Decision::Ignore(IgnoreReason::Terminal)
		);
	}

	#[test]
	fn permissive_accepts_reordered_events() {
		assert_eq!(
			transition(OrderState::Created, EventKind::OrderDelivered, PERMISSIVE),
			Decision::Apply {
				next: OrderState::Completed,
				derived: None,
			}
		);
		// Backwards movement is also tolerated; storage convergence is
		// handled by the conditional write, not the table.
		assert_eq!(
			transition(OrderState::Ready, EventKind::OrderInitialized, PERMISSIVE),
			Decision::Apply {
				next: OrderState::Initialized,
				derived: None,
			}
		);
	}

	#[test]
	fn strict_rejects_out_of_sequence() {
		assert_eq!(
			transition(OrderState::Created, EventKind::OrderDelivered, STRICT),
			Decision::Ignore(IgnoreReason::OutOfSequence)
		);
		assert_eq!(
			transition(OrderState::Created, EventKind::OrderReady, STRICT),
			Decision::Ignore(IgnoreReason::OutOfSequence)
		);
		// The legal chain still flows.
		assert_eq!(
			transition(OrderState::Initialized, EventKind::OrderPaid, STRICT),
			Decision::Apply {
				next: OrderState::Paid,
				derived: Some(EventKind::OrderConfirmed),
			}
		);
		assert_eq!(
			transition(OrderState::Paid, EventKind::OrderRefunded, STRICT),
			Decision::Apply {
				next: OrderState::Refunded,
				derived: None,
			}
		);
	}

	#[test]
	fn non_transition_events_are_ignored() {
		assert_eq!(
			transition(OrderState::Created, EventKind::OrderCreated, PERMISSIVE),
			Decision::Ignore(IgnoreReason::NoTransition)
		);
		assert_eq!(
			transition(OrderState::Paid, EventKind::OrderConfirmed, PERMISSIVE),
			Decision::Ignore(IgnoreReason::NoTransition)
		);
	}
}
