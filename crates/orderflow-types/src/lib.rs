//! Common types module for the orderflow system.
//!
//! This module defines the core data types and structures shared by all
//! orderflow components: the order record and its lifecycle states, the
//! event vocabulary and wire envelope, configuration validation utilities,
//! and the registry trait for pluggable implementations.

/// Event tags, routing keys and the wire envelope.
pub mod events;
/// Order records, lifecycle states and creation drafts.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use events::*;
pub use order::*;
pub use registry::*;
pub use validation::*;
