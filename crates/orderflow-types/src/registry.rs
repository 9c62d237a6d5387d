//! Registry trait for self-registering implementations.
//!
//! Bus transports and repository backends register themselves under the
//! name used in configuration files together with a factory function, so
//! the composition root can select implementations purely from config.

/// Base trait for implementation registries.
///
/// Each implementation module must provide a `Registry` struct implementing
/// this trait, declaring its configuration name and factory function.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this
	/// implementation, e.g. "memory" for `bus.implementations.memory`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
