//! Configuration module for the orderflow system.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! validates the values that compose broker names, since a malformed
//! exchange or queue name would silently split the topology.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for an orderflow service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service on the shared broker.
	pub service: ServiceConfig,
	/// Dispatcher behavior knobs.
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Configuration for the event bus transport.
	pub bus: BusConfig,
	/// Configuration for the order repository backend.
	pub storage: StorageConfig,
}

/// Identity of the service: the parts that compose exchange and queue names.
///
/// The exchange is `<domain>.<environment>` and the queue is
/// `<domain>.<service>.<environment>[.<instance>].queue`, so none of these
/// segments may be empty or contain a dot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Business domain shared by all collaborating services.
	pub domain: String,
	/// Name of this service within the domain.
	pub name: String,
	/// Deployment environment identifier, e.g. "dev" or "production".
	pub environment: String,
	/// Optional per-instance discriminator for instance-scoped queues.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instance: Option<String>,
}

/// Dispatcher behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
	/// Enforce the documented transition order instead of the permissive
	/// "anything non-terminal" default.
	#[serde(default)]
	pub strict_sequencing: bool,
	/// Maximum number of deliveries handled concurrently. Kept as `u32`
	/// so the drain permit count always equals the semaphore size.
	#[serde(default = "default_max_in_flight")]
	pub max_in_flight: u32,
	/// How long shutdown waits for in-flight handlers before giving up.
	#[serde(default = "default_drain_timeout_seconds")]
	pub drain_timeout_seconds: u64,
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			strict_sequencing: false,
			max_in_flight: default_max_in_flight(),
			drain_timeout_seconds: default_drain_timeout_seconds(),
		}
	}
}

fn default_max_in_flight() -> u32 {
	64
}

fn default_drain_timeout_seconds() -> u64 {
	10
}

/// Configuration for the event bus transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of bus implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
	/// Upper bound in seconds for connect retries before the process
	/// declares the broker unreachable.
	#[serde(default = "default_connect_timeout_seconds")]
	pub connect_timeout_seconds: u64,
}

fn default_connect_timeout_seconds() -> u64 {
	30
}

/// Configuration for the order repository backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of repository implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		for (label, value) in [
			("service.domain", &self.service.domain),
			("service.name", &self.service.name),
			("service.environment", &self.service.environment),
		] {
			validate_name_segment(label, value)?;
		}
		if let Some(instance) = &self.service.instance {
			validate_name_segment("service.instance", instance)?;
		}

		if self.lifecycle.max_in_flight == 0 {
			return Err(ConfigError::Validation(
				"lifecycle.max_in_flight must be at least 1".into(),
			));
		}

		if !self.bus.implementations.contains_key(&self.bus.primary) {
			return Err(ConfigError::Validation(format!(
				"bus.primary '{}' has no matching entry under bus.implementations",
				self.bus.primary
			)));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"storage.primary '{}' has no matching entry under storage.implementations",
				self.storage.primary
			)));
		}

		Ok(())
	}
}

fn validate_name_segment(label: &str, value: &str) -> Result<(), ConfigError> {
	if value.is_empty() {
		return Err(ConfigError::Validation(format!("{} must not be empty", label)));
	}
	if value.contains('.') {
		return Err(ConfigError::Validation(format!(
			"{} must not contain '.' (it composes broker names)",
			label
		)));
	}
	Ok(())
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: Config = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
		[service]
		domain = "restaurant"
		name = "orders"
		environment = "dev"

		[bus]
		primary = "memory"
		[bus.implementations.memory]

		[storage]
		primary = "memory"
		[storage.implementations.memory]
	"#;

	#[test]
	fn minimal_config_parses_with_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.domain, "restaurant");
		assert_eq!(config.lifecycle.max_in_flight, 64);
		assert!(!config.lifecycle.strict_sequencing);
		assert_eq!(config.bus.connect_timeout_seconds, 30);
	}

	#[test]
	fn dotted_segment_rejected() {
		let bad = MINIMAL.replace("\"orders\"", "\"orders.v2\"");
		let err = bad.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn primary_must_have_implementation_entry() {
		// Only the bus primary is renamed; its implementations table keeps
		// the old name, so validation must fail.
		let bad = MINIMAL.replacen("primary = \"memory\"", "primary = \"amqp\"", 1);
		let err = bad.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn zero_in_flight_rejected() {
		let bad = format!("{}\n[lifecycle]\nmax_in_flight = 0\n", MINIMAL);
		assert!(bad.parse::<Config>().is_err());
	}

	#[test]
	fn oversized_in_flight_rejected() {
		// Must fail at parse time rather than truncate later.
		let bad = format!("{}\n[lifecycle]\nmax_in_flight = 5000000000\n", MINIMAL);
		assert!(bad.parse::<Config>().is_err());
	}

	#[tokio::test]
	async fn loads_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, MINIMAL).unwrap();
		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.storage.primary, "memory");
	}
}
