//! Main entry point for the orderflow service.
//!
//! This binary wires the configured bus transport and storage backend
//! into the order engine and consumes lifecycle events from the shared
//! domain exchange until interrupted.

use clap::Parser;
use orderflow_config::Config;
use orderflow_core::{EngineBuilder, EngineError, OrderEngine};
use std::path::PathBuf;

use orderflow_bus::implementations::memory::create_bus;
use orderflow_storage::implementations::file::create_repository as create_file_repository;
use orderflow_storage::implementations::memory::create_repository as create_memory_repository;

/// Command-line arguments for the orderflow service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the orderflow service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the order engine with all implementations
/// 5. Announces itself and runs until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args.config.to_string_lossy();
	let config = Config::from_file(&config_path).await?;
	tracing::info!(
		"Loaded configuration [{}.{}.{}]",
		config.service.domain,
		config.service.name,
		config.service.environment
	);

	let engine = build_engine(config)?;

	// Let the rest of the domain know this consumer is up. The transport
	// buffers the announcement until the connection is established.
	let beacon = serde_json::to_vec(&serde_json::json!({
		"service": engine.config().service.name,
		"environment": engine.config().service.environment,
	}))?;
	engine
		.publisher()
		.announce(&format!("{}.running", engine.config().service.name), beacon)
		.await?;

	engine
		.run(async {
			let _ = tokio::signal::ctrl_c().await;
			tracing::info!("Received interrupt signal");
		})
		.await?;

	tracing::info!("Stopped orderflow service");
	Ok(())
}

/// Builds the order engine with every shipped implementation registered.
fn build_engine(config: Config) -> Result<OrderEngine, EngineError> {
	EngineBuilder::new(config)
		.with_bus_factory("memory", create_bus)
		.with_repository_factory("file", create_file_repository)
		.with_repository_factory("memory", create_memory_repository)
		.build()
}

#[cfg(test)]
mod tests {
	use super::*;

	const TEST_CONFIG: &str = r#"
		[service]
		domain = "restaurant"
		name = "orders"
		environment = "test"

		[lifecycle]
		strict_sequencing = false
		max_in_flight = 4
		drain_timeout_seconds = 1

		[bus]
		primary = "memory"
		[bus.implementations.memory]

		[storage]
		primary = "memory"
		[storage.implementations.memory]
	"#;

	#[test]
	fn args_default_values() {
		let args = Args {
			config: PathBuf::from("config.toml"),
			log_level: "info".to_string(),
		};

		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn builds_engine_from_minimal_config() {
		let config: Config = TEST_CONFIG.parse().unwrap();
		let engine = build_engine(config).unwrap();
		assert_eq!(engine.topology().queue, "restaurant.orders.test.queue");
	}

	#[test]
	fn rejects_unknown_primary_backend() {
		let bad = TEST_CONFIG.replace("primary = \"memory\"", "primary = \"missing\"");
		assert!(bad.parse::<Config>().is_err());
	}
}
