//! Main entry point for the courier order service.
//!
//! The binary turns carts into orders, reconciles payment events from the
//! broker, walks orders through the restaurant and rider stages and serves
//! the order HTTP API. Storage, queue and notification backends are chosen
//! by configuration from the implementations linked in below.

use clap::Parser;
use courier_config::Config;
use courier_core::{CourierBuilder, CourierEngine, CourierFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod auth;
mod server;
#[cfg(test)]
mod test_support;

use courier_notify::implementations::http::create_notifier as create_http_notifier;
use courier_notify::implementations::memory::create_notifier as create_memory_notifier;
use courier_queue::implementations::amqp::create_queue as create_amqp_queue;
use courier_queue::implementations::memory::create_queue as create_memory_queue;
use courier_storage::implementations::file::create_storage as create_file_storage;
use courier_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the courier service.
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG wins over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started courier");

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(build_engine(config.clone()).await?);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let api_engine = Arc::clone(&engine);

			tokio::select! {
				result = engine.run() => {
					tracing::info!("Engine finished");
					result?;
				}
				result = server::start_server(api_config, api_engine) => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped courier");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};

    // Variant for notification factories that also take the internal key
    ($interface:path, $error:path, keyed, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value, &courier_types::SecretString) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Wires the linked-in backend implementations into a [`CourierEngine`].
async fn build_engine(config: Config) -> Result<CourierEngine, Box<dyn std::error::Error>> {
	let builder = CourierBuilder::new(config);

	let storage_factories = create_factory_map!(
		courier_storage::StorageInterface,
		courier_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let queue_factories = create_factory_map!(
		courier_queue::QueueInterface,
		courier_queue::QueueError,
		"amqp" => create_amqp_queue,
		"memory" => create_memory_queue,
	);

	let notification_factories = create_factory_map!(
		courier_notify::NotificationInterface,
		courier_notify::NotificationError,
		keyed,
		"http" => create_http_notifier,
		"memory" => create_memory_notifier,
	);

	let factories = CourierFactories {
		storage_factories,
		queue_factories,
		notification_factories,
	};

	Ok(builder.build(factories).await?)
}
