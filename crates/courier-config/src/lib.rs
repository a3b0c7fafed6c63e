//! Configuration module for the courier fulfillment system.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`, which are substituted before
//! parsing. Parsed configurations are validated before being handed out.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["queue.toml", "storage.toml"]` to pull in other files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

pub use loader::ConfigLoader;

use courier_types::SecretString;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
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
		// Keep the message only, the error's Display dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the courier service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance and shared secrets.
	pub service: ServiceConfig,
	/// Storage backend for orders, rider holds and catalog snapshots.
	pub storage: StorageConfig,
	/// Message broker used for payment and rider dispatch events.
	pub queue: QueueConfig,
	/// Realtime notification sink.
	pub notification: NotificationConfig,
	/// Fee schedule and payment window.
	#[serde(default)]
	pub pricing: PricingConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
	/// Key shared with the payment, rider and realtime services. Sent as the
	/// `x-internal-key` header on notifications and required on internal routes.
	pub internal_key: SecretString,
	/// ISO currency code reported to the payment service.
	#[serde(default = "default_currency")]
	pub currency: String,
}

fn default_currency() -> String {
	"INR".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds between sweeps of expired entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for the message broker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of queue implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Durable queue carrying payment outcome events.
	#[serde(default = "default_payment_queue")]
	pub payment_queue: String,
	/// Durable queue receiving orders that wait for a rider.
	#[serde(default = "default_rider_queue")]
	pub rider_queue: String,
}

fn default_payment_queue() -> String {
	"payment_queue".to_string()
}

fn default_rider_queue() -> String {
	"rider_queue".to_string()
}

/// Configuration for realtime notifications.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of notification implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Fee schedule, in whole currency units.
///
/// The defaults reproduce the platform's standard pricing, so omitting the
/// `[pricing]` section is the common case.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PricingConfig {
	/// Delivery fee charged below the free delivery threshold.
	#[serde(default = "default_delivery_fee")]
	pub delivery_fee: u64,
	/// Subtotal from which delivery is free.
	#[serde(default = "default_free_delivery_threshold")]
	pub free_delivery_threshold: u64,
	/// Flat platform fee added to every order.
	#[serde(default = "default_platform_fee")]
	pub platform_fee: u64,
	/// Rider payout per started kilometre.
	#[serde(default = "default_rider_rate_per_km")]
	pub rider_rate_per_km: u64,
	/// Minutes an unpaid order is kept before it expires.
	#[serde(default = "default_payment_window_minutes")]
	pub payment_window_minutes: u64,
}

impl Default for PricingConfig {
	fn default() -> Self {
		Self {
			delivery_fee: default_delivery_fee(),
			free_delivery_threshold: default_free_delivery_threshold(),
			platform_fee: default_platform_fee(),
			rider_rate_per_km: default_rider_rate_per_km(),
			payment_window_minutes: default_payment_window_minutes(),
		}
	}
}

fn default_delivery_fee() -> u64 {
	49
}

fn default_free_delivery_threshold() -> u64 {
	250
}

fn default_platform_fee() -> u64 {
	7
}

fn default_rider_rate_per_km() -> u64 {
	17
}

fn default_payment_window_minutes() -> u64 {
	15
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	5005
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable
/// `VAR_NAME`, or with `default_value` for `${VAR_NAME:-default_value}` when
/// the variable is unset.
///
/// Input strings are limited to 1MB to bound regex work.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Checks cross-field rules that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}
		if self.service.internal_key.is_empty() {
			return Err(ConfigError::Validation(
				"Service internal_key cannot be empty".into(),
			));
		}
		if self.service.currency.is_empty() {
			return Err(ConfigError::Validation(
				"Service currency cannot be empty".into(),
			));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		validate_primary("queue", &self.queue.primary, &self.queue.implementations)?;
		if self.queue.payment_queue.is_empty() || self.queue.rider_queue.is_empty() {
			return Err(ConfigError::Validation(
				"Queue names cannot be empty".into(),
			));
		}
		if self.queue.payment_queue == self.queue.rider_queue {
			return Err(ConfigError::Validation(format!(
				"payment_queue and rider_queue must differ (both are '{}')",
				self.queue.payment_queue
			)));
		}

		validate_primary(
			"notification",
			&self.notification.primary,
			&self.notification.implementations,
		)?;

		if self.pricing.payment_window_minutes == 0 {
			return Err(ConfigError::Validation(
				"Pricing payment_window_minutes must be greater than 0".into(),
			));
		}
		if self.pricing.payment_window_minutes > 1440 {
			return Err(ConfigError::Validation(
				"Pricing payment_window_minutes cannot exceed 1440 (24 hours)".into(),
			));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"API timeout_seconds must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating
/// the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
