//! HTTP notification backend.
//!
//! Posts `{event, room, payload}` to the realtime service's internal emit
//! endpoint, authenticated with the shared internal key.

use crate::{NotificationError, NotificationInterface};
use async_trait::async_trait;
use courier_types::{
	ConfigSchema, Field, FieldType, NotificationEvent, Schema, SecretString, ValidationError,
};
use std::time::Duration;

/// Header carrying the shared internal key.
pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

const EMIT_PATH: &str = "/api/v1/internal/emit";
const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Realtime service client.
pub struct HttpNotifier {
	client: reqwest::Client,
	endpoint: String,
	internal_key: SecretString,
}

impl HttpNotifier {
	pub fn new(
		base_url: &str,
		timeout: Duration,
		internal_key: SecretString,
	) -> Result<Self, NotificationError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.pool_idle_timeout(Duration::from_secs(90))
			.build()
			.map_err(|e| NotificationError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			endpoint: format!("{}{}", base_url.trim_end_matches('/'), EMIT_PATH),
			internal_key,
		})
	}
}

#[async_trait]
impl NotificationInterface for HttpNotifier {
	async fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
		let response = self
			.client
			.post(&self.endpoint)
			.header(INTERNAL_KEY_HEADER, self.internal_key.expose_secret())
			.json(event)
			.send()
			.await
			.map_err(|e| NotificationError::Http(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(NotificationError::Rejected(status.as_u16()));
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpNotifierSchema)
	}
}

/// Configuration schema for HttpNotifier.
pub struct HttpNotifierSchema;

impl ConfigSchema for HttpNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("url must start with http:// or https://".to_string()),
				}
			})],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(60),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP notifier from configuration.
///
/// Configuration parameters:
/// - `url`: base URL of the realtime service
/// - `timeout_seconds`: per-request timeout (default: 5)
pub fn create_notifier(
	config: &toml::Value,
	internal_key: &SecretString,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	HttpNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotificationError::Configuration("url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok())
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(HttpNotifier::new(
		url,
		Duration::from_secs(timeout),
		internal_key.clone(),
	)?))
}

/// Registry for the HTTP notification implementation.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotificationRegistry for Registry {}
