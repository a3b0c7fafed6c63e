//! Realtime notification module for the courier fulfillment system.
//!
//! Notifications are fire-and-forget: a state transition that has been
//! committed is never undone because its notification could not be
//! delivered. [`NotificationService`] enforces this by logging delivery
//! failures instead of returning them.

use async_trait::async_trait;
use courier_types::{
	ConfigSchema, ImplementationRegistry, NotificationEvent, Room, SecretString,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod memory;
}

/// Errors that can occur while delivering notifications.
#[derive(Debug, Error)]
pub enum NotificationError {
	/// Request could not be sent.
	#[error("HTTP error: {0}")]
	Http(String),
	/// Realtime service answered with a non-success status.
	#[error("Realtime service rejected event with status {0}")]
	Rejected(u16),
	/// Invalid backend configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for notification sinks.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationInterface: Send + Sync {
	/// Delivers one event to its room.
	async fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for notification factory functions.
///
/// The second argument is the internal key used to authenticate with the
/// realtime service.
pub type NotificationFactory =
	fn(&toml::Value, &SecretString) -> Result<Box<dyn NotificationInterface>, NotificationError>;

/// Registry trait for notification implementations.
pub trait NotificationRegistry: ImplementationRegistry<Factory = NotificationFactory> {}

/// Get all registered notification implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, NotificationFactory)> {
	use implementations::{http, memory};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Notification service that never fails its caller.
pub struct NotificationService {
	backend: Box<dyn NotificationInterface>,
}

impl NotificationService {
	pub fn new(backend: Box<dyn NotificationInterface>) -> Self {
		Self { backend }
	}

	/// Emits `event` to `room`. Delivery failures are logged and swallowed.
	pub async fn notify(&self, event: &str, room: Room, payload: serde_json::Value) {
		let event = NotificationEvent::new(event, room, payload);
		match self.backend.emit(&event).await {
			Ok(()) => debug!(event = %event.event, room = %event.room, "Notification sent"),
			Err(e) => warn!(
				event = %event.event,
				room = %event.room,
				error = %e,
				"Failed to deliver notification"
			),
		}
	}
}
