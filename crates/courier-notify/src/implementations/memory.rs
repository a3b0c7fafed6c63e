//! In-memory notification backend that records every emitted event.
//!
//! Useful for local runs without a realtime service and as a test fixture.

use crate::{NotificationError, NotificationInterface};
use async_trait::async_trait;
use courier_types::{ConfigSchema, NotificationEvent, Schema, SecretString, ValidationError};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Recording notifier. Clones share the same event log.
#[derive(Clone, Default)]
pub struct MemoryNotifier {
	events: Arc<RwLock<Vec<NotificationEvent>>>,
}

impl MemoryNotifier {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns all events emitted so far, oldest first.
	pub async fn events(&self) -> Vec<NotificationEvent> {
		self.events.read().await.clone()
	}

	/// Returns events emitted under the given event name.
	pub async fn events_named(&self, name: &str) -> Vec<NotificationEvent> {
		self.events
			.read()
			.await
			.iter()
			.filter(|event| event.event == name)
			.cloned()
			.collect()
	}
}

#[async_trait]
impl NotificationInterface for MemoryNotifier {
	async fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
		tracing::debug!(event = %event.event, room = %event.room, "Recorded notification");
		self.events.write().await.push(event.clone());
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryNotifierSchema)
	}
}

/// Configuration schema for MemoryNotifier.
pub struct MemoryNotifierSchema;

impl ConfigSchema for MemoryNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory notifier. Takes no configuration.
pub fn create_notifier(
	config: &toml::Value,
	_internal_key: &SecretString,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	MemoryNotifierSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryNotifier::new()))
}

/// Registry for the memory notification implementation.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotificationRegistry for Registry {}
