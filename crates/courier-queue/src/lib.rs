//! Message queue module for the courier fulfillment system.
//!
//! The broker client is an injected dependency with its own connection
//! lifecycle. Consumers receive [`Delivery`] values and settle each one
//! explicitly: [`Delivery::ack`] after processing, [`Delivery::nack`] to hand
//! it back to the broker. A delivery dropped without being settled is
//! redelivered.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry, QueueEnvelope};
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod amqp;
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// Broker unreachable or connection lost.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Message could not be published.
	#[error("Publish error: {0}")]
	Publish(String),
	/// Queue could not be declared or consumed.
	#[error("Subscribe error: {0}")]
	Subscribe(String),
	/// Delivery could not be acknowledged or rejected.
	#[error("Acknowledgement error: {0}")]
	Acknowledge(String),
	/// Message body could not be encoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Invalid backend configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Settles one delivery with the broker it came from.
#[async_trait]
pub trait Acknowledger: Send + Sync {
	async fn ack(&self) -> Result<(), QueueError>;

	/// Negatively acknowledges the delivery. With `requeue = false` the broker
	/// drops it (or dead-letters it, if so configured).
	async fn nack(&self, requeue: bool) -> Result<(), QueueError>;
}

/// A message received from a queue, awaiting settlement.
pub struct Delivery {
	pub payload: Vec<u8>,
	/// Whether the broker has delivered this message before.
	pub redelivered: bool,
	acker: Box<dyn Acknowledger>,
}

impl Delivery {
	pub fn new(payload: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
		Self {
			payload,
			redelivered,
			acker,
		}
	}

	pub async fn ack(self) -> Result<(), QueueError> {
		self.acker.ack().await
	}

	pub async fn nack(self, requeue: bool) -> Result<(), QueueError> {
		self.acker.nack(requeue).await
	}
}

impl std::fmt::Debug for Delivery {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Delivery")
			.field("payload_len", &self.payload.len())
			.field("redelivered", &self.redelivered)
			.finish()
	}
}

/// Stream of deliveries from one queue. Ends when the subscription is closed.
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// Trait defining the interface for message broker backends.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Declares a durable queue. Declaring an existing queue is a no-op.
	async fn declare(&self, queue: &str) -> Result<(), QueueError>;

	/// Publishes a persistent message to a queue.
	async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError>;

	/// Starts consuming a queue.
	async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, QueueError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for queue factory functions.
pub type QueueFactory = fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>;

/// Registry trait for queue implementations.
pub trait QueueRegistry: ImplementationRegistry<Factory = QueueFactory> {}

/// Get all registered queue implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, QueueFactory)> {
	use implementations::{amqp, memory};

	vec![
		(amqp::Registry::NAME, amqp::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Queue service that publishes JSON envelopes through a backend.
pub struct QueueService {
	backend: Box<dyn QueueInterface>,
}

impl QueueService {
	pub fn new(backend: Box<dyn QueueInterface>) -> Self {
		Self { backend }
	}

	/// Declares every queue the service uses.
	pub async fn declare_all(&self, queues: &[&str]) -> Result<(), QueueError> {
		for queue in queues {
			self.backend.declare(queue).await?;
		}
		Ok(())
	}

	/// Serializes `{type, data}` and publishes it.
	pub async fn publish_event<T: Serialize + Sync>(
		&self,
		queue: &str,
		envelope: &QueueEnvelope<T>,
	) -> Result<(), QueueError> {
		let payload =
			serde_json::to_vec(envelope).map_err(|e| QueueError::Serialization(e.to_string()))?;
		self.backend.publish(queue, payload).await
	}

	pub async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, QueueError> {
		self.backend.subscribe(queue).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryQueue;
	use futures::StreamExt;

	#[tokio::test]
	async fn test_publish_event_wire_format() {
		let service = QueueService::new(Box::new(MemoryQueue::new()));
		service.declare_all(&["rider_queue"]).await.unwrap();
		service
			.publish_event(
				"rider_queue",
				&QueueEnvelope::new("ORDER_READY_FOR_RIDER", serde_json::json!({"orderId": "o-1"})),
			)
			.await
			.unwrap();

		let mut stream = service.subscribe("rider_queue").await.unwrap();
		let delivery = stream.next().await.unwrap();
		let body: serde_json::Value = serde_json::from_slice(&delivery.payload).unwrap();
		assert_eq!(body["type"], "ORDER_READY_FOR_RIDER");
		assert_eq!(body["data"]["orderId"], "o-1");
		delivery.ack().await.unwrap();
	}
}
