//! In-process queue backend.
//!
//! Each named queue is an unbounded channel with a single consumer. Messages
//! that are nacked with requeue, or dropped without being settled, go back
//! onto the queue flagged as redelivered.

use crate::{Acknowledger, Delivery, DeliveryStream, QueueError, QueueInterface};
use async_trait::async_trait;
use courier_types::{ConfigSchema, Schema, ValidationError};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug)]
struct Message {
	payload: Vec<u8>,
	redelivered: bool,
}

struct QueueState {
	tx: mpsc::UnboundedSender<Message>,
	/// Taken by the first subscriber.
	rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl QueueState {
	fn new() -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			tx,
			rx: Mutex::new(Some(rx)),
		}
	}
}

struct MemoryAcker {
	tx: mpsc::UnboundedSender<Message>,
	payload: Vec<u8>,
	settled: AtomicBool,
}

impl MemoryAcker {
	fn requeue(&self) {
		let message = Message {
			payload: self.payload.clone(),
			redelivered: true,
		};
		if self.tx.send(message).is_err() {
			tracing::warn!("Queue closed, requeued message dropped");
		}
	}
}

#[async_trait]
impl Acknowledger for MemoryAcker {
	async fn ack(&self) -> Result<(), QueueError> {
		self.settled.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn nack(&self, requeue: bool) -> Result<(), QueueError> {
		if !self.settled.swap(true, Ordering::SeqCst) && requeue {
			self.requeue();
		}
		Ok(())
	}
}

impl Drop for MemoryAcker {
	fn drop(&mut self) {
		if !self.settled.load(Ordering::SeqCst) {
			self.requeue();
		}
	}
}

/// In-memory queue implementation.
#[derive(Clone, Default)]
pub struct MemoryQueue {
	queues: Arc<RwLock<HashMap<String, Arc<QueueState>>>>,
}

impl MemoryQueue {
	pub fn new() -> Self {
		Self::default()
	}

	async fn queue(&self, name: &str) -> Arc<QueueState> {
		if let Some(state) = self.queues.read().await.get(name) {
			return state.clone();
		}
		self.queues
			.write()
			.await
			.entry(name.to_string())
			.or_insert_with(|| Arc::new(QueueState::new()))
			.clone()
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn declare(&self, queue: &str) -> Result<(), QueueError> {
		self.queue(queue).await;
		Ok(())
	}

	async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
		let state = self.queue(queue).await;
		state
			.tx
			.send(Message {
				payload,
				redelivered: false,
			})
			.map_err(|_| QueueError::Publish(format!("Queue '{}' has no live consumer", queue)))
	}

	async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, QueueError> {
		let state = self.queue(queue).await;
		let rx = state.rx.lock().await.take().ok_or_else(|| {
			QueueError::Subscribe(format!("Queue '{}' already has a consumer", queue))
		})?;

		let tx = state.tx.clone();
		let stream = UnboundedReceiverStream::new(rx).map(move |message| {
			let acker = MemoryAcker {
				tx: tx.clone(),
				payload: message.payload.clone(),
				settled: AtomicBool::new(false),
			};
			Delivery::new(message.payload, message.redelivered, Box::new(acker))
		});
		Ok(stream.boxed())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryQueueSchema)
	}
}

/// Configuration schema for MemoryQueue.
pub struct MemoryQueueSchema;

impl ConfigSchema for MemoryQueueSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory queue from configuration.
pub fn create_queue(config: &toml::Value) -> Result<Box<dyn QueueInterface>, QueueError> {
	MemoryQueueSchema
		.validate(config)
		.map_err(|e| QueueError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryQueue::new()))
}

/// Registry for the memory queue implementation.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::QueueFactory;

	fn factory() -> Self::Factory {
		create_queue
	}
}

impl crate::QueueRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_messages_published_before_subscribe_are_kept() {
		let queue = MemoryQueue::new();
		queue.publish("payments", b"one".to_vec()).await.unwrap();
		queue.publish("payments", b"two".to_vec()).await.unwrap();

		let mut stream = queue.subscribe("payments").await.unwrap();
		let first = stream.next().await.unwrap();
		assert_eq!(first.payload, b"one".to_vec());
		assert!(!first.redelivered);
		first.ack().await.unwrap();
		let second = stream.next().await.unwrap();
		assert_eq!(second.payload, b"two".to_vec());
		second.ack().await.unwrap();
	}

	#[tokio::test]
	async fn test_nack_and_drop_requeue() {
		let queue = MemoryQueue::new();
		queue.publish("payments", b"evt".to_vec()).await.unwrap();
		let mut stream = queue.subscribe("payments").await.unwrap();

		let delivery = stream.next().await.unwrap();
		delivery.nack(true).await.unwrap();
		let delivery = stream.next().await.unwrap();
		assert!(delivery.redelivered);

		drop(delivery);
		let delivery = stream.next().await.unwrap();
		assert_eq!(delivery.payload, b"evt".to_vec());
		delivery.nack(false).await.unwrap();

		let nothing = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
		assert!(nothing.is_err());
	}

	#[tokio::test]
	async fn test_single_consumer() {
		let queue = MemoryQueue::new();
		let _stream = queue.subscribe("payments").await.unwrap();
		assert!(matches!(
			queue.subscribe("payments").await,
			Err(QueueError::Subscribe(_))
		));
	}
}
