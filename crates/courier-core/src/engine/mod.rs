//! Courier engine.
//!
//! Owns the controllers and runs the long-lived background work: the payment
//! event consumer and the periodic sweep of expired records. HTTP handlers
//! reach the controllers through the accessors.

use crate::handlers::{LifecycleHandler, PaymentHandler, RiderHandler};
use courier_config::Config;
use courier_queue::QueueService;
use courier_storage::StorageService;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Upper bound on payment events processed at the same time.
const MAX_CONCURRENT_EVENTS: usize = 32;

/// Main engine coordinating the order lifecycle.
#[derive(Clone)]
pub struct CourierEngine {
	config: Config,
	storage: Arc<StorageService>,
	queue: Arc<QueueService>,
	lifecycle: Arc<LifecycleHandler>,
	riders: Arc<RiderHandler>,
	payments: Arc<PaymentHandler>,
}

impl CourierEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		queue: Arc<QueueService>,
		lifecycle: Arc<LifecycleHandler>,
		riders: Arc<RiderHandler>,
		payments: Arc<PaymentHandler>,
	) -> Self {
		Self {
			config,
			storage,
			queue,
			lifecycle,
			riders,
			payments,
		}
	}

	/// Runs until ctrl-c.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Consumes payment events and sweeps expired records until `shutdown`
	/// completes. In-flight events finish before this returns.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let payment_queue = self.config.queue.payment_queue.as_str();
		self.queue
			.declare_all(&[payment_queue, self.config.queue.rider_queue.as_str()])
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		let mut deliveries = self
			.queue
			.subscribe(payment_queue)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		tracing::info!(queue = %payment_queue, "Payment consumer started");

		let storage = self.storage.clone();
		let mut cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			loop {
				cleanup_interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_EVENTS));
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				delivery = deliveries.next() => {
					let Some(delivery) = delivery else {
						tracing::warn!(queue = %payment_queue, "Payment subscription closed");
						break;
					};
					let permit = match semaphore.clone().acquire_owned().await {
						Ok(permit) => permit,
						Err(e) => {
							tracing::error!("Failed to acquire semaphore permit: {}", e);
							break;
						},
					};
					let payments = self.payments.clone();
					tokio::spawn(async move {
						let _permit = permit;
						payments.handle(delivery).await;
					});
				}

				_ = &mut shutdown => {
					tracing::info!("Shutdown requested");
					break;
				}
			}
		}

		cleanup_handle.abort();
		// Wait for in-flight events to settle.
		let _ = semaphore
			.acquire_many(MAX_CONCURRENT_EVENTS as u32)
			.await;
		tracing::info!("Courier engine stopped");
		Ok(())
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn lifecycle(&self) -> &Arc<LifecycleHandler> {
		&self.lifecycle
	}

	pub fn riders(&self) -> &Arc<RiderHandler> {
		&self.riders
	}

	pub fn payments(&self) -> &Arc<PaymentHandler> {
		&self.payments
	}

	pub fn queue(&self) -> &Arc<QueueService> {
		&self.queue
	}
}
