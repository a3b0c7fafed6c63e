//! Builder for constructing courier engines.
//!
//! Each backend concern (storage, queue, notification) is resolved from the
//! configured implementations through a map of factory functions, so the
//! service binary decides which implementations are linked in.

use crate::catalog::{Catalog, StorageCatalog};
use crate::engine::CourierEngine;
use crate::handlers::{LifecycleHandler, PaymentHandler, RiderHandler};
use crate::pricing::OrderPricer;
use crate::state::{OrderStore, RiderAssignments};
use courier_config::Config;
use courier_notify::{NotificationError, NotificationInterface, NotificationService};
use courier_queue::{QueueError, QueueInterface, QueueService};
use courier_storage::{StorageError, StorageInterface, StorageService};
use courier_types::SecretString;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every backend concern, keyed by implementation name.
pub struct CourierFactories<SF, QF, NF> {
	pub storage_factories: HashMap<String, SF>,
	pub queue_factories: HashMap<String, QF>,
	pub notification_factories: HashMap<String, NF>,
}

/// Builder for a [`CourierEngine`] with pluggable backends.
pub struct CourierBuilder {
	config: Config,
	catalog: Option<Arc<dyn Catalog>>,
}

impl CourierBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			catalog: None,
		}
	}

	/// Overrides the catalog. Defaults to reading the shared store.
	pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
		self.catalog = Some(catalog);
		self
	}

	pub async fn build<SF, QF, NF>(
		self,
		factories: CourierFactories<SF, QF, NF>,
	) -> Result<CourierEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		QF: Fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>,
		NF: Fn(&toml::Value, &SecretString) -> Result<Box<dyn NotificationInterface>, NotificationError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
			|factory, config| factory(config),
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let queue_backend = load_primary(
			"queue",
			&self.config.queue.primary,
			&self.config.queue.implementations,
			&factories.queue_factories,
			|factory, config| factory(config),
		)?;
		let queue = Arc::new(QueueService::new(queue_backend));

		let internal_key = self.config.service.internal_key.clone();
		let notification_backend = load_primary(
			"notification",
			&self.config.notification.primary,
			&self.config.notification.implementations,
			&factories.notification_factories,
			|factory, config| factory(config, &internal_key),
		)?;
		let notifier = Arc::new(NotificationService::new(notification_backend));

		let payment_window =
			Duration::from_secs(self.config.pricing.payment_window_minutes.saturating_mul(60));
		let orders = Arc::new(OrderStore::new(storage.clone(), payment_window));
		let assignments = Arc::new(RiderAssignments::new(storage.clone(), orders.clone()));
		let catalog = self
			.catalog
			.unwrap_or_else(|| Arc::new(StorageCatalog::new(storage.clone())));

		let lifecycle = Arc::new(LifecycleHandler::new(
			orders.clone(),
			assignments.clone(),
			catalog,
			OrderPricer::new(&self.config.pricing),
			queue.clone(),
			notifier.clone(),
			self.config.queue.rider_queue.clone(),
			self.config.service.currency.clone(),
		));
		let riders = Arc::new(RiderHandler::new(
			orders.clone(),
			assignments,
			notifier.clone(),
		));
		let payments = Arc::new(PaymentHandler::new(orders, notifier));

		tracing::info!(service_id = %self.config.service.id, "Courier engine built");
		Ok(CourierEngine::new(
			self.config,
			storage,
			queue,
			lifecycle,
			riders,
			payments,
		))
	}
}

/// Creates every configured implementation that has a factory, failing on
/// the first invalid one, and returns the primary.
fn load_primary<F, T, E, C>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	create: C,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	C: Fn(&F, &toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match create(factory, config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"Primary {} '{}' failed to load or has no factory",
			component, primary
		))
	})
}
