//! Read access to entities owned by the catalog services.
//!
//! Restaurants, menu items, addresses and carts are written by other
//! services. Order creation reads them once and snapshots what it needs.

use async_trait::async_trait;
use courier_storage::{StorageError, StorageService};
use courier_types::{Address, CartEntry, CartLine, MenuItem, Restaurant, StorageKey};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading catalog entities.
#[derive(Debug, Error)]
pub enum CatalogError {
	/// The entity does not exist or is not visible to the caller.
	#[error("{0} not found")]
	NotFound(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Boundary to the catalog services.
#[async_trait]
pub trait Catalog: Send + Sync {
	/// Returns the address only if it belongs to `user_id`.
	async fn get_address(&self, user_id: &str, address_id: &str) -> Result<Address, CatalogError>;

	/// Returns the buyer's cart joined with current menu items.
	async fn get_cart(&self, user_id: &str) -> Result<Vec<CartLine>, CatalogError>;

	async fn get_restaurant(&self, restaurant_id: &str) -> Result<Restaurant, CatalogError>;

	async fn clear_cart(&self, user_id: &str) -> Result<(), CatalogError>;
}

/// Catalog reading the namespaces the catalog services write to the shared
/// store.
pub struct StorageCatalog {
	storage: Arc<StorageService>,
}

impl StorageCatalog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn fetch<T: serde::de::DeserializeOwned>(
		&self,
		key: StorageKey,
		id: &str,
		what: &str,
	) -> Result<T, CatalogError> {
		self.storage
			.retrieve(key.as_str(), id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => CatalogError::NotFound(what.to_string()),
				other => CatalogError::Storage(other.to_string()),
			})
	}
}

#[async_trait]
impl Catalog for StorageCatalog {
	async fn get_address(&self, user_id: &str, address_id: &str) -> Result<Address, CatalogError> {
		let address: Address = self
			.fetch(StorageKey::Addresses, address_id, "Address")
			.await?;
		if address.user_id != user_id {
			return Err(CatalogError::NotFound("Address".into()));
		}
		Ok(address)
	}

	async fn get_cart(&self, user_id: &str) -> Result<Vec<CartLine>, CatalogError> {
		let entries: Vec<CartEntry> = match self.fetch(StorageKey::Carts, user_id, "Cart").await {
			Ok(entries) => entries,
			Err(CatalogError::NotFound(_)) => return Ok(Vec::new()),
			Err(e) => return Err(e),
		};

		let mut lines = Vec::with_capacity(entries.len());
		for entry in entries {
			let item: MenuItem = self
				.fetch(StorageKey::MenuItems, &entry.item_id, "Menu item")
				.await?;
			lines.push(CartLine {
				restaurant_id: item.restaurant_id.clone(),
				item,
				quantity: entry.quantity,
			});
		}
		Ok(lines)
	}

	async fn get_restaurant(&self, restaurant_id: &str) -> Result<Restaurant, CatalogError> {
		self.fetch(StorageKey::Restaurants, restaurant_id, "Restaurant")
			.await
	}

	async fn clear_cart(&self, user_id: &str) -> Result<(), CatalogError> {
		self.storage
			.remove(StorageKey::Carts.as_str(), user_id)
			.await
			.map_err(|e| CatalogError::Storage(e.to_string()))
	}
}
