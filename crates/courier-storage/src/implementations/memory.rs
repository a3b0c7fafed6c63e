//! In-memory storage backend.
//!
//! All entries live in one map behind a single lock, which makes
//! compare-and-swap trivially atomic. Nothing survives a restart, so this
//! backend suits development, tests and single-instance deployments.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use courier_types::{ConfigSchema, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		let expires_at = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		Self { value, expires_at }
	}

	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|deadline| now < deadline)
	}
}

/// In-memory storage implementation with TTL support.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store
			.get(key)
			.filter(|entry| entry.is_live(Instant::now()))
			.map(|entry| entry.value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| entry.is_live(Instant::now())))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Option<Vec<u8>>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		let current = store
			.get(key)
			.filter(|entry| entry.is_live(Instant::now()))
			.map(|entry| entry.value.as_slice());

		if current != expected {
			return Ok(false);
		}

		match new {
			Some(value) => {
				store.insert(key.to_string(), Entry::new(value, ttl));
			},
			None => {
				store.remove(key);
			},
		}
		Ok(true)
	}

	async fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let store = self.store.read().await;
		let now = Instant::now();
		Ok(store
			.iter()
			.filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
			.map(|(_, entry)| entry.value.clone())
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut store = self.store.write().await;
		let now = Instant::now();
		let before = store.len();
		store.retain(|_, entry| entry.is_live(now));
		Ok(before - store.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Memory storage takes no configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:o-1";
		let value = b"order".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_ttl_expiry_and_cleanup() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("orders:pending", b"p".to_vec(), Some(Duration::from_secs(60)))
			.await
			.unwrap();
		storage
			.set_bytes("orders:paid", b"q".to_vec(), Some(Duration::ZERO))
			.await
			.unwrap();

		tokio::time::advance(Duration::from_secs(59)).await;
		assert!(storage.exists("orders:pending").await.unwrap());

		tokio::time::advance(Duration::from_secs(2)).await;
		assert!(matches!(
			storage.get_bytes("orders:pending").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.list("orders:").await.unwrap(), vec![b"q".to_vec()]);

		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
		assert!(storage.exists("orders:paid").await.unwrap());
	}

	#[tokio::test(start_paused = true)]
	async fn test_cas_treats_expired_as_absent() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("holds:r-1", b"o-1".to_vec(), Some(Duration::from_secs(5)))
			.await
			.unwrap();
		assert!(!storage
			.compare_and_swap("holds:r-1", None, Some(b"o-2".to_vec()), None)
			.await
			.unwrap());

		tokio::time::advance(Duration::from_secs(6)).await;
		assert!(storage
			.compare_and_swap("holds:r-1", None, Some(b"o-2".to_vec()), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("holds:r-1").await.unwrap(), b"o-2".to_vec());
	}

	#[tokio::test]
	async fn test_cas_delete_requires_match() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("holds:r-1", b"o-1".to_vec(), None)
			.await
			.unwrap();

		assert!(!storage
			.compare_and_swap("holds:r-1", Some(b"o-9".as_slice()), None, None)
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("holds:r-1", Some(b"o-1".as_slice()), None, None)
			.await
			.unwrap());
		assert!(!storage.exists("holds:r-1").await.unwrap());
	}
}
