//! Storage module for the courier fulfillment system.
//!
//! Backends store raw bytes under string keys with optional expiry and expose
//! a single atomic primitive, [`StorageInterface::compare_and_swap`], on which
//! every conditional order update is built. [`StorageService`] layers typed
//! JSON access and `namespace:id` keys on top of a backend.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Attempts made by [`StorageService::update_if`] before giving up on a
/// heavily contended key.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// A conditional update kept losing to concurrent writers.
	#[error("Contention error: {0}")]
	Contention(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// TTL arguments follow one convention across backends: `None` applies the
/// backend's configured default for the key's namespace, `Some(Duration::ZERO)`
/// stores the value permanently, and any other duration expires the value
/// after that long. Expired values behave exactly like absent ones.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a live value exists for the key.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Atomically replaces the value at `key` if its current bytes equal
	/// `expected`.
	///
	/// `expected = None` means the key must be absent (or expired).
	/// `new = None` deletes the key. Returns `false` without writing when the
	/// current value does not match.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Option<Vec<u8>>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	/// Returns every live value whose key starts with `prefix`.
	async fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A typed value together with the exact bytes it was read from.
///
/// Passing a snapshot back to [`StorageService::swap`] makes the write
/// conditional on nobody having changed the record in between.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
	pub value: T,
	raw: Vec<u8>,
}

/// High-level storage service that provides typed operations.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn key_for(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn to_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value with optional time-to-live, overwriting
	/// whatever was there.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = to_bytes(data)?;
		self.backend
			.set_bytes(&key_for(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value with the backend's default TTL.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key_for(namespace, id)).await?;
		from_bytes(&bytes)
	}

	/// Retrieves a value along with the version needed for a conditional write.
	pub async fn retrieve_snapshot<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Snapshot<T>, StorageError> {
		let raw = self.backend.get_bytes(&key_for(namespace, id)).await?;
		let value = from_bytes(&raw)?;
		Ok(Snapshot { value, raw })
	}

	/// Writes `data` only if the record still matches `current`.
	///
	/// With `current = None` the write only happens if the record is absent.
	/// With `data = None` the record is deleted.
	pub async fn swap<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		current: Option<&Snapshot<T>>,
		data: Option<&T>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let new = data.map(to_bytes).transpose()?;
		self.backend
			.compare_and_swap(
				&key_for(namespace, id),
				current.map(|s| s.raw.as_slice()),
				new,
				ttl,
			)
			.await
	}

	/// Stores `data` only if nothing is stored under the key yet.
	pub async fn insert_if_absent<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		self.swap(namespace, id, None, Some(data), ttl).await
	}

	/// Applies `update` to the stored value and writes it back atomically.
	///
	/// `update` returns `false` to leave the record untouched, in which case
	/// `Ok(None)` is returned. When a concurrent writer changes the record
	/// between the read and the write, the read is repeated and `update` runs
	/// again against the fresh value. Returns `Err(NotFound)` if the record is
	/// absent or expired.
	pub async fn update_if<T, F>(
		&self,
		namespace: &str,
		id: &str,
		ttl: Option<Duration>,
		mut update: F,
	) -> Result<Option<T>, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: FnMut(&mut T) -> bool + Send,
	{
		for _ in 0..MAX_CAS_ATTEMPTS {
			let mut snapshot: Snapshot<T> = self.retrieve_snapshot(namespace, id).await?;
			if !update(&mut snapshot.value) {
				return Ok(None);
			}
			let new = to_bytes(&snapshot.value)?;
			if self
				.backend
				.compare_and_swap(&key_for(namespace, id), Some(&snapshot.raw), Some(new), ttl)
				.await?
			{
				return Ok(Some(snapshot.value));
			}
			tracing::debug!(namespace, id, "Conditional update lost a race, retrying");
		}
		Err(StorageError::Contention(format!(
			"{} retries exhausted for {}",
			MAX_CAS_ATTEMPTS,
			key_for(namespace, id)
		)))
	}

	/// Returns every live value stored in a namespace.
	///
	/// Entries that fail to deserialize are skipped with a warning so that one
	/// corrupt record cannot hide the rest.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let prefix = key_for(namespace, "");
		let raw = self.backend.list(&prefix).await?;
		Ok(raw
			.iter()
			.filter_map(|bytes| match from_bytes(bytes) {
				Ok(value) => Some(value),
				Err(e) => {
					tracing::warn!(namespace, error = %e, "Skipping unreadable record");
					None
				},
			})
			.collect())
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key_for(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key_for(namespace, id)).await
	}

	/// Removes expired entries from storage, returning how many were removed.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
