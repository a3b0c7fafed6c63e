//! File-based storage backend.
//!
//! Each key is stored in its own file prefixed with a fixed-size header that
//! carries the expiry time. Writes go to a temporary file that is renamed into
//! place, so readers never observe a partial record. Every mutation runs while
//! holding an exclusive advisory lock on a lock file in the storage directory,
//! which makes compare-and-swap atomic across tasks and across processes
//! sharing the directory.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use courier_types::{
	current_timestamp, ConfigSchema, Field, FieldType, Schema, StorageKey, ValidationError,
};
use fs2::FileExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const LOCK_FILE: &str = ".courier.lock";
const EXTENSION: &str = "bin";

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header for TTL support.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "CRSF"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-63]: Reserved
#[derive(Debug, Clone, Copy, PartialEq)]
struct FileHeader {
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"CRSF";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};
		Self { expires_at }
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	/// Parses the header at the start of `bytes`. Returns `None` for files
	/// written without a header.
	fn parse(bytes: &[u8]) -> Result<Option<Self>, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Ok(None);
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);
		Ok(Some(Self {
			expires_at: u64::from_le_bytes(expires_bytes),
		}))
	}

	fn is_expired(&self, now: u64) -> bool {
		self.expires_at != 0 && now >= self.expires_at
	}
}

/// Strips the header from raw file contents, returning `None` when the
/// record has expired.
fn live_payload(data: Vec<u8>, now: u64) -> Result<Option<Vec<u8>>, StorageError> {
	match FileHeader::parse(&data)? {
		Some(header) if header.is_expired(now) => Ok(None),
		Some(_) => Ok(Some(data[FileHeader::SIZE..].to_vec())),
		None => Ok(Some(data)),
	}
}

/// Default TTLs per storage namespace, used when a write passes `ttl = None`.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<namespace>` entries (seconds) from the backend table.
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter_map(|storage_key| {
				config
					.get(format!("ttl_{}", storage_key.as_str()))
					.and_then(|v| v.as_integer())
					.and_then(|secs| u64::try_from(secs).ok())
					.map(|secs| (storage_key, Duration::from_secs(secs)))
			})
			.collect();
		Self { ttls }
	}

	fn ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<StorageKey>().ok())
			.and_then(|storage_key| self.ttls.get(&storage_key).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// Maps a key to a filesystem-safe file name.
	fn file_name(key: &str) -> String {
		format!("{}.{}", key.replace(['/', ':', '\\'], "_"), EXTENSION)
	}

	fn file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(Self::file_name(key))
	}

	fn header_for(&self, key: &str, ttl: Option<Duration>) -> FileHeader {
		FileHeader::new(ttl.unwrap_or_else(|| self.ttl_config.ttl_for_key(key)))
	}

	/// Runs `op` on a blocking thread while holding the directory lock.
	async fn locked<R, F>(&self, op: F) -> Result<R, StorageError>
	where
		R: Send + 'static,
		F: FnOnce(&Path) -> Result<R, StorageError> + Send + 'static,
	{
		let base_path = self.base_path.clone();
		tokio::task::spawn_blocking(move || {
			std::fs::create_dir_all(&base_path)
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			let lock = std::fs::OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(base_path.join(LOCK_FILE))
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			lock.lock_exclusive()
				.map_err(|e| StorageError::Backend(format!("Failed to lock storage: {}", e)))?;
			let result = op(&base_path);
			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!("Failed to release storage lock: {}", e);
			}
			result
		})
		.await
		.map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
	}
}

fn read_live_blocking(path: &Path, now: u64) -> Result<Option<Vec<u8>>, StorageError> {
	match std::fs::read(path) {
		Ok(data) => live_payload(data, now),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

fn write_blocking(path: &Path, header: FileHeader, value: &[u8]) -> Result<(), StorageError> {
	let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
	file_data.extend_from_slice(&header.serialize());
	file_data.extend_from_slice(value);

	let temp_path = path.with_extension("tmp");
	std::fs::write(&temp_path, file_data).map_err(|e| StorageError::Backend(e.to_string()))?;
	std::fs::rename(&temp_path, path).map_err(|e| StorageError::Backend(e.to_string()))
}

fn remove_blocking(path: &Path) -> Result<(), StorageError> {
	match std::fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

fn is_record(path: &Path) -> bool {
	path.extension() == Some(std::ffi::OsStr::new(EXTENSION))
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(self.file_path(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		live_payload(data, current_timestamp())?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let name = Self::file_name(key);
		let header = self.header_for(key, ttl);
		self.locked(move |base| write_blocking(&base.join(name), header, &value))
			.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let name = Self::file_name(key);
		self.locked(move |base| remove_blocking(&base.join(name)))
			.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Option<Vec<u8>>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let name = Self::file_name(key);
		let header = self.header_for(key, ttl);
		let expected = expected.map(<[u8]>::to_vec);
		self.locked(move |base| {
			let path = base.join(name);
			let current = read_live_blocking(&path, current_timestamp())?;
			if current != expected {
				return Ok(false);
			}
			match new {
				Some(value) => write_blocking(&path, header, &value)?,
				None => remove_blocking(&path)?,
			}
			Ok(true)
		})
		.await
	}

	async fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let name_prefix = prefix.replace(['/', ':', '\\'], "_");
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let now = current_timestamp();
		let mut values = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			let matches_prefix = entry
				.file_name()
				.to_str()
				.is_some_and(|name| name.starts_with(&name_prefix));
			if !matches_prefix || !is_record(&path) {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => {
					if let Some(value) = live_payload(data, now)? {
						values.push(value);
					}
				},
				// Removed between listing and reading.
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
				Err(e) => return Err(StorageError::Backend(e.to_string())),
			}
		}
		Ok(values)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.locked(|base| {
			let now = current_timestamp();
			let mut removed = 0;
			let entries =
				std::fs::read_dir(base).map_err(|e| StorageError::Backend(e.to_string()))?;
			for entry in entries.flatten() {
				let path = entry.path();
				if !is_record(&path) {
					continue;
				}
				let expired = match std::fs::read(&path) {
					Ok(data) => FileHeader::parse(&data)
						.ok()
						.flatten()
						.is_some_and(|header| header.is_expired(now)),
					Err(e) => {
						tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
						false
					},
				};
				if expired {
					match std::fs::remove_file(&path) {
						Ok(()) => removed += 1,
						Err(e) => {
							tracing::warn!("Failed to remove expired file {:?}: {}", path, e)
						},
					}
				}
			}
			Ok(removed)
		})
		.await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];
		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_<namespace>`: default TTL in seconds for a namespace, e.g.
///   `ttl_carts` (default: 0, never expires)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
