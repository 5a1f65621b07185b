//! Deployment registry storage.
//!
//! Backends implement the byte-level [`StorageInterface`]. On top of it the
//! [`RegistryService`] keeps one JSON record per contract and network under the
//! key `"<contractId>.<network>"`, plus the append-only pending time-lock queue
//! stored in the `queue` field of the multi-send entry.

use async_trait::async_trait;
use governor_types::{
	registry_key, ConfigSchema, ImplementationRegistry, PackageMeta, PendingAction,
	RegistryRecord, MULTI_SEND_ID,
};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Field of the multi-send entry holding the pending queue.
const QUEUE_FIELD: &str = "queue";

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level key-value interface implemented by storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Returns the value for `key`, or [`StorageError::NotFound`].
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Replaces the value for `key`.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// All keys, sorted.
	async fn keys(&self) -> Result<Vec<String>, StorageError>;

	/// Drops every entry.
	async fn clear(&self) -> Result<(), StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Factory signature shared by all storage implementations.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Returns `(name, factory)` for every storage implementation.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Registry of deployed contracts on one network.
///
/// Not safe for concurrent use by several processes: appends to the pending
/// queue are read-modify-write without compare-and-swap.
pub struct RegistryService {
	backend: Box<dyn StorageInterface>,
	network: String,
}

impl RegistryService {
	pub fn new(backend: Box<dyn StorageInterface>, network: impl Into<String>) -> Self {
		Self {
			backend,
			network: network.into(),
		}
	}

	pub fn network(&self) -> &str {
		&self.network
	}

	fn key(&self, id: &str) -> String {
		registry_key(id, &self.network)
	}

	async fn read_value(&self, key: &str) -> Result<Option<Value>, StorageError> {
		match self.backend.get_bytes(key).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map(Some)
				.map_err(|e| StorageError::Serialization(e.to_string())),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn write_value(&self, key: &str, value: &Value) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(key, bytes).await
	}

	/// The record for `id`, if one was ever written.
	pub async fn get(&self, id: &str) -> Result<Option<RegistryRecord>, StorageError> {
		match self.read_value(&self.key(id)).await? {
			Some(value) => serde_json::from_value(value)
				.map(Some)
				.map_err(|e| StorageError::Serialization(format!("Record '{}': {}", id, e))),
			None => Ok(None),
		}
	}

	/// Replaces the record for `id`.
	///
	/// The pending queue sharing the multi-send entry survives the replace.
	pub async fn set(&self, id: &str, record: &RegistryRecord) -> Result<(), StorageError> {
		let key = self.key(id);
		let mut value = serde_json::to_value(record)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;

		if let Some(queue) = self
			.read_value(&key)
			.await?
			.and_then(|mut old| old.get_mut(QUEUE_FIELD).map(Value::take))
		{
			if let Value::Object(map) = &mut value {
				map.insert(QUEUE_FIELD.to_string(), queue);
			}
		}

		self.write_value(&key, &value).await
	}

	/// The deployed address of `id`.
	///
	/// Absent, malformed and zero addresses all read as `None`, which callers
	/// treat as "not deployed".
	pub async fn get_address(&self, id: &str) -> Result<Option<String>, StorageError> {
		let Some(value) = self.read_value(&self.key(id)).await? else {
			return Ok(None);
		};
		let address = value
			.get("address")
			.and_then(Value::as_str)
			.filter(|a| governor_types::is_valid_address(a));

		if address.is_none() {
			tracing::debug!(contract = %id, "No valid address in registry");
		}
		Ok(address.map(str::to_string))
	}

	/// Merges `address`, version and package metadata onto the existing entry.
	///
	/// Fields not named here are preserved. When `verifiable` is set and the
	/// entry has no `constructorArgs` array, an empty one is inserted.
	pub async fn upsert(
		&self,
		id: &str,
		address: &str,
		version: Option<&str>,
		verifiable: bool,
	) -> Result<(), StorageError> {
		let key = self.key(id);
		let mut entry = match self.read_value(&key).await? {
			Some(Value::Object(map)) => map,
			_ => Map::new(),
		};

		entry.insert("address".to_string(), Value::String(address.to_string()));
		if let Some(version) = version {
			entry.insert("version".to_string(), Value::String(version.to_string()));
		}
		entry.insert(
			"package".to_string(),
			serde_json::to_value(PackageMeta::current())
				.map_err(|e| StorageError::Serialization(e.to_string()))?,
		);
		if verifiable && !entry.get("constructorArgs").is_some_and(Value::is_array) {
			entry.insert("constructorArgs".to_string(), Value::Array(Vec::new()));
		}

		self.write_value(&key, &Value::Object(entry)).await
	}

	/// Flags the record of `id` as verified.
	pub async fn mark_verified(&self, id: &str) -> Result<(), StorageError> {
		let key = self.key(id);
		let Some(Value::Object(mut entry)) = self.read_value(&key).await? else {
			return Err(StorageError::NotFound);
		};
		entry.insert("verified".to_string(), Value::Bool(true));
		self.write_value(&key, &Value::Object(entry)).await
	}

	/// Records on this network, ordered by contract id.
	///
	/// Entries without an address, such as a multi-send entry holding only the
	/// pending queue, are skipped.
	pub async fn list(&self) -> Result<Vec<(String, RegistryRecord)>, StorageError> {
		let suffix = format!(".{}", self.network);
		let mut records = Vec::new();

		for key in self.backend.keys().await? {
			let Some(id) = key.strip_suffix(&suffix) else {
				continue;
			};
			let Some(value) = self.read_value(&key).await? else {
				continue;
			};
			if value.get("address").is_none() {
				continue;
			}
			match serde_json::from_value::<RegistryRecord>(value) {
				Ok(record) => records.push((id.to_string(), record)),
				Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable record"),
			}
		}

		Ok(records)
	}

	/// `(key, address)` for every record with an address, across all networks.
	pub async fn summary(&self) -> Result<Vec<(String, String)>, StorageError> {
		let mut entries = Vec::new();
		for key in self.backend.keys().await? {
			let address = self
				.read_value(&key)
				.await?
				.and_then(|value| value.get("address").and_then(Value::as_str).map(String::from));
			match address {
				Some(address) if !address.is_empty() => entries.push((key, address)),
				_ => {},
			}
		}
		Ok(entries)
	}

	/// Appends `entry` to this network's pending time-lock queue.
	pub async fn append_pending_action(&self, entry: &PendingAction) -> Result<(), StorageError> {
		let key = self.key(MULTI_SEND_ID);
		let mut holder = match self.read_value(&key).await? {
			Some(Value::Object(map)) => map,
			_ => Map::new(),
		};

		let entry =
			serde_json::to_value(entry).map_err(|e| StorageError::Serialization(e.to_string()))?;
		match holder.get_mut(QUEUE_FIELD) {
			Some(Value::Array(queue)) => queue.push(entry),
			_ => {
				holder.insert(QUEUE_FIELD.to_string(), Value::Array(vec![entry]));
			},
		}

		self.write_value(&key, &Value::Object(holder)).await
	}

	/// The pending time-lock queue of this network, oldest first.
	pub async fn pending_actions(&self) -> Result<Vec<PendingAction>, StorageError> {
		let queue = self
			.read_value(&self.key(MULTI_SEND_ID))
			.await?
			.and_then(|mut v| v.get_mut(QUEUE_FIELD).map(Value::take));

		match queue {
			Some(queue) => serde_json::from_value(queue)
				.map_err(|e| StorageError::Serialization(format!("Pending queue: {}", e))),
			None => Ok(Vec::new()),
		}
	}

	/// Drops the whole registry, every network included.
	pub async fn clear(&self) -> Result<(), StorageError> {
		self.backend.clear().await
	}
}
