//! Single-document JSON file storage.
//!
//! The whole registry lives in one pretty-printed JSON object whose top-level
//! keys are storage keys. Every write rewrites the document atomically by
//! writing a sibling temp file and renaming it over the original.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use governor_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

const DEFAULT_STORAGE_PATH: &str = "./deployed-contracts.json";

/// File-backed storage. Values must be JSON documents.
pub struct FileStorage {
	path: PathBuf,
	/// Serializes read-modify-write cycles on the document.
	lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			lock: Mutex::new(()),
		}
	}

	/// Reads the document. A missing file is an empty document.
	async fn load(&self) -> Result<Map<String, Value>, StorageError> {
		let content = match fs::read(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		if content.iter().all(|b| b.is_ascii_whitespace()) {
			return Ok(Map::new());
		}

		match serde_json::from_slice(&content) {
			Ok(Value::Object(map)) => Ok(map),
			Ok(_) => Err(StorageError::Serialization(format!(
				"{} does not contain a JSON object",
				self.path.display()
			))),
			Err(e) => Err(StorageError::Serialization(format!(
				"Failed to parse {}: {}",
				self.path.display(),
				e
			))),
		}
	}

	async fn save(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let mut content = serde_json::to_vec_pretty(document)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		content.push(b'\n');

		let temp_path = self.path.with_extension("json.tmp");
		fs::write(&temp_path, content)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &self.path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		tracing::trace!(path = %self.path.display(), entries = document.len(), "Saved registry");
		Ok(())
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let _guard = self.lock.lock().await;
		let document = self.load().await?;
		let value = document.get(key).ok_or(StorageError::NotFound)?;
		serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let value: Value = serde_json::from_slice(&value).map_err(|e| {
			StorageError::Serialization(format!("Value for '{}' is not JSON: {}", key, e))
		})?;

		let _guard = self.lock.lock().await;
		let mut document = self.load().await?;
		document.insert(key.to_string(), value);
		self.save(&document).await
	}

	async fn keys(&self) -> Result<Vec<String>, StorageError> {
		let _guard = self.lock.lock().await;
		Ok(self.load().await?.keys().cloned().collect())
	}

	async fn clear(&self) -> Result<(), StorageError> {
		let _guard = self.lock.lock().await;
		match fs::remove_file(&self.path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for [`FileStorage`].
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: registry document (default: "./deployed-contracts.json")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl governor_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
