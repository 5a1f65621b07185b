//! Build artifact loading.
//!
//! Artifacts live under a root directory in the compiler's layout,
//! `<root>/<source>/<Contract>.json`. A bare contract name is searched for
//! recursively; a fully-qualified `source:Contract` name is resolved directly.

use async_trait::async_trait;
use governor_types::BuildArtifact;
use governor_verify::ArtifactSource;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding compiler metadata rather than contract artifacts.
const BUILD_INFO_DIR: &str = "build-info";

#[derive(Debug, Error)]
pub enum ArtifactError {
	#[error("Artifact not found: {0}")]
	NotFound(String),
	#[error("IO error: {0}")]
	Io(String),
	#[error("Invalid artifact {0}")]
	Parse(String),
}

/// Reads artifacts from the configured directory.
pub struct ArtifactStore {
	root: PathBuf,
}

impl ArtifactStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Loads the artifact of `name`, either `Contract` or `source:Contract`.
	pub async fn load(&self, name: &str) -> Result<BuildArtifact, ArtifactError> {
		let path = match name.split_once(':') {
			Some((source, contract)) => self.root.join(source).join(format!("{}.json", contract)),
			None => self
				.find(&format!("{}.json", name))
				.await?
				.ok_or_else(|| ArtifactError::NotFound(name.to_string()))?,
		};

		let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
			ErrorKind::NotFound => ArtifactError::NotFound(name.to_string()),
			_ => ArtifactError::Io(format!("{}: {}", path.display(), e)),
		})?;

		let mut artifact: BuildArtifact = serde_json::from_slice(&bytes)
			.map_err(|e| ArtifactError::Parse(format!("{}: {}", path.display(), e)))?;
		if artifact.contract_name.is_empty() {
			artifact.contract_name = governor_types::normalize_library_name(name).to_string();
		}

		tracing::trace!(contract = %name, path = %path.display(), "Loaded artifact");
		Ok(artifact)
	}

	/// Depth-first search for `file_name`, visiting directories in name order.
	async fn find(&self, file_name: &str) -> Result<Option<PathBuf>, ArtifactError> {
		let io = |e: std::io::Error| ArtifactError::Io(e.to_string());
		let mut pending = vec![self.root.clone()];

		while let Some(dir) = pending.pop() {
			let mut entries = match tokio::fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(e) if e.kind() == ErrorKind::NotFound => continue,
				Err(e) => return Err(io(e)),
			};

			let mut subdirs = Vec::new();
			while let Some(entry) = entries.next_entry().await.map_err(io)? {
				let file_type = entry.file_type().await.map_err(io)?;
				if file_type.is_dir() {
					if entry.file_name() != BUILD_INFO_DIR {
						subdirs.push(entry.path());
					}
				} else if entry.file_name() == file_name {
					return Ok(Some(entry.path()));
				}
			}

			subdirs.sort();
			pending.extend(subdirs.into_iter().rev());
		}

		Ok(None)
	}
}

#[async_trait]
impl ArtifactSource for ArtifactStore {
	async fn load_artifact(&self, name: &str) -> Option<BuildArtifact> {
		match self.load(name).await {
			Ok(artifact) => Some(artifact),
			Err(e) => {
				tracing::debug!(contract = %name, error = %e, "Artifact unavailable");
				None
			},
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use tempfile::TempDir;

	/// Writes a minimal artifact for `source:name` under `root`.
	pub(crate) fn write_artifact(
		root: &Path,
		source: &str,
		name: &str,
		bytecode: &str,
		abi: serde_json::Value,
	) {
		let dir = root.join(source);
		std::fs::create_dir_all(&dir).unwrap();
		let artifact = serde_json::json!({
			"contractName": name,
			"sourceName": source,
			"abi": abi,
			"bytecode": bytecode,
			"linkReferences": {}
		});
		std::fs::write(
			dir.join(format!("{}.json", name)),
			serde_json::to_vec_pretty(&artifact).unwrap(),
		)
		.unwrap();
	}

	#[tokio::test]
	async fn test_load_by_name_and_fully_qualified_name() {
		let dir = TempDir::new().unwrap();
		write_artifact(
			dir.path(),
			"contracts/core/Pool.sol",
			"Pool",
			"0x6080",
			serde_json::json!([]),
		);
		std::fs::create_dir_all(dir.path().join(BUILD_INFO_DIR)).unwrap();
		std::fs::write(dir.path().join(BUILD_INFO_DIR).join("Pool.json"), b"{}").unwrap();

		let store = ArtifactStore::new(dir.path());
		let by_name = store.load("Pool").await.unwrap();
		assert_eq!(by_name.fully_qualified_name(), "contracts/core/Pool.sol:Pool");

		let by_fqn = store.load("contracts/core/Pool.sol:Pool").await.unwrap();
		assert_eq!(by_fqn, by_name);
	}

	#[tokio::test]
	async fn test_missing_and_malformed_artifacts() {
		let dir = TempDir::new().unwrap();
		std::fs::create_dir_all(dir.path().join("contracts/Bad.sol")).unwrap();
		std::fs::write(dir.path().join("contracts/Bad.sol/Bad.json"), b"not json").unwrap();

		let store = ArtifactStore::new(dir.path());
		assert!(matches!(store.load("Missing").await, Err(ArtifactError::NotFound(_))));
		assert!(matches!(store.load("Bad").await, Err(ArtifactError::Parse(_))));
		assert!(store.load_artifact("Bad").await.is_none());

		let absent_root = ArtifactStore::new(dir.path().join("nope"));
		assert!(matches!(absent_root.load("Pool").await, Err(ArtifactError::NotFound(_))));
	}
}
