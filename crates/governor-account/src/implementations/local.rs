//! Local private key account.

use crate::{AccountError, AccountInterface};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use governor_types::{
	with_0x_prefix, Address, Bytes, ConfigSchema, Field, FieldType, Schema, SecretString,
	ValidationError, B256,
};

/// Account backed by an in-process private key.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key.with_exposed(|key| {
			key.trim()
				.parse::<PrivateKeySigner>()
				.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
		})?;
		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError> {
		let signature = self
			.signer
			.sign_hash(hash)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Bytes::from(signature.as_bytes().to_vec()))
	}

	fn get_private_key(&self) -> SecretString {
		SecretString::from(with_0x_prefix(&self.signer.to_bytes().to_string()))
	}
}

/// Configuration schema for [`LocalWallet`].
pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default().trim();
					let hex_part = key.strip_prefix("0x").unwrap_or(key);
					if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
						return Err("private_key must be 32 bytes of hex".to_string());
					}
					Ok(())
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

/// Creates a local account.
///
/// Configuration parameters:
/// - `private_key`: hex private key, usually supplied as `${DEPLOYER_PRIVATE_KEY}`
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	Ok(Box::new(LocalWallet::new(&private_key)?))
}

/// Registry for the local account implementation.
pub struct Registry;

impl governor_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, keccak256};

	const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn config(key: &str) -> toml::Value {
		toml::from_str(&format!("private_key = \"{}\"", key)).unwrap()
	}

	#[tokio::test]
	async fn test_address_from_key() {
		let account = create_account(&config(ANVIL_KEY)).unwrap();
		assert_eq!(
			account.address().await.unwrap(),
			address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
		);
		assert_eq!(account.get_private_key().expose_secret(), ANVIL_KEY);
	}

	#[tokio::test]
	async fn test_signature_recovers_signer() {
		let account = LocalWallet::new(&SecretString::from(ANVIL_KEY)).unwrap();
		let digest = keccak256(b"safe tx");
		let signature = account.sign_hash(&digest).await.unwrap();

		assert_eq!(signature.len(), 65);
		assert!(signature[64] == 27 || signature[64] == 28);

		let parsed = alloy_primitives::PrimitiveSignature::try_from(signature.as_ref()).unwrap();
		assert_eq!(
			parsed.recover_address_from_prehash(&digest).unwrap(),
			account.address().await.unwrap()
		);
	}

	#[test]
	fn test_malformed_key_rejected() {
		assert!(create_account(&config("0x1234")).is_err());
		assert!(create_account(&toml::Value::Table(Default::default())).is_err());
	}
}
