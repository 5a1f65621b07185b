//! EIP-1967 proxy inspection.

use alloy_primitives::{b256, Address, B256, U256};
use governor_delivery::{DeliveryError, DeliveryService};

/// `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`
pub const ADMIN_SLOT: B256 =
	b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const IMPLEMENTATION_SLOT: B256 =
	b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyInfo {
	pub admin: Address,
	pub implementation: Address,
}

async fn read_address_slot(
	delivery: &DeliveryService,
	proxy: Address,
	slot: B256,
) -> Result<Address, DeliveryError> {
	let word = delivery
		.get_storage_at(proxy, U256::from_be_bytes(slot.0))
		.await?;
	Ok(Address::from_word(word))
}

/// Admin and implementation of the proxy at `proxy`.
pub async fn proxy_info(
	delivery: &DeliveryService,
	proxy: Address,
) -> Result<ProxyInfo, DeliveryError> {
	Ok(ProxyInfo {
		admin: read_address_slot(delivery, proxy, ADMIN_SLOT).await?,
		implementation: read_address_slot(delivery, proxy, IMPLEMENTATION_SLOT).await?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::keccak256;
	use governor_delivery::testing::MockDelivery;

	#[test]
	fn test_slots_match_derivation() {
		let derive = |label: &str| {
			B256::from(U256::from_be_bytes(keccak256(label.as_bytes()).0) - U256::from(1))
		};
		assert_eq!(ADMIN_SLOT, derive("eip1967.proxy.admin"));
		assert_eq!(IMPLEMENTATION_SLOT, derive("eip1967.proxy.implementation"));
	}

	#[tokio::test]
	async fn test_reads_both_slots() {
		let proxy = Address::repeat_byte(0x01);
		let admin = Address::repeat_byte(0xad);
		let implementation = Address::repeat_byte(0x1f);

		let mock = MockDelivery::new();
		mock.set_storage(proxy, U256::from_be_bytes(ADMIN_SLOT.0), admin.into_word());
		mock.set_storage(
			proxy,
			U256::from_be_bytes(IMPLEMENTATION_SLOT.0),
			implementation.into_word(),
		);
		let delivery = DeliveryService::new(Box::new(mock), 1, 1);

		let info = proxy_info(&delivery, proxy).await.unwrap();
		assert_eq!(info.admin, admin);
		assert_eq!(info.implementation, implementation);
	}
}
