//! EIP-712 helpers for multisig transaction hashing.
//!
//! Safe accounts use a domain without name or version:
//! `EIP712Domain(uint256 chainId,address verifyingContract)`.

use alloy_primitives::{keccak256, Address, B256, U256};

pub const DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";
pub const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// keccak256(abi.encode(typeHash, chainId, verifyingContract)).
pub fn compute_domain_hash(chain_id: u64, verifying_contract: &Address) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
	enc.push_u256(U256::from(chain_id));
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Word-by-word encoder for static EIP-712 members.
#[derive(Default)]
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		self.buf.extend_from_slice(&v.to_be_bytes::<32>());
	}

	pub fn push_u8(&mut self, v: u8) {
		let mut word = [0u8; 32];
		word[31] = v;
		self.buf.extend_from_slice(&word);
	}

	/// Dynamic `bytes` members are encoded as their keccak256 hash.
	pub fn push_bytes_hash(&mut self, data: &[u8]) {
		self.push_b256(&keccak256(data));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}
