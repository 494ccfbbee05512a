//! Deterministic 32-byte order identifiers.
//!
//! EVM-source orders hash as EIP-712 typed data under the aggregation router
//! domain; Move-source orders hash as keccak-256 over the canonical byte
//! serialization the escrow module verifies on-chain.

use std::str::FromStr;

use alloy::primitives::{Address, B256, U256, address, keccak256};
use alloy::sol;
use alloy::sol_types::{SolStruct, eip712_domain};

use crate::primitives::{ChainId, LimitOrder};

sol! {
    struct Order {
        uint256 salt;
        address maker;
        address receiver;
        address makerAsset;
        address takerAsset;
        uint256 makingAmount;
        uint256 takingAmount;
        uint256 makerTraits;
    }
}

const ROUTER_NAME: &str = "1inch Aggregation Router";
const ROUTER_VERSION: &str = "6";
const ROUTER_ADDRESS: Address = address!("0x111111125421cA6dc452d289314280a0f8842A65");

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("order field {field} is not a valid number: {value:?}")]
    BadNumber { field: &'static str, value: String },
    #[error("order field {field} is not a valid address: {value:?}")]
    BadAddress { field: &'static str, value: String },
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, HashError> {
    U256::from_str(value.trim()).map_err(|_| HashError::BadNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, HashError> {
    value.trim().parse().map_err(|_| HashError::BadNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, HashError> {
    Address::from_str(value.trim()).map_err(|_| HashError::BadAddress {
        field,
        value: value.to_string(),
    })
}

/// Hash an order under its source chain's canonicalization.
pub fn order_hash(chain_id: ChainId, order: &LimitOrder) -> Result<B256, HashError> {
    match chain_id {
        ChainId::Evm(id) => evm_order_hash(id, order),
        ChainId::Aptos => move_order_hash(order),
    }
}

fn evm_order_hash(chain_id: u64, order: &LimitOrder) -> Result<B256, HashError> {
    let typed = Order {
        salt: parse_u256("salt", &order.salt)?,
        maker: parse_address("maker", &order.maker)?,
        receiver: parse_address("receiver", &order.receiver)?,
        makerAsset: parse_address("makerAsset", &order.maker_asset)?,
        takerAsset: parse_address("takerAsset", &order.taker_asset)?,
        makingAmount: parse_u256("makingAmount", &order.making_amount)?,
        takingAmount: parse_u256("takingAmount", &order.taking_amount)?,
        makerTraits: parse_u256("makerTraits", &order.maker_traits)?,
    };

    let domain = eip712_domain! {
        name: ROUTER_NAME,
        version: ROUTER_VERSION,
        chain_id: chain_id,
        verifying_contract: ROUTER_ADDRESS,
    };

    Ok(typed.eip712_signing_hash(&domain))
}

/// Canonical serialization matching the Move-side escrow module:
/// big-endian salt bytes, 20-byte maker and receiver, little-endian u64
/// amounts, keccak-256 over the concatenation.
fn move_order_hash(order: &LimitOrder) -> Result<B256, HashError> {
    let salt = parse_u256("salt", &order.salt)?;
    let maker = parse_raw_address("maker", &order.maker)?;
    let receiver = parse_raw_address("receiver", &order.receiver)?;
    let making = parse_u64("makingAmount", &order.making_amount)?;
    let taking = parse_u64("takingAmount", &order.taking_amount)?;

    let mut bytes = Vec::with_capacity(32 + 20 + 20 + 8 + 8);
    bytes.extend_from_slice(&salt.to_be_bytes_trimmed_vec());
    bytes.extend_from_slice(&maker);
    bytes.extend_from_slice(&receiver);
    bytes.extend_from_slice(&making.to_le_bytes());
    bytes.extend_from_slice(&taking.to_le_bytes());

    Ok(keccak256(&bytes))
}

fn parse_raw_address(field: &'static str, value: &str) -> Result<[u8; 20], HashError> {
    let stripped = value.trim().trim_start_matches("0x");
    let decoded = hex::decode(stripped).map_err(|_| HashError::BadAddress {
        field,
        value: value.to_string(),
    })?;
    decoded.try_into().map_err(|_| HashError::BadAddress {
        field,
        value: value.to_string(),
    })
}

/// Canonical wire form of a 32-byte hash: 0x-prefixed lowercase hex.
pub fn to_hex(hash: B256) -> String {
    format!("0x{}", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> LimitOrder {
        LimitOrder {
            salt: "123456789".to_string(),
            maker: "0x1111111111111111111111111111111111111111".to_string(),
            receiver: "0x2222222222222222222222222222222222222222".to_string(),
            maker_asset: "0x3333333333333333333333333333333333333333".to_string(),
            taker_asset: "0x4444444444444444444444444444444444444444".to_string(),
            making_amount: "1000000000000000000".to_string(),
            taking_amount: "2500000000".to_string(),
            maker_traits: "0".to_string(),
        }
    }

    #[test]
    fn evm_hash_is_deterministic() {
        let order = sample_order();
        let a = order_hash(ChainId::Evm(1), &order).unwrap();
        let b = order_hash(ChainId::Evm(1), &order).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn evm_hash_depends_on_chain_id() {
        let order = sample_order();
        let mainnet = order_hash(ChainId::Evm(1), &order).unwrap();
        let polygon = order_hash(ChainId::Evm(137), &order).unwrap();
        assert_ne!(mainnet, polygon);
    }

    #[test]
    fn evm_hash_depends_on_salt() {
        let order = sample_order();
        let mut other = sample_order();
        other.salt = "987654321".to_string();
        assert_ne!(
            order_hash(ChainId::Evm(1), &order).unwrap(),
            order_hash(ChainId::Evm(1), &other).unwrap()
        );
    }

    #[test]
    fn move_hash_matches_manual_serialization() {
        let order = sample_order();
        let hash = order_hash(ChainId::Aptos, &order).unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&U256::from(123456789u64).to_be_bytes_trimmed_vec());
        bytes.extend_from_slice(&[0x11; 20]);
        bytes.extend_from_slice(&[0x22; 20]);
        bytes.extend_from_slice(&1_000_000_000_000_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&2_500_000_000u64.to_le_bytes());

        assert_eq!(hash, keccak256(&bytes));
    }

    #[test]
    fn malformed_amount_is_rejected() {
        let mut order = sample_order();
        order.making_amount = "not-a-number".to_string();
        let err = order_hash(ChainId::Evm(1), &order).unwrap_err();
        assert!(matches!(
            err,
            HashError::BadNumber {
                field: "makingAmount",
                ..
            }
        ));
    }

    #[test]
    fn malformed_address_is_rejected() {
        let mut order = sample_order();
        order.maker = "0x123".to_string();
        assert!(order_hash(ChainId::Evm(1), &order).is_err());
        assert!(order_hash(ChainId::Aptos, &order).is_err());
    }

    #[test]
    fn hex_encoding_is_lowercase_prefixed() {
        let hash = order_hash(ChainId::Evm(1), &sample_order()).unwrap();
        let encoded = to_hex(hash);
        assert!(encoded.starts_with("0x"));
        assert_eq!(encoded.len(), 66);
        assert_eq!(encoded, encoded.to_lowercase());
    }
}
