//! EVM adapter over an alloy JSON-RPC provider.
//!
//! Escrow deployments are located by decoding the factory's
//! `SrcEscrowCreated` / `DstEscrowCreated` logs out of the transaction
//! receipt. The source escrow address is not in the event; it is derived by
//! calling `addressOfEscrowSrc` on the emitting factory.

use std::str::FromStr;

use alloy::consensus::TxReceipt;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::sol;
use alloy::transports::http::Http;
use anyhow::Context;
use async_trait::async_trait;

use crate::chains::{
    AdapterError, ChainClient, DstComplement, DstEscrowObservation, EscrowImmutables,
    SrcEscrowObservation,
};
use crate::primitives::EscrowTimelocks;

sol! {
    #[derive(Debug)]
    struct Immutables {
        bytes32 orderHash;
        bytes32 hashlock;
        uint256 maker;
        uint256 taker;
        uint256 token;
        uint256 amount;
        uint256 safetyDeposit;
        uint256 timelocks;
    }

    #[derive(Debug)]
    struct DstImmutablesComplement {
        uint256 maker;
        uint256 amount;
        uint256 token;
        uint256 safetyDeposit;
        uint256 chainId;
    }

    #[derive(Debug)]
    event SrcEscrowCreated(Immutables srcImmutables, DstImmutablesComplement dstImmutablesComplement);

    #[derive(Debug)]
    event DstEscrowCreated(address escrow, bytes32 hashlock, uint256 taker);

    #[sol(rpc)]
    contract IEscrowFactory {
        function addressOfEscrowSrc(Immutables calldata immutables) external view returns (address);
    }

    #[sol(rpc)]
    contract IErc20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

#[derive(Debug, Clone)]
pub struct EvmChain {
    provider: RootProvider,
}

impl EvmChain {
    pub fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        let transport = Http::new(rpc_url.parse().context("invalid EVM RPC url")?);
        Ok(Self {
            provider: RootProvider::new(RpcClient::new(transport, false)),
        })
    }

    async fn block_timestamp(&self, block_number: Option<u64>) -> Result<u64, AdapterError> {
        let number = block_number
            .ok_or_else(|| AdapterError::ChainUnreachable(anyhow::anyhow!("receipt has no block number")))?;
        let block = self
            .provider
            .get_block(number.into())
            .await
            .context("fetching block")?
            .ok_or_else(|| AdapterError::ChainUnreachable(anyhow::anyhow!("block {number} not found")))?;
        Ok(block.header.timestamp)
    }

    async fn receipt(
        &self,
        tx_hash: &str,
    ) -> Result<alloy::rpc::types::TransactionReceipt, AdapterError> {
        let hash = B256::from_str(tx_hash.trim())
            .map_err(|_| AdapterError::EventNotFound(tx_hash.to_string()))?;
        self.provider
            .get_transaction_receipt(hash)
            .await
            .context("fetching receipt")?
            .ok_or_else(|| AdapterError::EventNotFound(tx_hash.to_string()))
    }
}

/// The factory packs addresses as uint256; the low 20 bytes are the address.
fn addr_from_u256(value: U256) -> String {
    let bytes = value.to_be_bytes::<32>();
    format!("0x{}", hex::encode(&bytes[12..]))
}

fn addr_to_hex(addr: Address) -> String {
    format!("0x{}", hex::encode(addr))
}

#[async_trait]
impl ChainClient for EvmChain {
    async fn src_escrow_created(
        &self,
        tx_hash: &str,
    ) -> Result<SrcEscrowObservation, AdapterError> {
        let receipt = self.receipt(tx_hash).await?;

        for log in receipt.inner.logs() {
            let Ok(decoded) = log.log_decode::<SrcEscrowCreated>() else {
                continue;
            };
            let event = decoded.inner.data;
            let factory = log.address();

            let escrow = IEscrowFactory::new(factory, self.provider.clone())
                .addressOfEscrowSrc(event.srcImmutables.clone())
                .call()
                .await
                .context("deriving src escrow address")?;

            let block_time = self.block_timestamp(receipt.block_number).await?;
            let immutables = EscrowImmutables {
                order_hash: event.srcImmutables.orderHash,
                hashlock: event.srcImmutables.hashlock,
                maker: addr_from_u256(event.srcImmutables.maker),
                taker: addr_from_u256(event.srcImmutables.taker),
                token: addr_from_u256(event.srcImmutables.token),
                amount: event.srcImmutables.amount,
                safety_deposit: event.srcImmutables.safetyDeposit,
                timelocks: EscrowTimelocks::unpack_src(event.srcImmutables.timelocks),
            };
            let dst_complement = DstComplement {
                maker: addr_from_u256(event.dstImmutablesComplement.maker),
                amount: event.dstImmutablesComplement.amount,
                token: addr_from_u256(event.dstImmutablesComplement.token),
                safety_deposit: event.dstImmutablesComplement.safetyDeposit,
                chain_id: event
                    .dstImmutablesComplement
                    .chainId
                    .try_into()
                    .unwrap_or(u64::MAX),
            };

            return Ok(SrcEscrowObservation {
                immutables,
                dst_complement,
                escrow_address: addr_to_hex(escrow),
                block_time,
            });
        }

        Err(AdapterError::EventNotFound(tx_hash.to_string()))
    }

    async fn dst_escrow_created(
        &self,
        tx_hash: &str,
    ) -> Result<DstEscrowObservation, AdapterError> {
        let receipt = self.receipt(tx_hash).await?;

        for log in receipt.inner.logs() {
            let Ok(decoded) = log.log_decode::<DstEscrowCreated>() else {
                continue;
            };
            let event = decoded.inner.data;
            let block_time = self.block_timestamp(receipt.block_number).await?;

            return Ok(DstEscrowObservation {
                escrow: addr_to_hex(event.escrow),
                hashlock: event.hashlock,
                taker: addr_from_u256(event.taker),
                block_time,
            });
        }

        Err(AdapterError::EventNotFound(tx_hash.to_string()))
    }

    async fn token_balance(&self, token: &str, account: &str) -> Result<U256, AdapterError> {
        let token = Address::from_str(token.trim())
            .map_err(|e| AdapterError::ChainUnreachable(anyhow::anyhow!("bad token address: {e}")))?;
        let account = Address::from_str(account.trim())
            .map_err(|e| AdapterError::ChainUnreachable(anyhow::anyhow!("bad account address: {e}")))?;

        let balance = IErc20::new(token, self.provider.clone())
            .balanceOf(account)
            .call()
            .await
            .context("erc20 balanceOf")?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint256_packed_addresses_unpack_to_low_20_bytes() {
        let addr = Address::from_str("0x1111111111111111111111111111111111111111").unwrap();
        let packed = U256::from_be_bytes({
            let mut bytes = [0u8; 32];
            bytes[12..].copy_from_slice(addr.as_slice());
            bytes
        });
        assert_eq!(
            addr_from_u256(packed),
            "0x1111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn address_hex_is_lowercase() {
        let addr = Address::from_str("0xAbCdEf0123456789aBcDeF0123456789abcdef01").unwrap();
        assert_eq!(addr_to_hex(addr), "0xabcdef0123456789abcdef0123456789abcdef01");
    }
}
