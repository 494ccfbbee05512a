//! Read-only facades over the two chains.
//!
//! Adapters resolve resolver-reported transaction hashes into parsed
//! escrow-creation events plus block timestamps, and answer balance queries.
//! They never sign or send anything.

pub mod aptos;
pub mod evm;

use alloy::primitives::{B256, U256};
use async_trait::async_trait;

use crate::primitives::EscrowTimelocks;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The transaction exists but does not carry the expected escrow event.
    #[error("no escrow event in transaction {0}")]
    EventNotFound(String),
    /// Transport or RPC failure; the resolver re-sends TXHASH to retry.
    #[error(transparent)]
    ChainUnreachable(#[from] anyhow::Error),
}

/// Escrow parameters pinned at deployment, shared by both chains.
#[derive(Debug, Clone)]
pub struct EscrowImmutables {
    pub order_hash: B256,
    pub hashlock: B256,
    pub maker: String,
    pub taker: String,
    pub token: String,
    pub amount: U256,
    pub safety_deposit: U256,
    pub timelocks: EscrowTimelocks,
}

/// Destination-side parameters the source escrow commits to.
#[derive(Debug, Clone)]
pub struct DstComplement {
    pub maker: String,
    pub amount: U256,
    pub token: String,
    pub safety_deposit: U256,
    pub chain_id: u64,
}

/// A parsed source-escrow deployment.
#[derive(Debug, Clone)]
pub struct SrcEscrowObservation {
    pub immutables: EscrowImmutables,
    pub dst_complement: DstComplement,
    /// Deterministic escrow address derived by the factory.
    pub escrow_address: String,
    /// Block timestamp, unix seconds.
    pub block_time: u64,
}

/// A parsed destination-escrow deployment.
#[derive(Debug, Clone)]
pub struct DstEscrowObservation {
    pub escrow: String,
    pub hashlock: B256,
    pub taker: String,
    /// Block timestamp, unix seconds.
    pub block_time: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Resolve a source-escrow deployment transaction.
    async fn src_escrow_created(&self, tx_hash: &str)
    -> Result<SrcEscrowObservation, AdapterError>;

    /// Resolve a destination-escrow deployment transaction.
    async fn dst_escrow_created(&self, tx_hash: &str)
    -> Result<DstEscrowObservation, AdapterError>;

    /// Current balance of `account` in `token` base units.
    async fn token_balance(&self, token: &str, account: &str) -> Result<U256, AdapterError>;
}
