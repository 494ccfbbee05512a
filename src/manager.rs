//! State core of the coordinator.
//!
//! Owns the quote and order stores, the resolver broadcaster and the chain
//! clients. Everything async flows through here: order announcement, resolver
//! TXHASH ingestion, on-chain verification, and the delayed transition that
//! marks a fill safe for secret release.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{B256, U256};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::chains::{AdapterError, ChainClient, DstEscrowObservation, SrcEscrowObservation};
use crate::order_hash::to_hex;
use crate::primitives::{
    ChainId, OrderEntry, OrderState, OrderType, QuoteEntry, ReadyFill, TimeLocks,
};
use crate::ttl_store::TtlStore;

/// Wire opcodes of the resolver protocol.
pub const ORDER_FRAME: &str = "BROADC";
pub const SECRET_FRAME: &str = "SECRET";
pub const TX_HASH_FRAME: &str = "TXHASH";

const QUOTE_STORE_CAPACITY: u64 = 10_000;
const ORDER_STORE_CAPACITY: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown event prefix in frame {0:?}")]
    UnknownEvent(String),
    #[error("malformed TXHASH frame, expected `TXHASH <orderHash> <srcTx> <dstTx>`")]
    MalformedTxHash,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("quote {0} not found or expired")]
    QuoteNotFound(String),
}

/// Which verification check rejected an observation. Logged, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mismatch {
    OrderHash,
    SrcAmount,
    SrcMaker,
    SrcToken,
    SrcSafetyDeposit,
    SrcBalance,
    Hashlock,
    DstAmount,
    DstRecipient,
    DstToken,
    DstSafetyDeposit,
    DstBalance,
}

pub struct Manager {
    quotes: TtlStore<QuoteEntry>,
    orders: TtlStore<Arc<OrderEntry>>,
    broadcaster: Broadcaster,
    evm: Arc<dyn ChainClient>,
    aptos: Arc<dyn ChainClient>,
    quote_ttl: Duration,
    release_buffer: Duration,
}

impl Manager {
    pub fn new(
        evm: Arc<dyn ChainClient>,
        aptos: Arc<dyn ChainClient>,
        quote_ttl: Duration,
        release_buffer: Duration,
    ) -> Self {
        let quotes = TtlStore::new(
            QUOTE_STORE_CAPACITY,
            Arc::new(|key: &str, _: &QuoteEntry| {
                debug!(quote_id = key, "quote expired");
            }),
            Arc::new(|_: &str, _: &QuoteEntry| {}),
        );
        let orders = TtlStore::new(
            ORDER_STORE_CAPACITY,
            Arc::new(|key: &str, entry: &Arc<OrderEntry>| {
                entry.advance(OrderState::Expired);
                info!(order_hash = key, "order expired");
            }),
            Arc::new(|key: &str, _: &Arc<OrderEntry>| {
                debug!(order_hash = key, "order evicted");
            }),
        );

        Self {
            quotes,
            orders,
            broadcaster: Broadcaster::new(),
            evm,
            aptos,
            quote_ttl,
            release_buffer,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub async fn set_quote(&self, entry: QuoteEntry) {
        let key = entry.quote_id.clone();
        self.quotes.set(&key, entry, self.quote_ttl).await;
    }

    pub async fn get_quote(&self, quote_id: &str) -> Option<QuoteEntry> {
        self.quotes.get(quote_id).await
    }

    /// Store an order for as long as its source-side public cancellation
    /// window is open. Re-submitting the same hash overwrites the entry.
    pub async fn set_order(&self, entry: OrderEntry) -> Result<Arc<OrderEntry>, OrderError> {
        let quote = self
            .get_quote(&entry.order.quote_id)
            .await
            .ok_or_else(|| OrderError::QuoteNotFound(entry.order.quote_id.clone()))?;

        let ttl = Duration::from_secs(quote.quote.time_locks.src_public_cancellation);
        let entry = Arc::new(entry);
        let key = entry.order_hash.clone();
        self.orders.set(&key, entry.clone(), ttl).await;
        Ok(entry)
    }

    pub async fn get_order(&self, order_hash: &str) -> Option<Arc<OrderEntry>> {
        self.orders.get(order_hash).await
    }

    /// Live orders, oldest first.
    pub fn active_orders(&self) -> Vec<Arc<OrderEntry>> {
        let mut entries: Vec<_> = self
            .orders
            .entries()
            .into_iter()
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|entry| entry.status.created_at);
        entries
    }

    /// Announce a freshly submitted order to every connected resolver.
    pub fn handle_order_event(&self, entry: &OrderEntry) {
        let json = match serde_json::to_string(&entry.order) {
            Ok(json) => json,
            Err(e) => {
                warn!(order_hash = entry.order_hash, error = %e, "order serialization failed");
                return;
            }
        };
        let delivered = self.broadcaster.broadcast(&format!("{ORDER_FRAME} {json}"));
        debug!(
            order_hash = entry.order_hash,
            delivered, "order announced to resolvers"
        );
    }

    /// Relay a maker-revealed secret to every connected resolver.
    pub fn handle_secret_event(&self, order_hash: &str, secret: &str) {
        let delivered = self
            .broadcaster
            .broadcast(&format!("{SECRET_FRAME} {order_hash} {secret}"));
        info!(order_hash, delivered, "secret relayed to resolvers");
    }

    /// Parse one inbound resolver frame.
    ///
    /// Recognized frames spawn their handling and return immediately so a
    /// slow RPC never stalls the connection pump.
    pub fn handle_receive_event(self: &Arc<Self>, payload: &str) -> Result<(), WireError> {
        let mut parts = payload.split_ascii_whitespace();
        match parts.next() {
            Some(TX_HASH_FRAME) => {
                let (Some(order_hash), Some(src_tx), Some(dst_tx), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(WireError::MalformedTxHash);
                };

                let manager = Arc::clone(self);
                let order_hash = order_hash.to_lowercase();
                let src_tx = src_tx.to_string();
                let dst_tx = dst_tx.to_string();
                tokio::spawn(async move {
                    manager.handle_tx_hash_event(&order_hash, &src_tx, &dst_tx).await;
                });
                Ok(())
            }
            _ => Err(WireError::UnknownEvent(
                payload.chars().take(48).collect(),
            )),
        }
    }

    /// Verify a resolver-reported escrow pair and, on success, schedule the
    /// secret-release transition once both withdrawal locks have opened.
    ///
    /// Every failure path drops the event without a reply; re-sending TXHASH
    /// is the resolver's retry primitive.
    pub async fn handle_tx_hash_event(self: &Arc<Self>, order_hash: &str, src_tx: &str, dst_tx: &str) {
        let Some(entry) = self.orders.get(order_hash).await else {
            info!(order_hash, "TXHASH for unknown or expired order");
            return;
        };
        let Some(quote) = self.quotes.get(&entry.order.quote_id).await else {
            info!(
                order_hash,
                quote_id = entry.order.quote_id,
                "TXHASH for order whose quote expired"
            );
            return;
        };

        let (src_client, dst_client) = self.clients_for(entry.order.src_chain_id);

        let src_obs = match src_client.src_escrow_created(src_tx).await {
            Ok(observation) => observation,
            Err(e) => return drop_adapter_error(order_hash, src_tx, "src", e),
        };
        let dst_obs = match dst_client.dst_escrow_created(dst_tx).await {
            Ok(observation) => observation,
            Err(e) => return drop_adapter_error(order_hash, dst_tx, "dst", e),
        };

        let src_balance = match src_client
            .token_balance(&src_obs.immutables.token, &src_obs.escrow_address)
            .await
        {
            Ok(balance) => balance,
            Err(e) => return drop_adapter_error(order_hash, src_tx, "src balance", e),
        };
        let dst_balance = match dst_client
            .token_balance(&quote.request.dst_token_address, &dst_obs.escrow)
            .await
        {
            Ok(balance) => balance,
            Err(e) => return drop_adapter_error(order_hash, dst_tx, "dst balance", e),
        };

        if let Err(mismatch) = verify(&entry, &quote, &src_obs, src_balance, &dst_obs, dst_balance)
        {
            debug!(order_hash, ?mismatch, "escrow verification failed, event dropped");
            return;
        }

        entry.advance(OrderState::Observed);

        let delay = self.release_delay(
            &quote.quote.time_locks,
            src_obs.block_time,
            dst_obs.block_time,
        );
        info!(
            order_hash,
            delay_secs = delay.as_secs(),
            "escrows verified, secret release scheduled"
        );

        let hashlock = src_obs.immutables.hashlock;
        if delay.is_zero() {
            self.allow_secret_release(order_hash, hashlock, src_tx, dst_tx).await;
        } else {
            let manager = Arc::clone(self);
            let order_hash = order_hash.to_string();
            let src_tx = src_tx.to_string();
            let dst_tx = dst_tx.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                manager
                    .allow_secret_release(&order_hash, hashlock, &src_tx, &dst_tx)
                    .await;
            });
        }
    }

    /// Record the ready fills for a verified escrow pair.
    ///
    /// Runs from a timer, so the order may have been evicted in the meantime;
    /// a missing entry is a silent no-op. Duplicate fills are harmless,
    /// resolvers key on (orderHash, idx).
    pub async fn allow_secret_release(
        &self,
        order_hash: &str,
        hashlock: B256,
        src_tx: &str,
        dst_tx: &str,
    ) {
        let Some(entry) = self.orders.get(order_hash).await else {
            debug!(order_hash, "order gone before secret release");
            return;
        };

        let fill = |idx: u64| ReadyFill {
            idx,
            src_tx_hash: src_tx.to_string(),
            dst_tx_hash: dst_tx.to_string(),
        };
        let fills: Vec<ReadyFill> = match entry.order_type {
            OrderType::MultipleFills => {
                let hashlock_hex = to_hex(hashlock);
                entry
                    .order
                    .secret_hashes
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .enumerate()
                    .filter(|(_, hash)| hash.eq_ignore_ascii_case(&hashlock_hex))
                    .map(|(idx, _)| fill(idx as u64))
                    .collect()
            }
            OrderType::SingleFill => vec![fill(0)],
        };

        if fills.is_empty() {
            debug!(order_hash, "observed hashlock matches no secret slot");
            return;
        }

        let count = fills.len();
        entry.append_fills(fills);
        entry.advance(OrderState::Ready);
        info!(order_hash, count, "fills ready for secret submission");
    }

    /// Atomically hand out and clear the order's ready fills.
    pub async fn drain_ready_fills(&self, order_hash: &str) -> Option<Vec<ReadyFill>> {
        let entry = self.orders.get(order_hash).await?;
        Some(entry.drain_fills())
    }

    /// Drain both stores and disconnect every subscriber.
    pub async fn close(&self) {
        self.orders.drain().await;
        self.quotes.drain().await;
        self.broadcaster.close();
    }

    fn clients_for(&self, src_chain: ChainId) -> (&Arc<dyn ChainClient>, &Arc<dyn ChainClient>) {
        if src_chain.is_evm() {
            (&self.evm, &self.aptos)
        } else {
            (&self.aptos, &self.evm)
        }
    }

    /// Time until both withdrawal locks have opened, relative to each side's
    /// block timestamp, plus a fixed buffer. A side already past its lock
    /// contributes zero.
    fn release_delay(&self, timelocks: &TimeLocks, src_ts: u64, dst_ts: u64) -> Duration {
        let now = Utc::now().timestamp().max(0) as u64;
        let remaining =
            |withdrawal: u64, ts: u64| withdrawal.saturating_sub(now.saturating_sub(ts));

        let wait = remaining(timelocks.src_withdrawal, src_ts)
            .max(remaining(timelocks.dst_withdrawal, dst_ts));
        Duration::from_secs(wait) + self.release_buffer
    }
}

fn drop_adapter_error(order_hash: &str, tx: &str, side: &str, error: AdapterError) {
    match error {
        AdapterError::ChainUnreachable(e) => {
            warn!(order_hash, tx, side, error = %e, "chain unreachable, TXHASH dropped");
        }
        AdapterError::EventNotFound(tx) => {
            debug!(order_hash, tx, side, "escrow event not found, TXHASH dropped");
        }
    }
}

/// Cross-check both observed escrows against the stored order and quote.
fn verify(
    entry: &OrderEntry,
    quote: &QuoteEntry,
    src: &SrcEscrowObservation,
    src_balance: U256,
    dst: &DstEscrowObservation,
    dst_balance: U256,
) -> Result<(), Mismatch> {
    let order = &entry.order.limit_order;

    if !to_hex(src.immutables.order_hash).eq_ignore_ascii_case(&entry.order_hash) {
        return Err(Mismatch::OrderHash);
    }

    let making_amount =
        parse_amount(&order.making_amount).ok_or(Mismatch::SrcAmount)?;
    if src.immutables.amount != making_amount {
        return Err(Mismatch::SrcAmount);
    }
    if !src.immutables.maker.eq_ignore_ascii_case(&order.maker) {
        return Err(Mismatch::SrcMaker);
    }
    if !src
        .immutables
        .token
        .eq_ignore_ascii_case(&quote.request.src_token_address)
    {
        return Err(Mismatch::SrcToken);
    }
    let safety_deposit =
        parse_amount(&quote.quote.src_safety_deposit).ok_or(Mismatch::SrcSafetyDeposit)?;
    if src.immutables.safety_deposit != safety_deposit {
        return Err(Mismatch::SrcSafetyDeposit);
    }
    if src_balance != making_amount {
        return Err(Mismatch::SrcBalance);
    }

    if dst.hashlock != src.immutables.hashlock {
        return Err(Mismatch::Hashlock);
    }

    // destination side: the source escrow event commits to the destination
    // parameters, so the complement is checked against the order and quote
    // just like the source immutables
    let complement = &src.dst_complement;
    let taking_amount = parse_amount(&order.taking_amount).ok_or(Mismatch::DstAmount)?;
    if complement.amount != taking_amount {
        return Err(Mismatch::DstAmount);
    }
    if !complement.maker.eq_ignore_ascii_case(&order.receiver) {
        return Err(Mismatch::DstRecipient);
    }
    let dst_safety_deposit =
        parse_amount(&quote.quote.dst_safety_deposit).ok_or(Mismatch::DstSafetyDeposit)?;
    if complement.safety_deposit != dst_safety_deposit {
        return Err(Mismatch::DstSafetyDeposit);
    }
    // an EVM source event packs the destination token as uint256, which
    // cannot carry a Move coin type; the identifier is only comparable when
    // the destination is itself an EVM chain
    if !entry.order.src_chain_id.is_evm()
        && !complement
            .token
            .eq_ignore_ascii_case(&quote.request.dst_token_address)
    {
        return Err(Mismatch::DstToken);
    }
    if dst_balance != taking_amount {
        return Err(Mismatch::DstBalance);
    }

    Ok(())
}

fn parse_amount(value: &str) -> Option<U256> {
    use std::str::FromStr;
    U256::from_str(value.trim()).ok()
}
