use std::sync::{Mutex, PoisonError};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Coordination-level chain id for Aptos.
///
/// Aptos mainnet reports chain id 1, which collides with Ethereum mainnet,
/// so orders address the Move side through a reserved id instead.
pub const APTOS_CHAIN_ID: u64 = 1000;

/// A chain reference as carried in orders and quotes.
///
/// EVM networks keep their numeric id; the Move side is a distinct variant so
/// family checks are a `match` instead of a magic-number comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainId {
    Evm(u64),
    Aptos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    Evm,
    Move,
}

impl ChainId {
    pub fn from_wire(id: u64) -> Self {
        if id == APTOS_CHAIN_ID {
            ChainId::Aptos
        } else {
            ChainId::Evm(id)
        }
    }

    pub fn wire(&self) -> u64 {
        match self {
            ChainId::Evm(id) => *id,
            ChainId::Aptos => APTOS_CHAIN_ID,
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Evm(_) => ChainFamily::Evm,
            ChainId::Aptos => ChainFamily::Move,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, ChainId::Evm(_))
    }
}

impl Serialize for ChainId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.wire())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ChainId::from_wire(u64::deserialize(deserializer)?))
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "evm:{id}"),
            ChainId::Aptos => write!(f, "aptos"),
        }
    }
}

/// Limit order data as signed by the maker.
///
/// All amounts are decimal strings so one schema spans u256 (EVM) and u64
/// (Move) asset amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrder {
    /// Some unique value so orders with identical parameters still hash apart.
    pub salt: String,
    /// Address of the account creating the order on the source chain.
    pub maker: String,
    /// Address receiving the filled amount on the destination chain.
    #[serde(default = "default_receiver")]
    pub receiver: String,
    /// Identifier of the asset offered by the maker on the source chain.
    pub maker_asset: String,
    /// Identifier of the asset requested by the maker on the destination chain.
    pub taker_asset: String,
    /// Amount of the maker asset being offered.
    pub making_amount: String,
    /// Amount of the taker asset being requested.
    pub taking_amount: String,
    /// Packed flags: multiple fills, partial fills, nonce, deadline etc.
    #[serde(default = "default_maker_traits")]
    pub maker_traits: String,
}

fn default_receiver() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_maker_traits() -> String {
    "0".to_string()
}

/// A signed cross chain order as submitted by the maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Source chain id; determines the hashing family.
    pub src_chain_id: ChainId,
    /// The limit order the maker signed.
    pub limit_order: LimitOrder,
    /// Signature over the order typed data.
    pub signature: String,
    /// Id of the quote this order was built from.
    pub quote_id: String,
    /// ABI encoded extension calldata.
    pub extension: String,
    /// keccak256(secret) per fill slot; more than one entry enables
    /// partial fills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_hashes: Option<Vec<String>>,
}

impl Order {
    pub fn order_type(&self) -> OrderType {
        match &self.secret_hashes {
            Some(hashes) if hashes.len() > 1 => OrderType::MultipleFills,
            _ => OrderType::SingleFill,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "single_fill")]
    SingleFill,
    #[serde(rename = "multiple_fills")]
    MultipleFills,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::SingleFill => write!(f, "single_fill"),
            OrderType::MultipleFills => write!(f, "multiple_fills"),
        }
    }
}

/// Lifecycle of an order inside the coordinator.
///
/// `Pending → Observed → Ready` is driven by chain verification; the terminal
/// states are informational only, the coordinator never settles on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Pending,
    Observed,
    Ready,
    Settled,
    Expired,
    Cancelled,
}

/// Signal that a particular (order, secret index) is safe for the maker to
/// reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyFill {
    /// Sequence number of the secret to submit.
    pub idx: u64,
    /// Transaction that deployed the source chain escrow.
    pub src_tx_hash: String,
    /// Transaction that deployed the destination chain escrow.
    pub dst_tx_hash: String,
}

/// Response body of the ready-to-accept-secret-fills endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyFills {
    pub fills: Vec<ReadyFill>,
}

/// One order's pending fills in the all-orders listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyFillsForOrder {
    pub order_hash: String,
    pub maker_address: String,
    pub fills: Vec<ReadyFill>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllReadyFills {
    pub orders: Vec<ReadyFillsForOrder>,
}

/// A secret the maker has revealed, indexed against the order's hash list
/// when it matches one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedSecret {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idx: Option<u64>,
    pub secret: String,
}

/// Everything a resolver needs to withdraw once secrets are out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedSecrets {
    pub order_hash: String,
    pub order_type: OrderType,
    pub secrets: Vec<SubmittedSecret>,
    pub secret_hashes: Vec<String>,
}

/// A secret revealed by the maker for one fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretInput {
    pub order_hash: String,
    pub secret: String,
}

/// Query parameters of the quote endpoint, forwarded upstream verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Id of the source chain.
    pub src_chain: u64,
    /// Id of the destination chain.
    pub dst_chain: u64,
    /// Address of the source token on the source chain.
    pub src_token_address: String,
    /// Address of the destination token on the destination chain.
    pub dst_token_address: String,
    /// Amount of the source token to swap.
    pub amount: String,
    /// Wallet that will create the order.
    pub wallet_address: String,
}

/// Auction curve point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionPoint {
    /// Delay in seconds from the previous point or auction start.
    pub delay: u64,
    /// Rate bump from the order minimum taker amount.
    pub coefficient: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasCostConfig {
    pub gas_bump_estimate: u64,
    pub gas_price_estimate: String,
}

/// One preset a maker can choose when building an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub auction_duration: u64,
    pub start_auction_in: u64,
    pub initial_rate_bump: u64,
    pub auction_start_amount: String,
    pub start_amount: String,
    pub auction_end_amount: String,
    #[serde(default)]
    pub exclusive_resolver: Option<serde_json::Value>,
    pub cost_in_dst_token: String,
    pub points: Vec<AuctionPoint>,
    pub allow_partial_fills: bool,
    pub allow_multiple_fills: bool,
    pub gas_cost: GasCostConfig,
    pub secrets_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePresets {
    pub fast: Preset,
    pub medium: Preset,
    pub slow: Preset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Preset>,
}

impl QuotePresets {
    pub fn by_name(&self, name: &str) -> &Preset {
        match name {
            "medium" => &self.medium,
            "slow" => &self.slow,
            "custom" => self.custom.as_ref().unwrap_or(&self.fast),
            _ => &self.fast,
        }
    }
}

/// The seven escrow timelock durations, in seconds, as quoted upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLocks {
    pub src_withdrawal: u64,
    pub src_public_withdrawal: u64,
    pub src_cancellation: u64,
    pub src_public_cancellation: u64,
    pub dst_withdrawal: u64,
    pub dst_public_withdrawal: u64,
    pub dst_cancellation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub src_token: String,
    pub dst_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairCurrency {
    pub usd: TokenPair,
}

/// Quote bundle as returned by the upstream provider, plus the id this
/// coordinator assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Generated per fetch; must be passed back with the order.
    #[serde(default)]
    pub quote_id: Option<String>,
    pub src_token_amount: String,
    pub dst_token_amount: String,
    pub presets: QuotePresets,
    /// Escrow factory contract address on the source chain.
    pub src_escrow_factory: String,
    /// Escrow factory contract address on the destination chain.
    pub dst_escrow_factory: String,
    /// Current resolver whitelist.
    pub whitelist: Vec<String>,
    pub time_locks: TimeLocks,
    pub src_safety_deposit: String,
    pub dst_safety_deposit: String,
    pub recommended_preset: String,
    pub prices: PairCurrency,
    pub volume: PairCurrency,
}

impl Quote {
    pub fn recommended(&self) -> &Preset {
        self.presets.by_name(&self.recommended_preset)
    }
}

/// A cached quote together with the request it answered.
///
/// The request half is what chain verification checks escrow tokens against.
#[derive(Debug, Clone)]
pub struct QuoteEntry {
    pub quote_id: String,
    pub request: QuoteRequest,
    pub quote: Quote,
}

/// Escrow timelock stages for one side of a swap, unpacked from the on-chain
/// u256 (32-bit stages, deployment timestamp in the top 32 bits).
///
/// Src and Dst escrows expose different stage sets; reading a stage from the
/// wrong side is an error rather than a zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowTimelocks {
    Src {
        withdrawal: u64,
        public_withdrawal: u64,
        cancellation: u64,
        public_cancellation: u64,
    },
    Dst {
        withdrawal: u64,
        public_withdrawal: u64,
        cancellation: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timelock stage {stage} does not exist on the {side} side")]
pub struct TimelockSideError {
    pub stage: &'static str,
    pub side: &'static str,
}

fn stage(packed: U256, index: u8) -> u64 {
    ((packed >> (index as usize * 32)) & U256::from(u32::MAX)).to::<u64>()
}

impl EscrowTimelocks {
    /// Unpack the source-side stages of a packed timelocks word.
    pub fn unpack_src(packed: U256) -> Self {
        EscrowTimelocks::Src {
            withdrawal: stage(packed, 0),
            public_withdrawal: stage(packed, 1),
            cancellation: stage(packed, 2),
            public_cancellation: stage(packed, 3),
        }
    }

    /// Unpack the destination-side stages of a packed timelocks word.
    pub fn unpack_dst(packed: U256) -> Self {
        EscrowTimelocks::Dst {
            withdrawal: stage(packed, 4),
            public_withdrawal: stage(packed, 5),
            cancellation: stage(packed, 6),
        }
    }

    /// Deployment timestamp carried in the top 32 bits of the packed word.
    pub fn deployed_at(packed: U256) -> u64 {
        stage(packed, 7)
    }

    pub fn withdrawal(&self) -> u64 {
        match self {
            EscrowTimelocks::Src { withdrawal, .. } => *withdrawal,
            EscrowTimelocks::Dst { withdrawal, .. } => *withdrawal,
        }
    }

    pub fn cancellation(&self) -> u64 {
        match self {
            EscrowTimelocks::Src { cancellation, .. } => *cancellation,
            EscrowTimelocks::Dst { cancellation, .. } => *cancellation,
        }
    }

    pub fn public_cancellation(&self) -> Result<u64, TimelockSideError> {
        match self {
            EscrowTimelocks::Src {
                public_cancellation,
                ..
            } => Ok(*public_cancellation),
            EscrowTimelocks::Dst { .. } => Err(TimelockSideError {
                stage: "public_cancellation",
                side: "dst",
            }),
        }
    }
}

/// Status snapshot returned by the order status endpoint.
///
/// The auction fields are seeded once, at submission, from the quote's
/// recommended preset; only `status` changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    pub order_hash: String,
    pub status: OrderState,
    pub order: LimitOrder,
    pub extension: String,
    pub points: Vec<AuctionPoint>,
    pub initial_rate_bump: u64,
    /// Unix timestamp in milliseconds.
    pub auction_start_date: u64,
    pub auction_duration: u64,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
    pub src_token_price_usd: String,
    pub dst_token_price_usd: String,
    pub cancel_tx: Option<String>,
    pub src_chain_id: u64,
    pub dst_chain_id: u64,
}

/// Pagination meta for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub total_items: u64,
    pub items_per_page: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

/// One order in the active orders listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrder {
    pub order_hash: String,
    pub quote_id: String,
    pub src_chain_id: u64,
    pub dst_chain_id: u64,
    pub order: LimitOrder,
    pub signature: String,
    pub extension: String,
    pub secret_hashes: Vec<String>,
    pub order_type: OrderType,
    pub status: OrderState,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrders {
    pub meta: Meta,
    pub items: Vec<ActiveOrder>,
}

/// A stored order and everything verification hangs off it.
///
/// Lives behind `Arc` in the order store; `state` and `fills` carry their own
/// locks so verification tasks and HTTP handlers never contend on the store.
#[derive(Debug)]
pub struct OrderEntry {
    pub order_type: OrderType,
    /// 0x-prefixed lowercase hex of the 32-byte order hash.
    pub order_hash: String,
    pub order: Order,
    pub status: OrderStatus,
    state: Mutex<OrderState>,
    fills: Mutex<Vec<ReadyFill>>,
    secrets: Mutex<Vec<SubmittedSecret>>,
}

impl OrderEntry {
    pub fn new(order_hash: String, order: Order, status: OrderStatus) -> Self {
        Self {
            order_type: order.order_type(),
            order_hash,
            order,
            status,
            state: Mutex::new(OrderState::Pending),
            fills: Mutex::new(Vec::new()),
            secrets: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> OrderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the lifecycle forward; transitions never regress.
    pub fn advance(&self, next: OrderState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if next > *state {
            *state = next;
        }
    }

    pub fn append_fills(&self, new_fills: impl IntoIterator<Item = ReadyFill>) {
        let mut fills = self.fills.lock().unwrap_or_else(PoisonError::into_inner);
        fills.extend(new_fills);
    }

    /// Drain-on-poll: swap the fill list out under the lock and hand the old
    /// one to the caller. The replacement keeps half the previous capacity so
    /// writers stay allocation-free on the hot path.
    pub fn drain_fills(&self) -> Vec<ReadyFill> {
        let mut fills = self.fills.lock().unwrap_or_else(PoisonError::into_inner);
        let replacement = Vec::with_capacity(fills.capacity() / 2);
        std::mem::replace(&mut *fills, replacement)
    }

    pub fn pending_fill_count(&self) -> usize {
        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Record a revealed secret, pinning it to the secret-hash index whose
    /// value is keccak256 of the secret bytes, if any.
    pub fn record_secret(&self, secret: &str) {
        let idx = self.secret_index(secret);
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubmittedSecret {
                idx,
                secret: secret.to_string(),
            });
    }

    pub fn submitted_secrets(&self) -> Vec<SubmittedSecret> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn secret_index(&self, secret: &str) -> Option<u64> {
        let bytes = hex::decode(secret.trim_start_matches("0x")).ok()?;
        let hashlock = format!("0x{}", hex::encode(alloy::primitives::keccak256(&bytes)));
        self.order
            .secret_hashes
            .as_deref()?
            .iter()
            .position(|hash| hash.eq_ignore_ascii_case(&hashlock))
            .map(|idx| idx as u64)
    }
}
