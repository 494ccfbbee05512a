//! Aptos adapter over the fullnode REST API.
//!
//! Move escrow deployments are located by scanning the transaction's emitted
//! events for the escrow module's `SrcEscrowCreated` / `DstEscrowCreated`
//! types. Event fields mirror the EVM factory semantics; amounts arrive as
//! decimal strings because the JSON API renders u64/u128 that way.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{B256, U256};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use crate::chains::{
    AdapterError, ChainClient, DstComplement, DstEscrowObservation, EscrowImmutables,
    SrcEscrowObservation,
};
use crate::primitives::EscrowTimelocks;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SRC_EVENT_SUFFIX: &str = "::escrow_factory::SrcEscrowCreated";
const DST_EVENT_SUFFIX: &str = "::escrow_factory::DstEscrowCreated";
const BALANCE_VIEW_FUNCTION: &str = "0x1::coin::balance";

#[derive(Debug, Deserialize)]
struct Transaction {
    /// Microseconds since epoch, rendered as a decimal string.
    timestamp: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SrcEscrowCreatedData {
    order_hash: String,
    hashlock: String,
    maker: String,
    taker: String,
    token: String,
    amount: String,
    safety_deposit: String,
    timelocks: String,
    escrow: String,
    dst_maker: String,
    dst_amount: String,
    dst_token: String,
    dst_safety_deposit: String,
    dst_chain_id: String,
}

#[derive(Debug, Deserialize)]
struct DstEscrowCreatedData {
    escrow: String,
    hashlock: String,
    taker: String,
}

#[derive(Debug, Clone)]
pub struct AptosChain {
    http: reqwest::Client,
    base_url: String,
}

impl AptosChain {
    pub fn new(rpc_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building Aptos HTTP client")?;
        Ok(Self {
            http,
            base_url: rpc_url.trim_end_matches('/').to_string(),
        })
    }

    async fn transaction(&self, tx_hash: &str) -> Result<Transaction, AdapterError> {
        let url = format!("{}/v1/transactions/by_hash/{}", self.base_url, tx_hash.trim());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("fetching Aptos transaction")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AdapterError::EventNotFound(tx_hash.to_string()));
        }
        if !response.status().is_success() {
            return Err(AdapterError::ChainUnreachable(anyhow::anyhow!(
                "fullnode returned {}",
                response.status()
            )));
        }

        let tx: Transaction = response
            .json()
            .await
            .context("decoding Aptos transaction")?;
        if !tx.success {
            return Err(AdapterError::EventNotFound(tx_hash.to_string()));
        }
        Ok(tx)
    }

    fn find_event<'a>(tx: &'a Transaction, suffix: &str) -> Option<&'a Event> {
        tx.events.iter().find(|e| e.event_type.ends_with(suffix))
    }

    fn block_time(tx: &Transaction) -> Result<u64, AdapterError> {
        let micros: u64 = tx
            .timestamp
            .parse()
            .map_err(|_| AdapterError::ChainUnreachable(anyhow::anyhow!("bad timestamp")))?;
        Ok(micros / 1_000_000)
    }
}

fn parse_b256(field: &str, value: &str) -> Result<B256, AdapterError> {
    B256::from_str(value.trim())
        .map_err(|_| AdapterError::ChainUnreachable(anyhow::anyhow!("bad {field} bytes: {value}")))
}

fn parse_amount(field: &str, value: &str) -> Result<U256, AdapterError> {
    U256::from_str(value.trim())
        .map_err(|_| AdapterError::ChainUnreachable(anyhow::anyhow!("bad {field}: {value}")))
}

#[async_trait]
impl ChainClient for AptosChain {
    async fn src_escrow_created(
        &self,
        tx_hash: &str,
    ) -> Result<SrcEscrowObservation, AdapterError> {
        let tx = self.transaction(tx_hash).await?;
        let event = Self::find_event(&tx, SRC_EVENT_SUFFIX)
            .ok_or_else(|| AdapterError::EventNotFound(tx_hash.to_string()))?;
        let data: SrcEscrowCreatedData = serde_json::from_value(event.data.clone())
            .context("decoding SrcEscrowCreated event data")?;

        let packed_timelocks = parse_amount("timelocks", &data.timelocks)?;
        let immutables = EscrowImmutables {
            order_hash: parse_b256("order_hash", &data.order_hash)?,
            hashlock: parse_b256("hashlock", &data.hashlock)?,
            maker: data.maker.to_lowercase(),
            taker: data.taker.to_lowercase(),
            token: data.token.to_lowercase(),
            amount: parse_amount("amount", &data.amount)?,
            safety_deposit: parse_amount("safety_deposit", &data.safety_deposit)?,
            timelocks: EscrowTimelocks::unpack_src(packed_timelocks),
        };
        let dst_chain_id: u64 = data.dst_chain_id.trim().parse().map_err(|_| {
            AdapterError::ChainUnreachable(anyhow::anyhow!(
                "bad dst_chain_id: {}",
                data.dst_chain_id
            ))
        })?;
        let dst_complement = DstComplement {
            maker: data.dst_maker.to_lowercase(),
            amount: parse_amount("dst_amount", &data.dst_amount)?,
            token: data.dst_token.to_lowercase(),
            safety_deposit: parse_amount("dst_safety_deposit", &data.dst_safety_deposit)?,
            chain_id: dst_chain_id,
        };

        Ok(SrcEscrowObservation {
            immutables,
            dst_complement,
            escrow_address: data.escrow.to_lowercase(),
            block_time: Self::block_time(&tx)?,
        })
    }

    async fn dst_escrow_created(
        &self,
        tx_hash: &str,
    ) -> Result<DstEscrowObservation, AdapterError> {
        let tx = self.transaction(tx_hash).await?;
        let event = Self::find_event(&tx, DST_EVENT_SUFFIX)
            .ok_or_else(|| AdapterError::EventNotFound(tx_hash.to_string()))?;
        let data: DstEscrowCreatedData = serde_json::from_value(event.data.clone())
            .context("decoding DstEscrowCreated event data")?;

        Ok(DstEscrowObservation {
            escrow: data.escrow.to_lowercase(),
            hashlock: parse_b256("hashlock", &data.hashlock)?,
            taker: data.taker.to_lowercase(),
            block_time: Self::block_time(&tx)?,
        })
    }

    async fn token_balance(&self, token: &str, account: &str) -> Result<U256, AdapterError> {
        let url = format!("{}/v1/view", self.base_url);
        let body = serde_json::json!({
            "function": BALANCE_VIEW_FUNCTION,
            "type_arguments": [token],
            "arguments": [account],
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("calling balance view function")?;
        if !response.status().is_success() {
            return Err(AdapterError::ChainUnreachable(anyhow::anyhow!(
                "view function returned {}",
                response.status()
            )));
        }

        let values: Vec<serde_json::Value> =
            response.json().await.context("decoding view response")?;
        let raw = values
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::ChainUnreachable(anyhow::anyhow!("empty view response")))?;
        parse_amount("balance", raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(events: serde_json::Value) -> Transaction {
        serde_json::from_value(serde_json::json!({
            "timestamp": "1700000000123456",
            "success": true,
            "events": events,
        }))
        .unwrap()
    }

    #[test]
    fn block_time_truncates_microseconds() {
        let tx = sample_tx(serde_json::json!([]));
        assert_eq!(AptosChain::block_time(&tx).unwrap(), 1_700_000_000);
    }

    #[test]
    fn src_event_is_matched_by_type_suffix() {
        let tx = sample_tx(serde_json::json!([
            { "type": "0x1::coin::DepositEvent", "data": {} },
            { "type": "0xabc::escrow_factory::SrcEscrowCreated", "data": { "escrow": "0x1" } },
        ]));
        let event = AptosChain::find_event(&tx, SRC_EVENT_SUFFIX).unwrap();
        assert!(event.event_type.ends_with("SrcEscrowCreated"));
        assert!(AptosChain::find_event(&tx, DST_EVENT_SUFFIX).is_none());
    }

    #[test]
    fn src_event_data_decodes() {
        let data = serde_json::json!({
            "order_hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "hashlock": "0x0202020202020202020202020202020202020202020202020202020202020202",
            "maker": "0xAAA1",
            "taker": "0xBBB2",
            "token": "0x1::aptos_coin::AptosCoin",
            "amount": "1000",
            "safety_deposit": "5",
            "timelocks": "0",
            "escrow": "0xCCC3",
            "dst_maker": "0xddd4",
            "dst_amount": "2000",
            "dst_token": "0xeee5",
            "dst_safety_deposit": "7",
            "dst_chain_id": "1",
        });
        let decoded: SrcEscrowCreatedData = serde_json::from_value(data).unwrap();
        assert_eq!(decoded.amount, "1000");
        assert_eq!(decoded.escrow, "0xCCC3");
    }
}
