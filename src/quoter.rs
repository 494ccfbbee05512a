//! Upstream quote provider client.
//!
//! The coordinator proxies quote requests to the aggregator's cross chain
//! quoter and caches the result under a freshly minted quote id. In dev mode
//! the upstream is bypassed entirely and a fixed template quote is served so
//! the full order flow works against local chains.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;

use crate::primitives::{
    AuctionPoint, GasCostConfig, PairCurrency, Preset, Quote, QuotePresets, QuoteRequest,
    TimeLocks, TokenPair,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct QuoterClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl QuoterClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building quoter HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Fetch a quote for the given parameters from the upstream provider.
    pub async fn get_quote(&self, params: &QuoteRequest) -> Result<Quote> {
        let url = format!("{}/quoter/v1.0/quote/receive", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if response.status().is_success() {
            let quote: Quote = response.json().await?;
            Ok(quote)
        } else {
            Err(anyhow!("failed to get quote: {}", response.status()))
        }
    }
}

fn dev_preset(amount: &str, secrets_count: u64) -> Preset {
    Preset {
        auction_duration: 180,
        start_auction_in: 2,
        initial_rate_bump: 1000,
        auction_start_amount: amount.to_string(),
        start_amount: amount.to_string(),
        auction_end_amount: amount.to_string(),
        exclusive_resolver: None,
        cost_in_dst_token: "0".to_string(),
        points: vec![AuctionPoint {
            delay: 12,
            coefficient: 455,
        }],
        allow_partial_fills: secrets_count > 1,
        allow_multiple_fills: secrets_count > 1,
        gas_cost: GasCostConfig {
            gas_bump_estimate: 54,
            gas_price_estimate: "1231".to_string(),
        },
        secrets_count,
    }
}

/// Fixed template quote served when `DEV_MODE` is on.
///
/// Short withdrawal locks and a one-minute public cancellation keep local
/// end-to-end runs fast; the request's amount is echoed back one-to-one.
pub fn dev_quote(request: &QuoteRequest) -> Quote {
    Quote {
        quote_id: None,
        src_token_amount: request.amount.clone(),
        dst_token_amount: request.amount.clone(),
        presets: QuotePresets {
            fast: dev_preset(&request.amount, 1),
            medium: dev_preset(&request.amount, 1),
            slow: dev_preset(&request.amount, 4),
            custom: None,
        },
        src_escrow_factory: "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee".to_string(),
        dst_escrow_factory: "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee".to_string(),
        whitelist: vec![],
        time_locks: TimeLocks {
            src_withdrawal: 10,
            src_public_withdrawal: 120,
            src_cancellation: 240,
            src_public_cancellation: 300,
            dst_withdrawal: 10,
            dst_public_withdrawal: 100,
            dst_cancellation: 200,
        },
        src_safety_deposit: "1000000000000000".to_string(),
        dst_safety_deposit: "1000000000000000".to_string(),
        recommended_preset: "fast".to_string(),
        prices: PairCurrency {
            usd: TokenPair {
                src_token: "1.0".to_string(),
                dst_token: "1.0".to_string(),
            },
        },
        volume: PairCurrency {
            usd: TokenPair {
                src_token: "0".to_string(),
                dst_token: "0".to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::APTOS_CHAIN_ID;

    fn sample_request() -> QuoteRequest {
        QuoteRequest {
            src_chain: 1,
            dst_chain: APTOS_CHAIN_ID,
            src_token_address: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".to_string(),
            dst_token_address: "0x1::aptos_coin::AptosCoin".to_string(),
            amount: "1000000000000000000".to_string(),
            wallet_address: "0x1111111111111111111111111111111111111111".to_string(),
        }
    }

    #[test]
    fn dev_quote_echoes_the_requested_amount() {
        let quote = dev_quote(&sample_request());
        assert_eq!(quote.src_token_amount, "1000000000000000000");
        assert_eq!(quote.quote_id, None);
        assert_eq!(quote.recommended_preset, "fast");
        assert_eq!(quote.recommended().secrets_count, 1);
    }

    #[test]
    fn dev_quote_timelocks_are_short() {
        let quote = dev_quote(&sample_request());
        assert_eq!(quote.time_locks.src_withdrawal, 10);
        assert!(quote.time_locks.src_public_cancellation <= 300);
    }

    #[test]
    fn quote_serde_round_trip() {
        let mut quote = dev_quote(&sample_request());
        quote.quote_id = Some("7e2f1c9a-5c1e-4f0e-9f1b-2a6f3f6d8e01".to_string());
        let json = serde_json::to_string(&quote).unwrap();
        let back: Quote = serde_json::from_str(&json).unwrap();
        assert_eq!(back.quote_id.as_deref(), Some("7e2f1c9a-5c1e-4f0e-9f1b-2a6f3f6d8e01"));
        assert!(json.contains("\"timeLocks\""));
        assert!(json.contains("\"srcSafetyDeposit\""));
    }
}
