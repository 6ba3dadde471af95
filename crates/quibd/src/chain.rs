//! Read-only ERC-20 queries over JSON-RPC.
//!
//! Balances shown in the app combine the on-chain holding with pending
//! in-app claims; only the on-chain part lives here. All calls are
//! `eth_call` reads, no keys and no writes.

use quib_common::{QuibError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

// Function selectors (first 4 bytes of the keccak of each signature).
const SELECTOR_BALANCE_OF: &str = "0x70a08231";
const SELECTOR_DECIMALS: &str = "0x313ce567";
const SELECTOR_NAME: &str = "0x06fdde03";
const SELECTOR_SYMBOL: &str = "0x95d89b41";
const SELECTOR_TOTAL_SUPPLY: &str = "0x18160ddd";

/// Static facts about the reward token contract.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub total_supply: f64,
    pub contract: String,
    pub chain_id: u64,
}

#[derive(Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    rpc_url: String,
    contract: String,
    decimals: u32,
    chain_id: u64,
}

impl ChainClient {
    pub fn new(
        rpc_url: String,
        contract: String,
        decimals: u32,
        chain_id: u64,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| QuibError::Upstream(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            rpc_url,
            contract,
            decimals,
            chain_id,
        })
    }

    /// One `eth_call` against the token contract; returns the raw hex
    /// result string.
    async fn eth_call(&self, data: String) -> Result<String> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": self.contract, "data": data },
                "latest"
            ],
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| QuibError::Upstream(format!("rpc request: {}", e)))?;

        if !response.status().is_success() {
            return Err(QuibError::Upstream(format!(
                "rpc call failed: {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| QuibError::Upstream(format!("rpc body: {}", e)))?;

        if let Some(error) = json.get("error") {
            return Err(QuibError::Upstream(format!("rpc error: {}", error)));
        }

        json["result"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| QuibError::Upstream("rpc result missing".to_string()))
    }

    /// On-chain token balance of a wallet, in whole-token units.
    pub async fn balance_of(&self, wallet: &str) -> Result<f64> {
        let data = format!(
            "{}{:0>64}",
            SELECTOR_BALANCE_OF,
            wallet.trim_start_matches("0x").to_lowercase()
        );
        let result = self.eth_call(data).await?;
        let raw = parse_uint(&result)?;
        Ok(to_token_units(raw, self.decimals))
    }

    /// Best-effort balance for display paths; 0 when the chain is
    /// unreachable so reads never fail a page load.
    pub async fn balance_or_zero(&self, wallet: &str) -> f64 {
        match self.balance_of(wallet).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Balance lookup failed for {}: {}", wallet, e);
                0.0
            }
        }
    }

    /// Contract metadata: name, symbol, decimals and total supply.
    pub async fn token_info(&self) -> Result<TokenInfo> {
        let name = decode_abi_string(&self.eth_call(SELECTOR_NAME.to_string()).await?)?;
        let symbol = decode_abi_string(&self.eth_call(SELECTOR_SYMBOL.to_string()).await?)?;
        let decimals =
            parse_uint(&self.eth_call(SELECTOR_DECIMALS.to_string()).await?)? as u32;
        let supply_raw = parse_uint(&self.eth_call(SELECTOR_TOTAL_SUPPLY.to_string()).await?)?;

        Ok(TokenInfo {
            name,
            symbol,
            decimals,
            total_supply: to_token_units(supply_raw, decimals),
            contract: self.contract.clone(),
            chain_id: self.chain_id,
        })
    }
}

/// Parse a 0x-prefixed hex quantity into a u128. ERC-20 values are
/// uint256; anything above u128::MAX is out of range for a reward token
/// and reported as upstream garbage.
fn parse_uint(hex_value: &str) -> Result<u128> {
    let trimmed = hex_value.trim_start_matches("0x").trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    if trimmed.len() > 32 {
        return Err(QuibError::Upstream(format!(
            "uint out of range: {}",
            hex_value
        )));
    }
    u128::from_str_radix(trimmed, 16)
        .map_err(|e| QuibError::Upstream(format!("bad uint {}: {}", hex_value, e)))
}

fn to_token_units(raw: u128, decimals: u32) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Decode an ABI-encoded `string` return value: a 32-byte offset, a
/// 32-byte length, then the UTF-8 bytes.
fn decode_abi_string(hex_value: &str) -> Result<String> {
    let bytes = hex::decode(hex_value.trim_start_matches("0x"))
        .map_err(|e| QuibError::Upstream(format!("bad abi hex: {}", e)))?;
    if bytes.len() < 64 {
        return Err(QuibError::Upstream("abi string too short".to_string()));
    }

    let length = parse_uint(&format!("0x{}", hex::encode(&bytes[32..64])))? as usize;
    if bytes.len() < 64 + length {
        return Err(QuibError::Upstream("abi string truncated".to_string()));
    }

    String::from_utf8(bytes[64..64 + length].to_vec())
        .map_err(|e| QuibError::Upstream(format!("abi string not utf-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uint_handles_padding_and_zero() {
        assert_eq!(parse_uint("0x0").unwrap(), 0);
        assert_eq!(
            parse_uint("0x0000000000000000000000000000000000000000000000000000000000000000")
                .unwrap(),
            0
        );
        assert_eq!(
            parse_uint("0x00000000000000000000000000000000000000000000000000000000000000ff")
                .unwrap(),
            255
        );
    }

    #[test]
    fn parse_uint_rejects_oversized_values() {
        // 2^255: legal uint256, too large for a reward balance.
        let huge = format!("0x8{}", "0".repeat(63));
        assert!(parse_uint(&huge).is_err());
    }

    #[test]
    fn token_units_respect_decimals() {
        assert_eq!(to_token_units(1_500_000_000_000_000_000, 18), 1.5);
        assert_eq!(to_token_units(250, 2), 2.5);
        assert_eq!(to_token_units(0, 18), 0.0);
    }

    #[test]
    fn decode_abi_string_round_trip() {
        // offset 0x20, length 4, "Quib" padded to a word.
        let encoded = format!(
            "0x{:0>64x}{:0>64x}{}{}",
            32,
            4,
            hex::encode("Quib"),
            "0".repeat(56)
        );
        assert_eq!(decode_abi_string(&encoded).unwrap(), "Quib");
    }

    #[test]
    fn decode_abi_string_rejects_truncated_payload() {
        assert!(decode_abi_string("0x1234").is_err());
        let lying_length = format!("0x{:0>64x}{:0>64x}", 32, 99);
        assert!(decode_abi_string(&lying_length).is_err());
    }

    #[tokio::test]
    async fn unreachable_rpc_degrades_to_zero() {
        let client = ChainClient::new(
            "http://127.0.0.1:1".to_string(),
            "0x0000000000000000000000000000000000000000".to_string(),
            18,
            56,
            1,
        )
        .unwrap();
        assert_eq!(
            client
                .balance_or_zero("0x52908400098527886E0F7030069857D2E4169EE7")
                .await,
            0.0
        );
        assert!(client.token_info().await.is_err());
    }
}
