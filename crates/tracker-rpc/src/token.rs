//! Token metadata, supply and age lookups against the RPC node.

use crate::client::RpcClient;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use borsh::BorshDeserialize;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;
use tracker_core::types::NameAndSymbol;
use tracker_core::{Result, TrackerError};

/// Metaplex token metadata program
pub const METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// getSignaturesForAddress page size (node maximum)
const SIGNATURE_PAGE_LIMIT: usize = 1000;
/// Upper bound on pages walked while searching for the oldest signature
const MAX_SIGNATURE_PAGES: usize = 20;

pub fn parse_address(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).map_err(|_| TrackerError::InvalidAddress(address.to_string()))
}

/// Program-derived address of the mint's metadata account
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    let (address, _bump) = Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    );
    address
}

/// Leading fields of a Metaplex metadata account; the rest is ignored
#[derive(BorshDeserialize)]
struct MetadataPrefix {
    _key: u8,
    _update_authority: [u8; 32],
    _mint: [u8; 32],
    name: String,
    symbol: String,
}

/// Read name and symbol out of a metadata account. Both are stored NUL
/// padded to a fixed width.
pub fn decode_metadata(data: &[u8]) -> Result<NameAndSymbol> {
    let prefix = MetadataPrefix::deserialize(&mut &data[..])
        .map_err(|e| TrackerError::Decode(format!("metadata account: {e}")))?;
    Ok(NameAndSymbol {
        name: strip_nul(&prefix.name),
        symbol: strip_nul(&prefix.symbol),
    })
}

fn strip_nul(value: &str) -> String {
    value.replace('\0', "")
}

#[derive(Deserialize)]
struct AccountInfoResult {
    value: Option<AccountValue>,
}

#[derive(Deserialize)]
struct AccountValue {
    /// `[payload, encoding]`
    data: (String, String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupplyResult {
    value: SupplyValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupplyValue {
    ui_amount_string: String,
}

/// One entry of getSignaturesForAddress, newest first
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// Oldest block time in a newest-first page
pub fn oldest_block_time(page: &[SignatureInfo]) -> Option<i64> {
    page.iter().rev().find_map(|info| info.block_time)
}

pub async fn name_and_symbol(client: &RpcClient, address: &str) -> Result<NameAndSymbol> {
    let mint = parse_address(address)?;
    let metadata = metadata_address(&mint);

    let info: AccountInfoResult = client
        .call(
            "getAccountInfo",
            json!([metadata.to_string(), { "encoding": "base64" }]),
        )
        .await?;
    let value = info
        .value
        .ok_or_else(|| TrackerError::TokenNotFound(address.to_string()))?;
    if value.data.1 != "base64" {
        return Err(TrackerError::Decode(format!(
            "unexpected account encoding {}",
            value.data.1
        )));
    }
    let data = STANDARD
        .decode(value.data.0.as_bytes())
        .map_err(|e| TrackerError::Decode(format!("metadata account base64: {e}")))?;
    decode_metadata(&data)
}

pub async fn supply(client: &RpcClient, address: &str) -> Result<f64> {
    let mint = parse_address(address)?;
    let result: SupplyResult = client
        .call(
            "getTokenSupply",
            json!([mint.to_string(), { "commitment": "finalized" }]),
        )
        .await?;
    parse_supply(&result.value.ui_amount_string)
}

pub fn parse_supply(ui_amount: &str) -> Result<f64> {
    ui_amount
        .parse::<f64>()
        .map_err(|e| TrackerError::Decode(format!("token supply {ui_amount:?}: {e}")))
}

/// Block time of the earliest transaction that touched the metadata account
pub async fn creation_time(client: &RpcClient, address: &str) -> Result<DateTime<Utc>> {
    let mint = parse_address(address)?;
    let metadata = metadata_address(&mint).to_string();

    let mut before: Option<String> = None;
    let mut oldest: Option<i64> = None;
    for page_index in 0..MAX_SIGNATURE_PAGES {
        let mut options = json!({ "limit": SIGNATURE_PAGE_LIMIT });
        if let Some(before) = &before {
            options["before"] = json!(before);
        }
        let page: Vec<SignatureInfo> = client
            .call("getSignaturesForAddress", json!([metadata, options]))
            .await?;

        if let Some(time) = oldest_block_time(&page) {
            oldest = Some(time);
        }
        if page.len() < SIGNATURE_PAGE_LIMIT {
            break;
        }
        before = page.last().map(|info| info.signature.clone());
        debug!(address, page = page_index + 1, "Walking signature history");
    }

    let seconds = oldest.ok_or_else(|| TrackerError::TokenNotFound(address.to_string()))?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| TrackerError::Decode(format!("block time {seconds} out of range")))
}
