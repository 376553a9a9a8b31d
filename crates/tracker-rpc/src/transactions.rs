use crate::client::RpcClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tracker_core::types::{TokenBalance, TransactionRecord};
use tracker_core::{Result, TrackerError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<RawMeta>,
    transaction: RawEnvelope,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Deserialize)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    message: RawMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    account_keys: Vec<String>,
}

impl RawTransaction {
    fn into_record(self, signature: &str) -> TransactionRecord {
        let mut account_keys = self.transaction.message.account_keys;
        let (failed, pre, post) = match self.meta {
            Some(meta) => {
                // Lookup-table accounts follow the static keys: writable, then readonly
                if let Some(loaded) = meta.loaded_addresses {
                    account_keys.extend(loaded.writable);
                    account_keys.extend(loaded.readonly);
                }
                (
                    meta.err.is_some_and(|e| !e.is_null()),
                    meta.pre_token_balances,
                    meta.post_token_balances,
                )
            }
            None => (false, Vec::new(), Vec::new()),
        };

        TransactionRecord {
            signature: signature.to_string(),
            slot: self.slot,
            block_time: self.block_time,
            failed,
            account_keys,
            pre_token_balances: pre,
            post_token_balances: post,
        }
    }
}

/// Fetch a confirmed transaction with its token balance tables
pub async fn get_transaction(client: &RpcClient, signature: &str) -> Result<TransactionRecord> {
    let raw: Option<RawTransaction> = client
        .call(
            "getTransaction",
            json!([
                signature,
                {
                    "encoding": "json",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        )
        .await?;

    raw.map(|raw| raw.into_record(signature))
        .ok_or_else(|| TrackerError::Rpc(format!("transaction {signature} is not available")))
}

/// Decode a `getTransaction` result that is already in hand
pub fn decode_transaction(signature: &str, result: Value) -> Result<TransactionRecord> {
    let raw: RawTransaction = serde_json::from_value(result)?;
    Ok(raw.into_record(signature))
}
