//! JSON-RPC 2.0 frames exchanged over the subscription socket.
//!
//! Inbound text is decoded once into [`InboundMessage`]: a frame with an `id`
//! plus `result` or `error` is a correlated response, a frame with a `method`
//! and no `id` is a server push. Anything else is reported as `Unknown`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracker_core::{Result, TrackerError};

/// Outbound request frame
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }

    pub fn logs_subscribe(id: u64, wallet: &str, commitment: &str) -> Self {
        Self::new(
            id,
            "logsSubscribe",
            json!([{ "mentions": [wallet] }, { "commitment": commitment }]),
        )
    }

    pub fn logs_unsubscribe(id: u64, subscription_id: u64) -> Self {
        Self::new(id, "logsUnsubscribe", json!([subscription_id]))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A response matched to an outstanding request by id
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    pub outcome: std::result::Result<Value, RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Turn a remote error object into `TrackerError::Remote`
    pub fn into_result(self) -> Result<Value> {
        self.outcome.map_err(|err| TrackerError::Remote {
            code: err.code,
            message: err.message,
        })
    }
}

/// Server push for a subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub subscription: u64,
    pub result: Value,
}

impl Notification {
    /// Decode a `logsNotification` payload
    pub fn logs(&self) -> Result<LogsUpdate> {
        let raw: LogsResult = serde_json::from_value(self.result.clone())?;
        Ok(LogsUpdate {
            subscription: self.subscription,
            slot: raw.context.slot,
            signature: raw.value.signature,
            err: raw.value.err.filter(|e| !e.is_null()),
            logs: raw.value.logs,
        })
    }
}

/// Logs emitted by a transaction that mentions a subscribed wallet
#[derive(Debug, Clone, PartialEq)]
pub struct LogsUpdate {
    pub subscription: u64,
    pub slot: u64,
    pub signature: String,
    pub err: Option<Value>,
    pub logs: Vec<String>,
}

impl LogsUpdate {
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }

    /// True when any log line names a swap instruction, or when the node sent
    /// no logs at all and the transaction has to be inspected anyway
    pub fn may_contain_swap(&self) -> bool {
        self.logs.is_empty()
            || self
                .logs
                .iter()
                .any(|line| line.to_ascii_lowercase().contains("swap"))
    }
}

#[derive(Deserialize)]
struct LogsResult {
    context: LogsContext,
    value: LogsValue,
}

#[derive(Deserialize)]
struct LogsContext {
    slot: u64,
}

#[derive(Deserialize)]
struct LogsValue {
    signature: String,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    logs: Vec<String>,
}

/// Every frame the read loop can receive
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Response(RpcResponse),
    Notification(Notification),
    /// Undecodable or unrecognized frame, with the reason
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
    #[serde(default)]
    params: Option<NotificationParams>,
}

#[derive(Deserialize)]
struct NotificationParams {
    result: Value,
    subscription: u64,
}

// Keeps `"result": null` distinct from a missing key.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl InboundMessage {
    pub fn decode(text: &str) -> Self {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => return InboundMessage::Unknown(format!("malformed frame: {e}")),
        };

        match (envelope.id, envelope.method) {
            (Some(id), _) if envelope.result.is_some() || envelope.error.is_some() => {
                let Some(id) = id.as_u64() else {
                    return InboundMessage::Unknown(format!("response with non-numeric id {id}"));
                };
                let outcome = match envelope.error {
                    Some(error) => Err(error),
                    None => Ok(envelope.result.unwrap_or(Value::Null)),
                };
                InboundMessage::Response(RpcResponse { id, outcome })
            }
            (None, Some(method)) => match envelope.params {
                Some(params) => InboundMessage::Notification(Notification {
                    method,
                    subscription: params.subscription,
                    result: params.result,
                }),
                None => InboundMessage::Unknown(format!("{method} push without params")),
            },
            _ => InboundMessage::Unknown("frame is neither a response nor a notification".into()),
        }
    }
}
