//! Wire format of the `/ws` endpoint
//!
//! The page sends [`Call`]s and receives one [`Reply`] per call. While an
//! answer streams, the server also pushes [`ResponseEvent`]s carrying the
//! request ID they belong to.

use prism_core::Selector;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page → server method call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Echoed back in the reply when present
    #[serde(default)]
    pub id: Option<String>,
}

/// Server → page answer to one [`Call`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Fault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

/// Parameters of `prompt.submit`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitParams {
    /// Passed to the provider verbatim, empty included
    #[serde(default)]
    pub prompt: String,
    /// Selector label ("GPT", "Claude", "Gemini")
    pub model: String,
}

pub mod methods {
    pub const PROMPT_SUBMIT: &str = "prompt.submit";
    pub const PROMPT_CANCEL: &str = "prompt.cancel";
    pub const MODELS_LIST: &str = "models.list";
    pub const STATUS_GET: &str = "status.get";
}

/// Fault codes, JSON-RPC numbering
pub mod codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const UNRECOGNIZED_SELECTOR: i32 = -32001;
}

impl Reply {
    pub fn ok(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn fault(id: Option<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(Fault {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Progress of one streamed answer, serialized as `{"event": ..., "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ResponseEvent {
    #[serde(rename = "response.started")]
    Started { request_id: String, model: Selector },
    /// Full markdown so far; the page replaces its panel with it
    #[serde(rename = "response.snapshot")]
    Snapshot { request_id: String, content: String },
    #[serde(rename = "response.done")]
    Done { request_id: String, snapshots: usize },
    #[serde(rename = "response.error")]
    Failed {
        request_id: String,
        kind: String,
        message: String,
    },
    /// Abandoned by a newer submit, an explicit cancel or a closed socket
    #[serde(rename = "response.cancelled")]
    Cancelled { request_id: String },
}

impl ResponseEvent {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Started { request_id, .. }
            | Self::Snapshot { request_id, .. }
            | Self::Done { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::Cancelled { request_id } => request_id,
        }
    }
}
