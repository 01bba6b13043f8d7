//! Wire frames for the admin channel.
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! → {"protocolVersion":1,"correlationId":7,"method":"getSelf","params":{}}
//! ← {"correlationId":7,"result":{"address":"200:1234::1", ...}}
//! ← {"correlationId":7,"error":"unknown peer"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version sent with every request.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single response line.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// A single admin request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub protocol_version: u32,
    pub correlation_id: u64,
    pub method: String,
    pub params: Map<String, Value>,
}

impl AdminRequest {
    pub fn new(correlation_id: u64, method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            correlation_id,
            method: method.into(),
            params,
        }
    }

    /// Serialize as a single newline-terminated line.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// A decoded admin response. Exactly one outcome per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminResponse {
    Success {
        correlation_id: Option<u64>,
        result: Map<String, Value>,
    },
    Failure {
        correlation_id: Option<u64>,
        error: String,
    },
}

/// Reasons a response line is not a valid frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed response frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response frame has neither result nor error")]
    MissingOutcome,

    #[error("response frame has both result and error")]
    AmbiguousOutcome,

    #[error("response result is not an object")]
    ResultNotObject,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    correlation_id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl AdminResponse {
    /// Decode one response line (trailing newline optional).
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        let wire: WireResponse = serde_json::from_str(line.trim_end())?;
        match (wire.result, wire.error) {
            (Some(_), Some(_)) => Err(FrameError::AmbiguousOutcome),
            (None, None) => Err(FrameError::MissingOutcome),
            (Some(Value::Object(result)), None) => Ok(AdminResponse::Success {
                correlation_id: wire.correlation_id,
                result,
            }),
            (Some(_), None) => Err(FrameError::ResultNotObject),
            (None, Some(error)) => Ok(AdminResponse::Failure {
                correlation_id: wire.correlation_id,
                error: match error {
                    Value::String(message) => message,
                    other => other.to_string(),
                },
            }),
        }
    }

    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            AdminResponse::Success { correlation_id, .. }
            | AdminResponse::Failure { correlation_id, .. } => *correlation_id,
        }
    }
}
