//! Admin client: typed operations on top of [`RpcTransport`].
//!
//! `addPeer` and `removePeer` only change the daemon's live session. To
//! keep a peer across restarts it must also be merged into the persisted
//! [`ConfigDocument`](yggctl_config::ConfigDocument).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::rpc::{RpcError, RpcTransport};

/// Errors from typed admin operations.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("incomplete {method} response: missing {}", .missing.join(", "))]
    IncompleteResponse {
        method: &'static str,
        missing: Vec<&'static str>,
    },

    #[error("malformed {method} response: {reason}")]
    MalformedResponse {
        method: &'static str,
        reason: String,
    },
}

/// Snapshot of the local node as reported by `getSelf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub address: String,
    pub public_key: String,
    /// Tree coordinates rendered as `[1 2 3]`.
    pub coordinates: String,
    pub subnet: String,
}

/// One connected peer as reported by `getPeers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub address: String,
    pub public_key: String,
    pub port: u64,
    pub uptime_seconds: u64,
    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
}

/// The daemon has spelled the key three ways across releases. Each spelling
/// is its own field so a response carrying more than one still decodes.
#[derive(Deserialize)]
struct KeyFields {
    key: Option<String>,
    public_key: Option<String>,
    #[serde(rename = "publicKey")]
    public_key_camel: Option<String>,
}

impl KeyFields {
    fn into_key(self) -> Option<String> {
        self.key.or(self.public_key).or(self.public_key_camel)
    }
}

#[derive(Deserialize)]
struct SelfFields {
    address: Option<String>,
    #[serde(flatten)]
    key: KeyFields,
    coords: Option<Coords>,
    subnet: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Coords {
    List(Vec<u64>),
    Text(String),
}

impl Coords {
    fn render(self) -> String {
        match self {
            Coords::List(coords) => {
                let parts: Vec<String> = coords.iter().map(u64::to_string).collect();
                format!("[{}]", parts.join(" "))
            }
            Coords::Text(text) => text,
        }
    }
}

#[derive(Deserialize)]
struct PeerFields {
    address: Option<String>,
    #[serde(flatten)]
    key: KeyFields,
    port: Option<u64>,
    uptime: Option<f64>,
    bytes_sent: Option<u64>,
    #[serde(rename = "bytesSent")]
    bytes_sent_camel: Option<u64>,
    bytes_recvd: Option<u64>,
    bytes_received: Option<u64>,
    #[serde(rename = "bytesReceived")]
    bytes_received_camel: Option<u64>,
}

/// Typed façade over the daemon's admin RPC methods.
#[derive(Debug, Clone)]
pub struct AdminClient {
    transport: RpcTransport,
}

impl AdminClient {
    pub fn new(transport: RpcTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    /// Identity and addressing of the local node.
    pub async fn get_self(&self) -> Result<NodeInfo, AdminError> {
        const METHOD: &str = "getSelf";
        let result = self.transport.call(METHOD, Map::new()).await?;
        let fields: SelfFields = decode(METHOD, Value::Object(result))?;
        let key = fields.key.into_key();

        let mut missing = Vec::new();
        if fields.address.is_none() {
            missing.push("address");
        }
        if key.is_none() {
            missing.push("key");
        }
        if fields.subnet.is_none() {
            missing.push("subnet");
        }

        match (fields.address, key, fields.subnet) {
            (Some(address), Some(public_key), Some(subnet)) => Ok(NodeInfo {
                address,
                public_key,
                coordinates: fields
                    .coords
                    .map(Coords::render)
                    .unwrap_or_else(|| "[]".to_string()),
                subnet,
            }),
            _ => Err(AdminError::IncompleteResponse {
                method: METHOD,
                missing,
            }),
        }
    }

    /// Currently connected peers. An idle node yields an empty list.
    pub async fn get_peers(&self) -> Result<Vec<PeerRecord>, AdminError> {
        const METHOD: &str = "getPeers";
        let result = self.transport.call(METHOD, Map::new()).await?;
        parse_peers(result)
    }

    /// Dial a peer for the current session only.
    pub async fn add_peer(&self, uri: &str) -> Result<(), AdminError> {
        self.transport
            .call("addPeer", params(json!({ "uri": uri })))
            .await?;
        Ok(())
    }

    /// Disconnect the peer on the given switch port for the current session.
    pub async fn remove_peer(&self, port: u64) -> Result<(), AdminError> {
        self.transport
            .call("removePeer", params(json!({ "port": port })))
            .await?;
        Ok(())
    }
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(method: &'static str, value: Value) -> Result<T, AdminError> {
    serde_json::from_value(value).map_err(|e| AdminError::MalformedResponse {
        method,
        reason: e.to_string(),
    })
}

/// Accepts `{"peers": [...]}`, the address-keyed `{"peers": {addr: {...}}}`,
/// or no `peers` key at all.
fn parse_peers(mut result: Map<String, Value>) -> Result<Vec<PeerRecord>, AdminError> {
    const METHOD: &str = "getPeers";

    let entries: Vec<(Option<String>, Value)> = match result.remove("peers") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.into_iter().map(|v| (None, v)).collect(),
        Some(Value::Object(by_addr)) => by_addr.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Some(other) => {
            return Err(AdminError::MalformedResponse {
                method: METHOD,
                reason: format!("peers is neither a list nor a map: {other}"),
            });
        }
    };

    entries
        .into_iter()
        .map(|(keyed_addr, value)| {
            let fields: PeerFields = decode(METHOD, value)?;
            let address = fields.address.or(keyed_addr);
            let key = fields.key.into_key();

            let mut missing = Vec::new();
            if address.is_none() {
                missing.push("address");
            }
            if key.is_none() {
                missing.push("key");
            }
            if fields.port.is_none() {
                missing.push("port");
            }

            match (address, key, fields.port) {
                (Some(address), Some(public_key), Some(port)) => Ok(PeerRecord {
                    address,
                    public_key,
                    port,
                    uptime_seconds: fields.uptime.unwrap_or(0.0).max(0.0) as u64,
                    bytes_sent: fields.bytes_sent.or(fields.bytes_sent_camel),
                    bytes_received: fields
                        .bytes_recvd
                        .or(fields.bytes_received)
                        .or(fields.bytes_received_camel),
                }),
                _ => Err(AdminError::IncompleteResponse {
                    method: METHOD,
                    missing,
                }),
            }
        })
        .collect()
}
