//! RPC transport: one connection, one request, one response line.
//!
//! No connection is reused between calls, so a failed call never poisons the
//! next one and concurrent callers never share state beyond the correlation
//! id counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use yggctl_config::AdminEndpoint;

use super::frame::{AdminRequest, AdminResponse, MAX_FRAME_BYTES};

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Errors from a single admin RPC.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("admin channel unavailable at {endpoint}: {reason}")]
    ChannelUnavailable { endpoint: String, reason: String },

    #[error("admin protocol error: {0}")]
    Protocol(String),

    #[error("daemon rejected {method}: {message}")]
    Remote { method: String, message: String },

    #[error("{method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
}

/// Line-delimited JSON transport to the daemon's admin channel.
#[derive(Debug, Clone)]
pub struct RpcTransport {
    endpoint: AdminEndpoint,
    timeout: Duration,
}

impl RpcTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(endpoint: AdminEndpoint) -> Self {
        Self {
            endpoint,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &AdminEndpoint {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the admin channel can currently be opened.
    ///
    /// For Unix sockets this only checks that the socket file exists; for
    /// TCP it attempts a connection bounded by the call timeout.
    pub async fn probe(&self) -> bool {
        match &self.endpoint {
            AdminEndpoint::Unix(path) => path.exists(),
            AdminEndpoint::Tcp(addr) => matches!(
                tokio::time::timeout(self.timeout, TcpStream::connect(addr.as_str())).await,
                Ok(Ok(_))
            ),
        }
    }

    /// Call `method` with the default timeout.
    pub async fn call(
        &self,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<Map<String, Value>, RpcError> {
        self.call_with_timeout(method, params, self.timeout).await
    }

    /// Call `method`, failing with [`RpcError::Timeout`] if no complete
    /// response line arrives within `timeout`.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Map<String, Value>, RpcError> {
        let request = AdminRequest::new(
            NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        );
        let line = request
            .encode()
            .map_err(|e| RpcError::Protocol(format!("failed to encode request: {e}")))?;

        debug!(
            method,
            correlation_id = request.correlation_id,
            endpoint = %self.endpoint,
            "Admin RPC"
        );

        let raw = match tokio::time::timeout(timeout, self.exchange(&line)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout,
                });
            }
        };

        let response =
            AdminResponse::decode(&raw).map_err(|e| RpcError::Protocol(e.to_string()))?;

        if let Some(id) = response.correlation_id() {
            if id != request.correlation_id {
                return Err(RpcError::Protocol(format!(
                    "correlation id mismatch: sent {}, received {id}",
                    request.correlation_id
                )));
            }
        }

        match response {
            AdminResponse::Success { result, .. } => Ok(result),
            AdminResponse::Failure { error, .. } => Err(RpcError::Remote {
                method: method.to_string(),
                message: error,
            }),
        }
    }

    async fn exchange(&self, line: &[u8]) -> Result<String, RpcError> {
        match &self.endpoint {
            AdminEndpoint::Unix(path) => {
                if !path.exists() {
                    return Err(self.unavailable("socket not found"));
                }
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| self.unavailable(e))?;
                self.exchange_on(stream, line).await
            }
            AdminEndpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|e| self.unavailable(e))?;
                self.exchange_on(stream, line).await
            }
        }
    }

    async fn exchange_on<S>(&self, stream: S, line: &[u8]) -> Result<String, RpcError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);

        writer
            .write_all(line)
            .await
            .map_err(|e| self.unavailable(format!("write failed: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.unavailable(format!("write failed: {e}")))?;

        let mut reader = BufReader::new(reader.take(MAX_FRAME_BYTES as u64 + 1));
        let mut buf = Vec::new();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| RpcError::Protocol(format!("read failed: {e}")))?;

        if n == 0 {
            return Err(RpcError::Protocol(
                "connection closed before a response frame".to_string(),
            ));
        }
        if buf.last() != Some(&b'\n') {
            return Err(RpcError::Protocol(if buf.len() > MAX_FRAME_BYTES {
                format!("response frame exceeds {MAX_FRAME_BYTES} bytes")
            } else {
                "connection closed mid-frame".to_string()
            }));
        }

        String::from_utf8(buf)
            .map_err(|e| RpcError::Protocol(format!("response is not UTF-8: {e}")))
    }

    fn unavailable(&self, reason: impl ToString) -> RpcError {
        RpcError::ChannelUnavailable {
            endpoint: self.endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use yggctl_test_utils::daemon::{FakeDaemon, Reply};
    use yggctl_test_utils::tracing_setup::init_test_tracing;

    #[test]
    fn test_default_timeout() {
        let transport = RpcTransport::new(AdminEndpoint::Unix(PathBuf::from("/tmp/x.sock")));
        assert_eq!(transport.timeout(), Duration::from_secs(5));
        let transport = transport.with_timeout(Duration::from_millis(10));
        assert_eq!(transport.timeout(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_missing_socket_is_channel_unavailable() {
        let transport =
            RpcTransport::new(AdminEndpoint::Unix(PathBuf::from("/nonexistent/yggdrasil.sock")));
        assert!(!transport.probe().await);

        let result = transport.call("getSelf", Map::new()).await;
        assert!(matches!(result, Err(RpcError::ChannelUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_refused_tcp_is_channel_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = RpcTransport::new(AdminEndpoint::Tcp(addr.to_string()));
        let result = transport.call("getSelf", Map::new()).await;
        assert!(matches!(result, Err(RpcError::ChannelUnavailable { .. })));
    }

    fn transport_for(daemon: &FakeDaemon) -> RpcTransport {
        RpcTransport::new(AdminEndpoint::Unix(daemon.socket_path().to_path_buf()))
            .with_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_call_returns_result_object() {
        init_test_tracing();
        let daemon = FakeDaemon::builder()
            .result("getSelf", json!({ "address": "200::1" }))
            .start()
            .await;
        let transport = transport_for(&daemon);

        assert!(transport.probe().await);
        let result = transport.call("getSelf", Map::new()).await.unwrap();
        assert_eq!(result["address"], "200::1");
    }

    #[tokio::test]
    async fn test_correlation_mismatch_is_protocol_error() {
        let daemon = FakeDaemon::builder()
            .reply(
                "getSelf",
                Reply::Raw(r#"{"correlationId":0,"result":{}}"#.to_string()),
            )
            .start()
            .await;

        let result = transport_for(&daemon).call("getSelf", Map::new()).await;
        match result {
            Err(RpcError::Protocol(reason)) => assert!(reason.contains("correlation id mismatch")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_is_protocol_error() {
        let padding = "x".repeat(MAX_FRAME_BYTES + 16);
        let daemon = FakeDaemon::builder()
            .reply(
                "getPeers",
                Reply::Raw(format!(r#"{{"result":{{"pad":"{padding}"}}}}"#)),
            )
            .start()
            .await;

        let result = transport_for(&daemon).call("getPeers", Map::new()).await;
        match result {
            Err(RpcError::Protocol(reason)) => assert!(reason.contains("exceeds")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_per_call_timeout_overrides_default() {
        let daemon = FakeDaemon::builder().reply("getSelf", Reply::Silent).start().await;
        let transport = transport_for(&daemon).with_timeout(Duration::from_secs(60));

        let result = transport
            .call_with_timeout("getSelf", Map::new(), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(RpcError::Timeout { .. })));
    }
}
