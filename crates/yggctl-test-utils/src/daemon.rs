//! A scripted stand-in for the daemon's admin socket.
//!
//! [`FakeDaemon`] listens on a Unix socket in a temp directory and answers
//! each request line according to a per-method [`Reply`]. Every request it
//! receives is recorded so tests can assert on what was sent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// How the fake daemon answers one method.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `{"correlationId": <echoed>, "result": <value>}`
    Result(Value),
    /// `{"correlationId": <echoed>, "error": <message>}`
    Error(String),
    /// Write this exact line (a trailing newline is added).
    Raw(String),
    /// Read the request and never answer.
    Silent,
    /// Read the request and close the connection without answering.
    Close,
}

/// Builder for [`FakeDaemon`].
#[derive(Default)]
pub struct FakeDaemonBuilder {
    replies: HashMap<String, Reply>,
}

impl FakeDaemonBuilder {
    pub fn reply(mut self, method: &str, reply: Reply) -> Self {
        self.replies.insert(method.to_string(), reply);
        self
    }

    /// Shorthand for a successful `result` object.
    pub fn result(self, method: &str, result: Value) -> Self {
        self.reply(method, Reply::Result(result))
    }

    /// Bind the socket and start serving.
    pub async fn start(self) -> FakeDaemon {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("yggdrasil.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind fake admin socket");

        let replies = Arc::new(self.replies);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server = {
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let replies = Arc::clone(&replies);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(serve_connection(stream, replies, requests));
                }
            })
        };

        FakeDaemon {
            socket_path,
            requests,
            server,
            _temp_dir: temp_dir,
        }
    }
}

/// A running fake admin socket. Stops serving when dropped.
pub struct FakeDaemon {
    socket_path: PathBuf,
    requests: Arc<Mutex<Vec<Value>>>,
    server: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl FakeDaemon {
    pub fn builder() -> FakeDaemonBuilder {
        FakeDaemonBuilder::default()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `unix://` endpoint string for this socket.
    pub fn endpoint(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }

    /// All requests received so far, as parsed JSON, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Methods of all requests received so far.
    pub fn methods(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r["method"].as_str().map(String::from))
            .collect()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve_connection(
    stream: UnixStream,
    replies: Arc<HashMap<String, Reply>>,
    requests: Arc<Mutex<Vec<Value>>>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
        return;
    }

    let request: Value = serde_json::from_str(&line).unwrap_or(Value::Null);
    requests
        .lock()
        .expect("request log poisoned")
        .push(request.clone());

    let correlation_id = request["correlationId"].clone();
    let method = request["method"].as_str().unwrap_or_default();
    let reply = replies
        .get(method)
        .cloned()
        .unwrap_or_else(|| Reply::Error(format!("unknown method: {method}")));

    let out = match reply {
        Reply::Result(result) => json!({ "correlationId": correlation_id, "result": result }).to_string(),
        Reply::Error(message) => json!({ "correlationId": correlation_id, "error": message }).to_string(),
        Reply::Raw(raw) => raw,
        Reply::Silent => {
            std::future::pending::<()>().await;
            return;
        }
        Reply::Close => return,
    };

    let _ = write_half.write_all(out.as_bytes()).await;
    let _ = write_half.write_all(b"\n").await;
    let _ = write_half.flush().await;
}
