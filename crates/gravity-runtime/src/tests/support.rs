//! Shared helpers for runtime test suites.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gravity_config::Config;
use gravity_protocol::StatusMessage;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::{
    ConnectionSet, HandlerOutcome, HandlerRegistry, HandlerResult, ProtocolServer,
    RegisteredHandler, ServeError, StructuredHealthReporter, SuspendingHandler,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Copies the input to the output.
pub(crate) fn copy_input(input: &Path, output: &Path) -> HandlerResult {
    fs::copy(input, output)?;
    Ok(HandlerOutcome::Success)
}

/// Suspending copy handler that parks inputs named `slow*` until released.
pub(crate) struct GatedCopy {
    pub(crate) gate: Arc<Notify>,
}

#[async_trait]
impl SuspendingHandler for GatedCopy {
    async fn invoke(&self, input: &Path, output: &Path) -> HandlerResult {
        let is_slow = input
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("slow"));
        if is_slow {
            self.gate.notified().await;
        }
        tokio::fs::copy(input, output).await?;
        Ok(HandlerOutcome::Success)
    }
}

/// Temporary directory holding request files.
pub(crate) struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    /// Writes an input file and returns its path.
    pub(crate) fn input(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, "a,b\n1,2\n").expect("write input");
        path
    }

    /// Path for an output file that does not exist yet.
    pub(crate) fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Builds the JSON text of one request.
pub(crate) fn request_text(request_id: &str, input: &Path, output: &Path) -> String {
    serde_json::json!({
        "requestId": request_id,
        "inputFile": input,
        "outputFile": output,
    })
    .to_string()
}

/// A server running on an ephemeral loopback port.
pub(crate) struct RunningServer {
    pub(crate) address: SocketAddr,
    pub(crate) connections: Arc<ConnectionSet>,
    pub(crate) task: JoinHandle<Result<(), ServeError>>,
}

impl RunningServer {
    pub(crate) async fn start(handler: RegisteredHandler) -> Self {
        Self::start_with(handler, |server| server).await
    }

    pub(crate) async fn start_with(
        handler: RegisteredHandler,
        customise: impl FnOnce(ProtocolServer) -> ProtocolServer,
    ) -> Self {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        Self::start_config(config, handler, customise).await
    }

    pub(crate) async fn start_config(
        config: Config,
        handler: RegisteredHandler,
        customise: impl FnOnce(ProtocolServer) -> ProtocolServer,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::with_handler(handler));
        let server = ProtocolServer::with_reporter(
            config,
            registry,
            Arc::new(StructuredHealthReporter::new()),
        )
        .expect("handler registered");
        let bound = customise(server).bind().await.expect("bind server");
        let address = bound.local_addr().expect("local address");
        let connections = bound.connections();
        let task = tokio::spawn(bound.serve());
        Self {
            address,
            connections,
            task,
        }
    }

    pub(crate) async fn connect(&self) -> Client {
        Client::connect(self.address).await
    }

    /// Polls until the open connection count matches `expected`.
    pub(crate) async fn wait_for_open(&self, expected: usize) -> bool {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.connections.open_count() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// JSON value a status message takes on the wire.
pub(crate) fn wire(message: &StatusMessage) -> Value {
    serde_json::to_value(message).expect("encode status message")
}

/// WebSocket test client.
pub(crate) struct Client {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub(crate) async fn connect(address: SocketAddr) -> Self {
        let (socket, _) = connect_async(format!("ws://{address}"))
            .await
            .expect("websocket handshake");
        Self { socket }
    }

    pub(crate) async fn send(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_owned().into()))
            .await
            .expect("send request");
    }

    pub(crate) async fn send_binary(&mut self, bytes: &[u8]) {
        self.socket
            .send(Message::Binary(bytes.to_vec().into()))
            .await
            .expect("send request");
    }

    /// Next text frame, or `None` once the server closed the connection.
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        loop {
            let frame = tokio::time::timeout(READ_TIMEOUT, self.socket.next())
                .await
                .expect("server responded in time");
            match frame {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(Message::Close(_)) | Err(_)) | None => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    pub(crate) async fn next_status(&mut self) -> Value {
        let text = self.next_text().await.expect("status frame");
        serde_json::from_str(&text).expect("status message json")
    }
}
