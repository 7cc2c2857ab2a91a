//! Per-connection request loop.
//!
//! Each accepted socket is upgraded to a WebSocket. Every inbound text frame
//! is one request, handled in arrival order. Outbound status messages go
//! through a bounded outbox drained by a writer task; a client that stops
//! reading eventually stalls its own session, and a client that has gone
//! away only causes its statuses to be dropped.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gravity_protocol::{Request, StatusMessage, ValidationError};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{WebSocketStream, accept_async_with_config};
use tracing::{debug, warn};

use super::SESSION_TARGET;
use crate::connections::{ConnectionGuard, ConnectionId};
use crate::executor::RequestExecutor;
use crate::health::HealthReporter;

/// Status messages queued per connection before the session waits on the
/// writer.
const OUTBOX_CAPACITY: usize = 32;

type FrameSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type FrameSource = SplitStream<WebSocketStream<TcpStream>>;

pub(crate) struct Session {
    guard: ConnectionGuard,
    executor: RequestExecutor,
    reporter: Arc<dyn HealthReporter>,
    outbox: Sender<StatusMessage>,
}

impl Session {
    /// Serves one connection until the peer closes it or a read fails.
    ///
    /// The guard is released when this future completes or is dropped.
    pub(crate) async fn run(
        stream: TcpStream,
        guard: ConnectionGuard,
        executor: RequestExecutor,
        reporter: Arc<dyn HealthReporter>,
        max_message_bytes: usize,
    ) {
        let config = websocket_config(max_message_bytes);
        let socket = match accept_async_with_config(stream, Some(config)).await {
            Ok(socket) => socket,
            Err(error) => {
                debug!(
                    target: SESSION_TARGET,
                    connection = %guard.id(),
                    %error,
                    "websocket handshake failed"
                );
                return;
            }
        };
        let (sink, source) = socket.split();

        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        let writer = tokio::spawn(write_loop(guard.id(), sink, inbox));
        let session = Self {
            guard,
            executor,
            reporter,
            outbox,
        };
        session.read_loop(source).await;
        // Closing the outbox lets the writer flush what is queued and exit.
        drop(session);
        if let Err(error) = writer.await {
            warn!(target: SESSION_TARGET, %error, "status writer task failed");
        }
    }

    fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    async fn read_loop(&self, mut source: FrameSource) {
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => self.handle_frame(text.as_bytes()).await,
                Some(Ok(Message::Binary(bytes))) => self.handle_frame(&bytes).await,
                Some(Ok(Message::Close(_))) | None => {
                    debug!(target: SESSION_TARGET, connection = %self.id(), "client closed connection");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(WsError::Capacity(error))) => {
                    warn!(
                        target: SESSION_TARGET,
                        connection = %self.id(),
                        %error,
                        "inbound message exceeds size limit; closing connection"
                    );
                    return;
                }
                Some(Err(error)) => {
                    debug!(
                        target: SESSION_TARGET,
                        connection = %self.id(),
                        %error,
                        "connection read failed"
                    );
                    return;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: &[u8]) {
        let parsed = match gravity_protocol::parse(frame) {
            Ok(parsed) => parsed,
            Err(malformed) => {
                debug!(
                    target: SESSION_TARGET,
                    connection = %self.id(),
                    detail = %malformed.detail().unwrap_or_default(),
                    "rejecting malformed message"
                );
                self.send(StatusMessage::bad_message(malformed.to_string(), malformed.raw()))
                    .await;
                return;
            }
        };

        match parsed.validate() {
            Ok(request) => self.execute(&request).await,
            Err(error) => self.reject(&error, parsed.raw()).await,
        }
    }

    async fn reject(&self, error: &ValidationError, raw: &str) {
        debug!(
            target: SESSION_TARGET,
            connection = %self.id(),
            %error,
            "rejecting invalid request"
        );
        let message = match error.request_id() {
            Some(request_id) => StatusMessage::error(request_id, error.to_string()),
            None => StatusMessage::bad_message(error.to_string(), raw),
        };
        self.send(message).await;
    }

    async fn execute(&self, request: &Request) {
        let request_id = request.request_id();
        self.send(StatusMessage::pending(request_id)).await;
        self.reporter.request_accepted(self.id(), request_id);

        let result = self
            .executor
            .execute(request.input_file(), request.output_file())
            .await;
        self.reporter
            .request_finished(self.id(), request_id, result.as_ref().copied());

        let message = match result {
            Ok(()) => StatusMessage::complete(request_id),
            Err(error) => StatusMessage::error(request_id, error.to_string()),
        };
        self.send(message).await;
    }

    async fn send(&self, message: StatusMessage) {
        if self.outbox.send(message).await.is_err() {
            debug!(
                target: SESSION_TARGET,
                connection = %self.id(),
                "client gone; dropping status message"
            );
        }
    }
}

fn websocket_config(max_message_bytes: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_bytes);
    config.max_frame_size = Some(max_message_bytes);
    config
}

async fn write_loop(id: ConnectionId, mut sink: FrameSink, mut inbox: Receiver<StatusMessage>) {
    while let Some(message) = inbox.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(error) => {
                warn!(target: SESSION_TARGET, connection = %id, %error, "failed to encode status message");
                continue;
            }
        };
        if let Err(error) = sink.send(Message::Text(text.into())).await {
            debug!(
                target: SESSION_TARGET,
                connection = %id,
                %error,
                "failed to send status message; dropping remaining output"
            );
            return;
        }
    }
    if let Err(error) = sink.close().await {
        debug!(target: SESSION_TARGET, connection = %id, %error, "failed to close websocket");
    }
}
