// src/transport/client.rs — Reconnecting WebSocket client
//
// One driver task owns the socket. Callers talk to it through a command
// channel while Connected; in every other state sends land in a FIFO queue
// that is flushed before any later traffic once the socket is back.
//
// Disconnected -> Connecting -> Connected -> Disconnected (normal close)
//                                   \-> Reconnecting -> Connected ...
//                                              \-> Disconnected (budget spent)

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message as WsMessage, Utf8Bytes};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{
    parse_inbound, ConnectionState, Envelope, InboundMessage, OutboundMessage, TransportEvent,
    TransportStatus,
};
use crate::infra::config::TransportConfig;
use crate::infra::errors::ChatError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type EventHandler = Arc<dyn Fn(TransportEvent) + Send + Sync>;

enum Command {
    Send(Envelope),
    Close,
}

/// Whether an outbound message went straight to the socket or was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

struct Shared {
    state: ConnectionState,
    reconnect_attempts: u32,
    queue: VecDeque<Envelope>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    manual_close: bool,
    /// Bumped by every `connect()`; a driver only writes state it owns.
    generation: u64,
    driver: Option<JoinHandle<()>>,
}

/// Why a live connection ended.
enum Closed {
    Normal,
    Abnormal(String),
}

pub struct TransportClient {
    endpoint: String,
    config: TransportConfig,
    shared: Arc<Mutex<Shared>>,
    handler: EventHandler,
}

impl TransportClient {
    /// Build a client for `user_id`. Nothing connects until `connect()`.
    pub fn new(
        config: TransportConfig,
        user_id: &str,
        handler: impl Fn(TransportEvent) + Send + Sync + 'static,
    ) -> Result<Self, ChatError> {
        let endpoint = endpoint_for(&config.url, user_id)?;
        Ok(Self {
            endpoint,
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                reconnect_attempts: 0,
                queue: VecDeque::new(),
                commands: None,
                manual_close: false,
                generation: 0,
                driver: None,
            })),
            handler: Arc::new(handler),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start the driver task. No-op while one is already running, unless
    /// that one is still shutting down after `disconnect()`: the new driver
    /// then waits for it to finish before dialing.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut shared = lock(&self.shared);
        let running = shared.driver.as_ref().is_some_and(|d| !d.is_finished());
        if running && !shared.manual_close {
            tracing::debug!(state = %shared.state, "Transport already running");
            return;
        }
        let previous = shared.driver.take().filter(|_| running);
        if previous.is_some() {
            tracing::debug!("Previous connection still closing; reconnecting after it");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        shared.generation += 1;
        shared.commands = Some(tx);
        shared.manual_close = false;
        shared.reconnect_attempts = 0;
        shared.state = ConnectionState::Connecting;

        let driver = Driver {
            endpoint: self.endpoint.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
            handler: self.handler.clone(),
            generation: shared.generation,
        };
        shared.driver = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            driver.run(rx).await;
        }));
    }

    /// User-initiated close. Never followed by a reconnect.
    pub fn disconnect(&self) {
        let mut shared = lock(&self.shared);
        shared.manual_close = true;
        match shared.commands.take() {
            Some(tx) => {
                let _ = tx.send(Command::Close);
            }
            None => shared.state = ConnectionState::Disconnected,
        }
    }

    /// Send now if connected, otherwise queue for the next connection.
    pub fn send(&self, message: OutboundMessage) -> Delivery {
        let envelope = Envelope::new(message);
        let mut shared = lock(&self.shared);

        if shared.state == ConnectionState::Connected {
            if let Some(tx) = shared.commands.clone() {
                return match tx.send(Command::Send(envelope)) {
                    Ok(()) => Delivery::Sent,
                    Err(mpsc::error::SendError(cmd)) => {
                        // Driver already gone; keep the message for the next connection
                        if let Command::Send(envelope) = cmd {
                            shared.queue.push_back(envelope);
                        }
                        Delivery::Queued
                    }
                };
            }
        }

        tracing::debug!(state = %shared.state, queued = shared.queue.len() + 1, "Queueing outbound message");
        shared.queue.push_back(envelope);
        Delivery::Queued
    }

    pub fn send_chat_message(&self, text: &str, session_id: Option<&str>) -> Delivery {
        self.send(OutboundMessage::ChatMessage {
            message: text.to_string(),
            session_id: session_id.map(str::to_string),
        })
    }

    pub fn request_history(&self, limit: Option<usize>) -> Delivery {
        self.send(OutboundMessage::GetHistory { limit })
    }

    pub fn start_typing(&self) -> Delivery {
        self.send(OutboundMessage::TypingStart)
    }

    pub fn stop_typing(&self) -> Delivery {
        self.send(OutboundMessage::TypingStop)
    }

    pub fn status(&self) -> TransportStatus {
        let shared = lock(&self.shared);
        TransportStatus {
            connected: shared.state == ConnectionState::Connected,
            state: shared.state,
            reconnect_attempts: shared.reconnect_attempts,
            queued_message_count: shared.queue.len(),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).state == ConnectionState::Connected
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        if let Some(driver) = lock(&self.shared).driver.take() {
            driver.abort();
        }
    }
}

/// `{base}/{user_id}` with the id percent-encoded.
fn endpoint_for(base: &str, user_id: &str) -> Result<String, ChatError> {
    let mut url =
        Url::parse(base).map_err(|e| ChatError::Config(format!("invalid transport url '{base}': {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChatError::Config(format!(
            "transport url must use ws:// or wss://, got '{base}'"
        )));
    }
    url.path_segments_mut()
        .map_err(|_| ChatError::Config(format!("transport url '{base}' cannot carry a path")))?
        .pop_if_empty()
        .push(user_id);
    Ok(url.to_string())
}

fn client_close_frame() -> CloseFrame {
    CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static("client disconnect"),
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // State stays consistent even if a handler panicked mid-update
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Driver {
    endpoint: String,
    config: TransportConfig,
    shared: Arc<Mutex<Shared>>,
    handler: EventHandler,
    generation: u64,
}

impl Driver {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let backoff = self.config.reconnect_backoff();
        let max_attempts = self.config.max_reconnect_attempts;
        let mut attempt: u32 = 0;
        self.emit(TransportEvent::StatusChanged(ConnectionState::Connecting));

        loop {
            if self.closing() {
                break;
            }

            tracing::debug!(endpoint = %self.endpoint, attempt, "Connecting");
            let connected = match self.until_closed(connect_async(self.endpoint.as_str()), &mut rx).await {
                None => break,
                Some(result) => result,
            };

            match connected {
                Ok((ws, _)) => {
                    attempt = 0;
                    match self.run_connection(ws, &mut rx).await {
                        Closed::Normal => break,
                        Closed::Abnormal(reason) => {
                            tracing::warn!("Connection lost: {reason}");
                            self.emit_error(ChatError::Transport(format!("connection lost: {reason}")));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, "Connection failed: {e}");
                    self.emit_error(ChatError::Transport(format!("connection failed: {e}")));
                }
            }

            if self.closing() {
                break;
            }

            attempt += 1;
            if attempt > max_attempts {
                let err = ChatError::ReconnectExhausted {
                    attempts: max_attempts,
                };
                tracing::error!("{err}");
                self.emit_error(err);
                break;
            }

            let delay = backoff.delay(attempt);
            {
                let mut shared = lock(&self.shared);
                shared.state = ConnectionState::Reconnecting;
                shared.reconnect_attempts = attempt;
            }
            tracing::info!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            self.emit(TransportEvent::StatusChanged(ConnectionState::Reconnecting));
            self.emit(TransportEvent::Reconnecting { attempt, delay });

            if self.until_closed(tokio::time::sleep(delay), &mut rx).await.is_none() {
                break;
            }
        }

        {
            let mut shared = lock(&self.shared);
            if shared.generation == self.generation {
                shared.state = ConnectionState::Disconnected;
                shared.commands = None;
            }
            while let Ok(cmd) = rx.try_recv() {
                if let Command::Send(envelope) = cmd {
                    shared.queue.push_back(envelope);
                }
            }
        }
        self.emit(TransportEvent::StatusChanged(ConnectionState::Disconnected));
    }

    /// Await `fut`, returning `None` if a close is requested first.
    async fn until_closed<F: Future>(
        &self,
        fut: F,
        rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Some(out),
                cmd = rx.recv() => match cmd {
                    Some(Command::Send(envelope)) => {
                        lock(&self.shared).queue.push_back(envelope);
                    }
                    Some(Command::Close) | None => {
                        self.mark_closed();
                        return None;
                    }
                },
            }
        }
    }

    async fn run_connection(
        &self,
        ws: WsStream,
        rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Closed {
        let (mut write, mut read) = ws.split();

        // Claim the backlog and open the gate atomically: anything sent from
        // here on goes through `rx`, which is read only after the backlog.
        let claimed = {
            let mut shared = lock(&self.shared);
            if shared.generation != self.generation || shared.manual_close {
                None
            } else {
                shared.state = ConnectionState::Connected;
                shared.reconnect_attempts = 0;
                Some(std::mem::take(&mut shared.queue))
            }
        };
        // Closed while the handshake was in flight
        let Some(mut backlog) = claimed else {
            let _ = write.send(WsMessage::Close(Some(client_close_frame()))).await;
            return Closed::Normal;
        };
        tracing::info!(endpoint = %self.endpoint, queued = backlog.len(), "Connected");
        self.emit(TransportEvent::StatusChanged(ConnectionState::Connected));

        while let Some(envelope) = backlog.pop_front() {
            if let Err(e) = write_envelope(&mut write, &envelope).await {
                backlog.push_front(envelope);
                self.requeue(backlog, rx);
                return Closed::Abnormal(e);
            }
        }

        let interval = self.config.keepalive_interval();
        let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    if lock(&self.shared).state != ConnectionState::Connected {
                        continue;
                    }
                    if let Err(e) = write_envelope(&mut write, &Envelope::new(OutboundMessage::Ping)).await {
                        self.requeue(VecDeque::new(), rx);
                        return Closed::Abnormal(e);
                    }
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::Send(envelope)) => {
                        if let Err(e) = write_envelope(&mut write, &envelope).await {
                            self.requeue(VecDeque::from([envelope]), rx);
                            return Closed::Abnormal(e);
                        }
                    }
                    Some(Command::Close) | None => {
                        self.mark_closed();
                        let _ = write.send(WsMessage::Close(Some(client_close_frame()))).await;
                        tracing::info!("Disconnected by client");
                        return Closed::Normal;
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = write.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let normal = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                        if normal {
                            tracing::info!("Server closed the connection normally");
                            self.mark_closed();
                            return Closed::Normal;
                        }
                        self.requeue(VecDeque::new(), rx);
                        let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                        return Closed::Abnormal(format!("closed with code {code}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.requeue(VecDeque::new(), rx);
                        return Closed::Abnormal(e.to_string());
                    }
                    None => {
                        self.requeue(VecDeque::new(), rx);
                        return Closed::Abnormal("stream ended".into());
                    }
                },
            }
        }
    }

    /// Put unsent envelopes back at the head of the queue, followed by
    /// whatever is still buffered in the channel, and leave Connected.
    fn requeue(&self, mut unsent: VecDeque<Envelope>, rx: &mut mpsc::UnboundedReceiver<Command>) {
        let mut shared = lock(&self.shared);
        let owned = shared.generation == self.generation;
        if owned {
            shared.state = ConnectionState::Reconnecting;
        }
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                Command::Send(envelope) => unsent.push_back(envelope),
                Command::Close if owned => shared.manual_close = true,
                Command::Close => {}
            }
        }
        unsent.extend(shared.queue.drain(..));
        shared.queue = unsent;
    }

    /// A newer `connect()` also retires this driver.
    fn closing(&self) -> bool {
        let shared = lock(&self.shared);
        shared.manual_close || shared.generation != self.generation
    }

    fn mark_closed(&self) {
        let mut shared = lock(&self.shared);
        if shared.generation == self.generation {
            shared.manual_close = true;
        }
    }

    fn handle_text(&self, text: &str) {
        match parse_inbound(text) {
            Ok(Some(message)) => {
                match &message {
                    InboundMessage::BotTyping { is_typing } => {
                        self.emit(TransportEvent::TypingChanged(*is_typing));
                    }
                    InboundMessage::Error { message } => {
                        self.emit(TransportEvent::Error {
                            message: message.clone(),
                            terminal: false,
                        });
                    }
                    InboundMessage::ConnectionEstablished { .. } => {
                        tracing::debug!("Server acknowledged connection");
                    }
                    _ => {}
                }
                self.emit(TransportEvent::MessageReceived(message));
            }
            Ok(None) => tracing::warn!("Ignoring unknown message type: {text}"),
            Err(e) => tracing::warn!("Dropping malformed frame: {e}"),
        }
    }

    fn emit(&self, event: TransportEvent) {
        (self.handler)(event);
    }

    fn emit_error(&self, err: ChatError) {
        self.emit(TransportEvent::Error {
            terminal: err.is_terminal(),
            message: err.to_string(),
        });
    }
}

async fn write_envelope<S>(write: &mut S, envelope: &Envelope) -> Result<(), String>
where
    S: futures::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(envelope).map_err(|e| e.to_string())?;
    write
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}
