//! Streaming Connection
//!
//! [`StreamConn`] owns the socket, the handler registry, and the subscription
//! set. A single task drives it: it reads frames, dispatches them to
//! handlers inline, and reconnects after failures. Other tasks (and handlers
//! themselves) talk to it through a cloneable [`StreamHandle`], which posts
//! commands that are applied between frames.
//!
//! # Lifecycle
//!
//! 1. `subscribe`/`run` connect, authenticate, and restore the full
//!    subscription set in one frame. Only then is the state `Ready`, and
//!    handlers receive `{"ev":"status","status":"authorized"}`.
//! 2. The consume loop reads until the socket fails, the server announces a
//!    disconnect, or a handler returns an error.
//! 3. Handlers receive a synthetic `status` entity
//!    (`{"ev":"status","status":"disconnected"}`), then the reconnect loop
//!    runs `max_retries` attempts with linear backoff.
//! 4. Authentication rejections and an exhausted reconnect budget end `run`
//!    with an error; `close` ends it cleanly.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use regex::Regex;
use serde_json::{Map, Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::auth::{self, AuthReply};
use super::codec::{self, STATUS_CHANNEL};
use super::reconnect::ReconnectPolicy;
use super::registry::{Handler, HandlerRegistry, IntoPattern};
use super::state::ConnectionState;
use super::subscription::SubscriptionSet;
use crate::domain::entity::{Entity, EntityKind};
use crate::error::{Error, Result};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

struct Socket {
    write: WsWrite,
    read: WsRead,
}

// =============================================================================
// Handle
// =============================================================================

enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Register {
        pattern: Regex,
        handler: Arc<dyn Handler>,
        symbols: Option<HashSet<String>>,
    },
    Deregister(String),
}

/// Cloneable remote control for a [`StreamConn`].
///
/// Commands are queued and applied by the connection task between frames,
/// in call order.
#[derive(Clone)]
pub struct StreamHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    subscriptions: SubscriptionSet,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Queue a subscribe for `channels`.
    pub fn subscribe<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post(Command::Subscribe(
            channels.into_iter().map(Into::into).collect(),
        ))
    }

    /// Queue an unsubscribe for `channels`.
    pub fn unsubscribe<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post(Command::Unsubscribe(
            channels.into_iter().map(Into::into).collect(),
        ))
    }

    /// Queue a handler registration. The pattern is compiled immediately.
    pub fn register(
        &self,
        pattern: impl IntoPattern,
        handler: impl Handler + 'static,
    ) -> Result<()> {
        self.post(Command::Register {
            pattern: pattern.into_pattern()?,
            handler: Arc::new(handler),
            symbols: None,
        })
    }

    /// Queue a handler registration restricted to `symbols`.
    pub fn register_with_symbols<I, S>(
        &self,
        pattern: impl IntoPattern,
        handler: impl Handler + 'static,
        symbols: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post(Command::Register {
            pattern: pattern.into_pattern()?,
            handler: Arc::new(handler),
            symbols: Some(symbols.into_iter().map(Into::into).collect()),
        })
    }

    /// Queue removal of the handler registered for `pattern`.
    pub fn deregister(&self, pattern: impl Into<String>) -> Result<()> {
        self.post(Command::Deregister(pattern.into()))
    }

    /// Ask the connection to shut down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::transport("stream connection dropped"))
    }

    /// Sorted snapshot of the subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.snapshot()
    }

    fn post(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::transport("stream connection is gone"))
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection
// =============================================================================

enum Event {
    Cancelled,
    Command(Option<Command>),
    Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

/// Streaming connection.
pub struct StreamConn {
    config: StreamConfig,
    registry: HandlerRegistry,
    subscriptions: SubscriptionSet,
    socket: Option<Socket>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
}

impl StreamConn {
    /// Create a disconnected stream.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(config.reconnect);
        Self {
            config,
            registry: HandlerRegistry::new(),
            subscriptions: SubscriptionSet::new(),
            socket: None,
            policy,
            state_tx,
            commands_tx,
            commands_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// A handle for other tasks and for handlers.
    #[must_use]
    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            commands: self.commands_tx.clone(),
            state: self.state_tx.subscribe(),
            subscriptions: self.subscriptions.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Stream configuration.
    #[must_use]
    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Sorted snapshot of the subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.snapshot()
    }

    /// Register `handler` for channels matching `pattern`.
    pub fn register(
        &mut self,
        pattern: impl IntoPattern,
        handler: impl Handler + 'static,
    ) -> Result<()> {
        self.registry
            .register(pattern.into_pattern()?, Arc::new(handler), None);
        Ok(())
    }

    /// Register `handler` for channels matching `pattern`, for `symbols` only.
    pub fn register_with_symbols<I, S>(
        &mut self,
        pattern: impl IntoPattern,
        handler: impl Handler + 'static,
        symbols: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.register(
            pattern.into_pattern()?,
            Arc::new(handler),
            Some(symbols.into_iter().map(Into::into).collect()),
        );
        Ok(())
    }

    /// Remove the handler registered for `pattern`.
    pub fn deregister(&mut self, pattern: &str) -> bool {
        self.registry.deregister(pattern)
    }

    /// Add `channels` to the subscription set and make sure the socket is ready.
    ///
    /// A fresh connection restores the whole set; an existing one is sent
    /// only the newly added channels.
    pub async fn subscribe<I, S>(&mut self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let added = self.subscriptions.add(channels);
        let was_ready = self.state().is_ready();
        if !self.ensure_ready().await? || !was_ready || added.is_empty() {
            return Ok(());
        }
        let frame = self.config.dialect.subscribe_frame(&added);
        tracing::info!(channels = ?added, "Subscribing");
        self.send_json(&frame).await
    }

    /// Remove `channels` from the subscription set.
    ///
    /// The unsubscribe frame is only sent while the connection is ready.
    pub async fn unsubscribe<I, S>(&mut self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let removed = self.subscriptions.remove(channels);
        if removed.is_empty() || !self.state().is_ready() {
            return Ok(());
        }
        let frame = self.config.dialect.unsubscribe_frame(&removed);
        tracing::info!(channels = ?removed, "Unsubscribing");
        self.send_json(&frame).await
    }

    /// Subscribe `initial` and consume until closed or a terminal error.
    ///
    /// Returns `Ok(())` after [`close`](Self::close) or
    /// [`StreamHandle::close`]; authentication failures and reconnect
    /// exhaustion are returned as errors.
    pub async fn run<I, S>(&mut self, initial: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outcome = self.drive(initial).await;
        self.close().await;
        outcome
    }

    async fn drive<I, S>(&mut self, initial: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe(initial).await?;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            match self.consume().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal_for_stream() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Stream connection lost");
                    self.drop_socket();
                    self.dispatch_status(disconnected_entity()).await;
                    if !self.reconnect().await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Close the socket and move to `Closed`.
    pub async fn close(&mut self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Closing);
        self.cancel.cancel();
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.write.send(Message::Close(None)).await;
            let _ = socket.write.close().await;
        }
        self.set_state(ConnectionState::Closed);
        tracing::info!(url = %self.config.url, "Stream closed");
    }

    // =========================================================================
    // Connect & Authenticate
    // =========================================================================

    /// Make sure the socket is ready: one immediate attempt, then the
    /// reconnect loop. Returns `false` if cancelled first.
    async fn ensure_ready(&mut self) -> Result<bool> {
        if self.state().is_ready() {
            return Ok(true);
        }
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        match self.connect().await {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal_for_stream() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Stream connect failed");
                self.reconnect().await
            }
        }
    }

    /// Bounded reconnect loop. Returns `false` if cancelled while waiting.
    async fn reconnect(&mut self) -> Result<bool> {
        self.policy.reset();
        loop {
            let Some(delay) = self.policy.next_delay() else {
                let attempts = self.policy.attempt_count();
                tracing::error!(attempts, "Stream reconnect attempts exhausted");
                return Err(Error::ConnectionExhausted { attempts });
            };
            let attempt = self.policy.attempt_count();
            tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting stream");
            metrics::record_reconnect();

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Stream cancelled during reconnect delay");
                    return Ok(false);
                }
                () = tokio::time::sleep(delay) => {}
            }

            match self.connect().await {
                Ok(()) => {
                    self.policy.reset();
                    return Ok(true);
                }
                Err(e) if e.is_fatal_for_stream() => return Err(e),
                Err(e) => tracing::warn!(attempt, error = %e, "Reconnect attempt failed"),
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to stream");

        match self.open().await {
            Ok(socket) => {
                self.socket = Some(socket);
                if let Err(e) = self.restore().await {
                    self.drop_socket();
                    return Err(e);
                }
                self.set_state(ConnectionState::Ready);
                self.dispatch_status(authorized_entity()).await;
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<Socket> {
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async(self.config.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Authenticating);
        let frame = self.config.dialect.auth_frame(&self.config.credentials)?;
        write.send(Message::Text(frame.to_string().into())).await?;

        let reply = tokio::time::timeout(
            self.config.auth_timeout,
            self.await_auth(&mut write, &mut read),
        )
        .await;

        match reply {
            Ok(Ok(())) => {
                tracing::info!("Stream authenticated");
                Ok(Socket { write, read })
            }
            Ok(Err(e)) => {
                let _ = write.close().await;
                Err(e)
            }
            Err(_) => {
                let _ = write.close().await;
                Err(Error::transport(format!(
                    "no authentication reply within {:?}",
                    self.config.auth_timeout
                )))
            }
        }
    }

    async fn await_auth(&self, write: &mut WsWrite, read: &mut WsRead) -> Result<()> {
        loop {
            let text = match read.next().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    return Err(Error::transport("connection closed during authentication"));
                }
                Some(Ok(_)) => continue,
            };

            for frame in codec::decode(&text)? {
                match auth::evaluate(self.config.dialect, &frame) {
                    AuthReply::Pending => {}
                    AuthReply::Accepted => return Ok(()),
                    AuthReply::Rejected(reason) => {
                        tracing::error!(error = %reason, "Stream authentication rejected");
                        return Err(reason.into());
                    }
                }
            }
        }
    }

    /// Re-send the whole subscription set after (re)connecting.
    async fn restore(&mut self) -> Result<()> {
        let channels = self.subscriptions.snapshot();
        if channels.is_empty() {
            return Ok(());
        }
        tracing::info!(channels = ?channels, "Restoring subscriptions");
        let frame = self.config.dialect.subscribe_frame(&channels);
        self.send_json(&frame).await
    }

    // =========================================================================
    // Consume & Dispatch
    // =========================================================================

    /// Read until cancelled (`Ok`) or the connection breaks (`Err`).
    async fn consume(&mut self) -> Result<()> {
        loop {
            let event = {
                let Some(socket) = self.socket.as_mut() else {
                    return Err(Error::transport("stream is not connected"));
                };
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Event::Cancelled,
                    command = self.commands_rx.recv() => Event::Command(command),
                    message = socket.read.next() => Event::Frame(message),
                }
            };

            match event {
                Event::Cancelled => return Ok(()),
                Event::Command(Some(command)) => self.apply(command).await?,
                Event::Command(None) => {}
                Event::Frame(Some(Ok(Message::Text(text)))) => {
                    self.on_text(text.as_str()).await?;
                }
                Event::Frame(Some(Ok(Message::Binary(data)))) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    self.on_text(&text).await?;
                }
                Event::Frame(Some(Ok(Message::Ping(data)))) => {
                    if let Some(socket) = self.socket.as_mut() {
                        socket.write.send(Message::Pong(data)).await?;
                    }
                }
                Event::Frame(Some(Ok(Message::Close(_)))) => {
                    tracing::info!("Server sent close frame");
                    return Err(Error::transport("connection closed by server"));
                }
                Event::Frame(Some(Ok(_))) => {}
                Event::Frame(Some(Err(e))) => return Err(e.into()),
                Event::Frame(None) => {
                    tracing::info!("WebSocket stream ended");
                    return Err(Error::transport("connection closed"));
                }
            }
        }
    }

    async fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Subscribe(channels) => self.subscribe(channels).await,
            Command::Unsubscribe(channels) => self.unsubscribe(channels).await,
            Command::Register {
                pattern,
                handler,
                symbols,
            } => {
                self.registry.register(pattern, handler, symbols);
                Ok(())
            }
            Command::Deregister(pattern) => {
                self.registry.deregister(&pattern);
                Ok(())
            }
        }
    }

    async fn on_text(&self, text: &str) -> Result<()> {
        let frames = match codec::decode(text) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
                return Ok(());
            }
        };

        for frame in frames {
            let disconnect = frame.is_disconnect_notice();
            let channel = frame.channel.clone();
            self.dispatch(&channel, frame.into_entity()).await?;
            if disconnect {
                return Err(Error::transport("server reported disconnect"));
            }
        }
        Ok(())
    }

    async fn dispatch(&self, channel: &str, entity: Entity) -> Result<()> {
        metrics::record_stream_message(channel);

        for handler in self.registry.matching(channel, &entity) {
            handler
                .handle(self.handle(), channel.to_string(), entity.clone())
                .await
                .map_err(|e| Error::transport(format!("handler failed on {channel}: {e:#}")))?;
        }
        Ok(())
    }

    /// Deliver a synthetic status entity; handler failures are only logged.
    async fn dispatch_status(&self, entity: Entity) {
        if let Err(e) = self.dispatch(STATUS_CHANNEL, entity).await {
            tracing::warn!(error = %e, "Handler failed on status notice");
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn send_json(&mut self, frame: &Value) -> Result<()> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| Error::transport("stream is not connected"))?;
        socket
            .write
            .send(Message::Text(frame.to_string().into()))
            .await?;
        Ok(())
    }

    fn drop_socket(&mut self) {
        self.socket = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            if !previous.can_transition_to(next) {
                tracing::warn!(from = %previous, to = %next, "Unexpected stream state transition");
            }
            tracing::debug!(from = %previous, to = %next, "Stream state changed");
        }
        metrics::set_stream_state(next);
    }
}

impl std::fmt::Debug for StreamConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConn")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

/// Synthetic entity delivered to handlers when the socket drops.
#[must_use]
pub fn disconnected_entity() -> Entity {
    status_entity("disconnected")
}

/// Synthetic entity delivered to handlers each time the socket becomes ready.
#[must_use]
pub fn authorized_entity() -> Entity {
    status_entity("authorized")
}

fn status_entity(status: &str) -> Entity {
    let mut payload = Map::new();
    payload.insert("ev".to_string(), json!(STATUS_CHANNEL));
    payload.insert("status".to_string(), json!(status));
    Entity::new(EntityKind::Generic, payload)
}
