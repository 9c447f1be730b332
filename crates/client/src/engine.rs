// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sync engine: binds channel events to transcript mutations.
//!
//! The engine is an actor: [`SyncEngine::run`] is a single
//! `tokio::select!` loop that owns the transcript, the live transport,
//! and the connection manager. Consumers talk to it through a cloneable
//! [`EngineHandle`]; every command and every inbound frame is processed
//! to completion before the next one, so no two mutations interleave.
//!
//! The loop stays responsive while the connection manager retries in
//! the background, which is what lets sends fail fast during an outage
//! instead of stalling behind the reconnect.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use nt_core::protocol::{ClientEvent, ServerEvent};
use nt_core::{ClockSource, ConnectionState, DeliveryState, Message, MessageId, SystemClock};

use crate::connection::{
    ChannelConfig, ConnectionEvent, ConnectionManager, SharedChannelState, TransportFactory,
};
use crate::transcript::{TranscriptError, TranscriptStore};
use crate::transport::{Transport, TransportError, TransportResult, WebSocketTransport};

/// Capacity of the consumer notification channel.
const EVENT_CAPACITY: usize = 64;

/// Lifecycle state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No channel yet.
    Idle,
    /// Channel connected, events flowing.
    Live,
    /// Channel lost, reconnect in progress; sends are refused.
    Degraded,
    /// Shut down. Terminal.
    Closed,
}

/// Notifications delivered to subscribed consumers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The transcript gained an entry or a delivery state resolved.
    TranscriptChanged,
    /// The channel's connection state changed.
    ConnectionChanged(ConnectionState),
}

/// Error type for consumer-facing engine operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    /// The message text is empty after trimming. Nothing was appended.
    #[error("message is empty")]
    Empty,

    /// The engine has shut down.
    #[error("engine is closed")]
    Closed,

    /// The optimistic append was rejected by the transcript store.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// Commands sent from handles to the run loop.
enum EngineCommand {
    Connect {
        reply: oneshot::Sender<()>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<MessageId, SendError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Message>>,
    },
    State {
        reply: oneshot::Sender<EngineState>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable consumer-facing handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    shared: Arc<SharedChannelState>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Request a connection to the chat server.
    ///
    /// Idempotent: a no-op while already connected or connecting.
    pub async fn connect(&self) -> Result<(), SendError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::Connect { reply: tx })
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)
    }

    /// Submit a chat message.
    ///
    /// The message is appended to the transcript optimistically; the
    /// returned id identifies the entry whose delivery state reports
    /// the outcome. Fails with [`SendError::Empty`] (no transcript
    /// entry) when the text trims to nothing.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<MessageId, SendError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::Send {
                text: text.into(),
                reply: tx,
            })
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)?
    }

    /// An immutable ordered copy of the transcript.
    pub async fn snapshot(&self) -> Result<Vec<Message>, SendError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::Snapshot { reply: tx })
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)
    }

    /// The engine's lifecycle state.
    pub async fn engine_state(&self) -> Result<EngineState, SendError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::State { reply: tx })
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)
    }

    /// The channel's connection state (lock-free read).
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.get()
    }

    /// Subscribe to transcript and connection change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Shut the engine down.
    ///
    /// Cancels any pending reconnect, releases the channel, and stops
    /// the run loop. Terminal: every state can reach it, none can
    /// leave it.
    pub async fn shutdown(&self) -> Result<(), SendError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::Shutdown { reply: tx })
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)
    }
}

/// The sync engine run loop state.
///
/// Constructed with [`SyncEngine::new`] (production WebSocket
/// transport) or [`SyncEngine::with_factory`] (injectable transport
/// and clock, used by tests), then driven by spawning [`run`].
///
/// [`run`]: SyncEngine::run
pub struct SyncEngine<T: Transport + 'static> {
    state: EngineState,
    transcript: TranscriptStore,
    /// The live channel. `Some` exactly while `state == Live`.
    transport: Option<T>,
    manager: ConnectionManager<T>,
    shared: Arc<SharedChannelState>,
    connection_rx: mpsc::Receiver<ConnectionEvent<T>>,
    command_rx: mpsc::Receiver<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    clock: Arc<dyn ClockSource>,
}

impl SyncEngine<WebSocketTransport> {
    /// Create an engine backed by a real WebSocket transport.
    pub fn new(config: ChannelConfig) -> (Self, EngineHandle) {
        Self::with_factory(config, Arc::new(WebSocketTransport::new), Arc::new(SystemClock))
    }
}

impl<T: Transport + 'static> SyncEngine<T> {
    /// Create an engine with a custom transport factory and clock.
    pub fn with_factory(
        config: ChannelConfig,
        factory: TransportFactory<T>,
        clock: Arc<dyn ClockSource>,
    ) -> (Self, EngineHandle) {
        let shared = Arc::new(SharedChannelState::new());
        let (manager, connection_rx) =
            ConnectionManager::new(config, Arc::clone(&shared), factory);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = EngineHandle {
            command_tx,
            shared: Arc::clone(&shared),
            events: events.clone(),
        };

        let engine = SyncEngine {
            state: EngineState::Idle,
            transcript: TranscriptStore::new(),
            transport: None,
            manager,
            shared,
            connection_rx,
            command_rx,
            events,
            clock,
        };

        (engine, handle)
    }

    /// Drive the engine until shutdown.
    ///
    /// Runs as a single task; every command, connection event, and
    /// inbound frame is handled to completion before the next.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            // Every handle dropped: nothing can reach us.
                            self.close().await;
                            break;
                        }
                    }
                }
                maybe_event = self.connection_rx.recv() => {
                    if let Some(event) = maybe_event {
                        self.handle_connection_event(event);
                    }
                }
                frame = recv_frame(&mut self.transport) => {
                    self.handle_frame(frame).await;
                }
            }
        }
    }

    /// Handle a consumer command. Returns true when the loop must stop.
    async fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Connect { reply } => {
                self.manager.spawn_connect_task(false);
                self.emit_connection();
                let _ = reply.send(());
                false
            }
            EngineCommand::Send { text, reply } => {
                let result = self.handle_send(text).await;
                let _ = reply.send(result);
                false
            }
            EngineCommand::Snapshot { reply } => {
                let _ = reply.send(self.transcript.snapshot());
                false
            }
            EngineCommand::State { reply } => {
                let _ = reply.send(self.state);
                false
            }
            EngineCommand::Shutdown { reply } => {
                self.close().await;
                let _ = reply.send(());
                true
            }
        }
    }

    /// Optimistically append a user message and attempt delivery.
    async fn handle_send(&mut self, text: String) -> Result<MessageId, SendError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SendError::Empty);
        }

        let message = Message::local(trimmed, self.clock.now());
        let id = message.id;
        let event = ClientEvent::message(&message);

        self.transcript.append(message)?;
        self.emit(EngineEvent::TranscriptChanged);

        if self.state != EngineState::Live || self.transport.is_none() {
            // No channel: resolve immediately rather than drop.
            // Not buffered for later; resending is the user's call.
            let _ = self.transcript.update_delivery(id, DeliveryState::Failed);
            self.emit(EngineEvent::TranscriptChanged);
            return Ok(id);
        }

        let send_result = match self.transport.as_mut() {
            Some(t) => t.send(event).await,
            None => Err(TransportError::ConnectionClosed),
        };

        match send_result {
            Ok(()) => {
                let _ = self.transcript.update_delivery(id, DeliveryState::Sent);
                self.emit(EngineEvent::TranscriptChanged);
            }
            Err(e) => {
                // The write failed, but the frame may have left before
                // the channel died: the outcome is unresolved. Leave the
                // message pending; the sweep after reconnect marks it
                // failed if still unconfirmed.
                warn!(%id, error = %e, "send failed, channel lost");
                self.channel_lost().await;
            }
        }

        Ok(id)
    }

    /// Handle the outcome of one `recv` on the live transport.
    async fn handle_frame(&mut self, frame: TransportResult<Option<ServerEvent>>) {
        match frame {
            Ok(Some(event)) => self.handle_server_event(event),
            Ok(None) => {
                info!("channel closed by peer");
                self.channel_lost().await;
            }
            Err(TransportError::MalformedFrame(reason)) => {
                warn!(%reason, "discarding malformed frame");
            }
            Err(e) => {
                warn!(error = %e, "channel receive failed");
                self.channel_lost().await;
            }
        }
    }

    /// Apply one inbound server event to the transcript.
    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Message(wire) => match wire.decode() {
                Ok(message) => match self.transcript.append(message) {
                    Ok(()) => self.emit(EngineEvent::TranscriptChanged),
                    Err(e) => warn!(error = %e, "discarding duplicate inbound message"),
                },
                Err(e) => warn!(error = %e, "discarding malformed message"),
            },
        }
    }

    /// Handle a connection manager event.
    fn handle_connection_event(&mut self, event: ConnectionEvent<T>) {
        match event {
            ConnectionEvent::Connected(transport) => {
                if self.state == EngineState::Degraded {
                    // Sends from before the drop that were never
                    // confirmed are resolved conservatively: failed,
                    // never assumed sent.
                    let pending = self.transcript.pending_ids();
                    if !pending.is_empty() {
                        warn!(count = pending.len(), "marking unconfirmed sends failed");
                        for id in pending {
                            let _ = self.transcript.update_delivery(id, DeliveryState::Failed);
                        }
                        self.emit(EngineEvent::TranscriptChanged);
                    }
                }
                self.transport = Some(transport);
                self.state = EngineState::Live;
                info!("engine live");
                self.emit_connection();
            }
            ConnectionEvent::Failed { attempts, error } => {
                warn!(attempts, %error, "connection attempts exhausted");
                self.emit_connection();
            }
        }
    }

    /// Channel lost: drop the transport and start reconnecting.
    ///
    /// Pending messages are left pending until the reconnect sweep.
    async fn channel_lost(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.disconnect().await;
        }
        self.state = EngineState::Degraded;
        self.shared.set(ConnectionState::Disconnected);
        self.manager.spawn_connect_task(true);
        self.emit_connection();
    }

    /// Tear everything down. The loop exits after this.
    async fn close(&mut self) {
        self.manager.cancel();
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.disconnect().await;
        }
        self.state = EngineState::Closed;
        info!("engine closed");
        self.emit_connection();
    }

    fn emit(&self, event: EngineEvent) {
        // Lagging or absent subscribers are not our problem.
        let _ = self.events.send(event);
    }

    fn emit_connection(&self) {
        let _ = self
            .events
            .send(EngineEvent::ConnectionChanged(self.shared.get()));
    }
}

/// Await the next inbound event on the live transport, if any.
///
/// Pends forever when there is no transport, so the select arm simply
/// never fires while idle or degraded.
async fn recv_frame<T: Transport>(
    transport: &mut Option<T>,
) -> TransportResult<Option<ServerEvent>> {
    match transport.as_mut() {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}
