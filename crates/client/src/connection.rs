// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Background connection management for the chat channel.
//!
//! This module provides infrastructure for establishing the WebSocket
//! connection in a background task, allowing the sync engine's run
//! loop to remain responsive while connecting or reconnecting.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use nt_core::ConnectionState;

use crate::transport::Transport;

const STATE_DISCONNECTED: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_CONNECTED: u8 = 2;
const STATE_RECONNECTING: u8 = 3;

fn state_to_u8(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Disconnected => STATE_DISCONNECTED,
        ConnectionState::Connecting => STATE_CONNECTING,
        ConnectionState::Connected => STATE_CONNECTED,
        ConnectionState::Reconnecting => STATE_RECONNECTING,
    }
}

fn state_from_u8(raw: u8) -> ConnectionState {
    match raw {
        STATE_CONNECTING => ConnectionState::Connecting,
        STATE_CONNECTED => ConnectionState::Connected,
        STATE_RECONNECTING => ConnectionState::Reconnecting,
        _ => ConnectionState::Disconnected,
    }
}

/// Connection state visible to both the background task and consumers.
///
/// Uses atomic fields for lock-free reads from consumer handles.
pub struct SharedChannelState {
    /// Current state (atomic for lock-free reads).
    state: AtomicU8,
    /// Connection attempt count (for status reporting).
    attempt: AtomicU32,
}

impl SharedChannelState {
    /// Create a new shared state initialized to disconnected.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_DISCONNECTED),
            attempt: AtomicU32::new(0),
        }
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    /// Set the state.
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }

    /// Get the current attempt count.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    /// Set the attempt count.
    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    /// Check if a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.get(),
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

impl Default for SharedChannelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events sent from the connection task to the engine's run loop.
pub enum ConnectionEvent<T> {
    /// Successfully connected. Contains the connected transport.
    ///
    /// Ownership of the channel transfers to the receiver; the
    /// connection task never touches it again.
    Connected(T),
    /// Gave up connecting (only with a bounded retry budget).
    Failed {
        /// Number of attempts made.
        attempts: u32,
        /// Error message from the last attempt.
        error: String,
    },
}

impl<T> std::fmt::Debug for ConnectionEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected(_) => f.debug_tuple("Connected").field(&"<transport>").finish(),
            Self::Failed { attempts, error } => f
                .debug_struct("Failed")
                .field("attempts", attempts)
                .field("error", error)
                .finish(),
        }
    }
}

/// Configuration for the chat channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// URL of the chat server.
    pub url: String,
    /// Maximum connection attempts per connect request (0 = unlimited).
    pub max_retries: u32,
    /// Initial delay for exponential backoff (milliseconds).
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts (seconds).
    pub max_delay_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000".to_string(),
            max_retries: 0,
            initial_delay_ms: 100,
            max_delay_secs: 30,
        }
    }
}

/// Factory producing a fresh transport per connection attempt.
pub type TransportFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Manages the background connection task.
///
/// The ConnectionManager owns exactly one logical channel at a time.
/// It spawns a background task that handles connection establishment
/// with exponential backoff and jitter; the engine receives the
/// connected transport through an event channel and stays responsive
/// to commands while attempts are in flight.
pub struct ConnectionManager<T: Transport + 'static> {
    /// Configuration for connections.
    config: ChannelConfig,
    /// Shared state for status reporting.
    shared: Arc<SharedChannelState>,
    /// Sender for connection events.
    event_tx: mpsc::Sender<ConnectionEvent<T>>,
    /// Cancellation token for teardown.
    cancel_token: CancellationToken,
    /// Produces a fresh transport for each attempt.
    factory: TransportFactory<T>,
}

impl<T: Transport + 'static> ConnectionManager<T> {
    /// Create a new connection manager.
    ///
    /// Returns the manager and a receiver for connection events.
    pub fn new(
        config: ChannelConfig,
        shared: Arc<SharedChannelState>,
        factory: TransportFactory<T>,
    ) -> (Self, mpsc::Receiver<ConnectionEvent<T>>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let cancel_token = CancellationToken::new();

        let manager = Self {
            config,
            shared,
            event_tx,
            cancel_token,
            factory,
        };

        (manager, event_rx)
    }

    /// Request a connection attempt.
    ///
    /// Idempotent: a no-op while already connected or while an attempt
    /// is in progress, and after `cancel()`. With `reconnecting` the
    /// attempt is reported as [`ConnectionState::Reconnecting`] rather
    /// than `Connecting`.
    pub fn spawn_connect_task(&self, reconnecting: bool) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        match self.shared.get() {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => return,
            ConnectionState::Disconnected => {}
        }

        // Publish the transitional state before spawning so a second
        // call observes it and backs off.
        let attempt_state = if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.shared.set(attempt_state);

        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let event_tx = self.event_tx.clone();
        let cancel_token = self.cancel_token.clone();
        let factory = Arc::clone(&self.factory);

        tokio::spawn(async move {
            connect_with_retry(config, shared, event_tx, cancel_token, factory, attempt_state)
                .await;
        });
    }

    /// Cancel any pending connection attempt and release the channel.
    ///
    /// A pending retry is abandoned immediately; no event is emitted
    /// after this returns control to the caller's task.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
        self.shared.set(ConnectionState::Disconnected);
    }
}

/// Background connection task with exponential backoff and jitter.
async fn connect_with_retry<T: Transport>(
    config: ChannelConfig,
    shared: Arc<SharedChannelState>,
    event_tx: mpsc::Sender<ConnectionEvent<T>>,
    cancel_token: CancellationToken,
    factory: TransportFactory<T>,
    attempt_state: ConnectionState,
) {
    let mut attempt = 0u32;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        // Check for cancellation before each attempt
        if cancel_token.is_cancelled() {
            shared.set(ConnectionState::Disconnected);
            return;
        }

        attempt = attempt.saturating_add(1);
        shared.set(attempt_state);
        shared.set_attempt(attempt);
        debug!(attempt, url = %config.url, "connecting");

        // Create a new transport for each attempt
        let mut transport = (factory)();

        // Try to connect with cancellation support
        let connect_result = tokio::select! {
            _ = cancel_token.cancelled() => {
                shared.set(ConnectionState::Disconnected);
                return;
            }
            result = transport.connect(&config.url) => result,
        };

        match connect_result {
            Ok(()) => {
                shared.set(ConnectionState::Connected);
                shared.set_attempt(0);
                info!(attempt, "channel established");

                // Hand the connected transport to the engine
                let _ = event_tx.send(ConnectionEvent::Connected(transport)).await;
                return;
            }
            Err(e) => {
                let error = e.to_string();
                debug!(attempt, %error, "connect attempt failed");

                // Check if we've exceeded max retries (0 = unlimited)
                if config.max_retries > 0 && attempt >= config.max_retries {
                    shared.set(ConnectionState::Disconnected);
                    let _ = event_tx
                        .send(ConnectionEvent::Failed {
                            attempts: attempt,
                            error,
                        })
                        .await;
                    return;
                }

                // Wait with backoff, checking for cancellation
                let delay = Duration::from_millis(delay_ms.saturating_add(jitter(delay_ms / 4)));
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        shared.set(ConnectionState::Disconnected);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                // Increase delay for next attempt (exponential backoff with cap)
                delay_ms = std::cmp::min(delay_ms.saturating_mul(2), config.max_delay_secs * 1000);
            }
        }
    }
}

/// Additive jitter: pseudo-random value in 0..max from subsecond nanos.
fn jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max
}
