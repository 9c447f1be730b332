// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! nt-client: connection and message-synchronization core for natter.
//!
//! This library owns the persistent channel to the chat server and a
//! locally consistent transcript of the conversation. It is consumed
//! by a presentation layer; there is no CLI surface and no persisted
//! state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌─────────────┐   frames   ┌───────────┐
//! │ EngineHandle │────────────►│ SyncEngine  │◄──────────►│ Transport │
//! │  (consumer)  │◄────────────│  (run loop) │            │ (trait)   │
//! └──────────────┘  broadcast  └─────────────┘            └───────────┘
//!                                     │ events
//!                              ┌──────────────┐
//!                              │ Connection   │  (backoff, cancel)
//!                              │ Manager      │
//!                              └──────────────┘
//! ```
//!
//! All transcript and state mutations happen on the engine's run loop
//! task, so no two mutations can interleave partially. The transport
//! has exactly one owner at a time: the connection manager's
//! background task while establishing, the engine once live.

pub mod connection;
pub mod engine;
pub mod transcript;
pub mod transport;

pub use connection::{
    ChannelConfig, ConnectionEvent, ConnectionManager, SharedChannelState, TransportFactory,
};
pub use engine::{EngineEvent, EngineHandle, EngineState, SendError, SyncEngine};
pub use transcript::{TranscriptError, TranscriptStore};
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};

pub use nt_core::{
    ClockSource, ConnectionState, DeliveryState, Message, MessageId, Origin, SystemClock,
};

#[cfg(test)]
mod test_helpers;
