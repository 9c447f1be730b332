// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Channel connection state.

use std::fmt;

/// State of the client's channel to the server.
///
/// Transitions are driven only by channel lifecycle events: the
/// connection manager owns the writes, everyone else reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel, and none being established.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Channel established, events flowing.
    Connected,
    /// Channel lost, retrying with backoff.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}
