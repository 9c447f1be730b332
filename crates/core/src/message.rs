// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The chat message model.
//!
//! A [`Message`] is an immutable value except for its delivery state:
//! a locally originated message moves `pending -> sent` or
//! `pending -> failed` exactly once, and nothing else about it ever
//! changes. The `id` and `delivery` fields are local bookkeeping and
//! never appear on the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::WireMessage;

/// Unique identifier for a message within a transcript.
///
/// Minted locally (v4 uuid) for both outbound messages and decoded
/// inbound messages; the wire format carries no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Mints a fresh message id.
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Submitted by this client.
    Local,
    /// Delivered by the server.
    Remote,
}

/// Delivery progress of a locally originated message.
///
/// `Sent` and `Failed` are terminal; the transcript store refuses to
/// overwrite them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Appended optimistically, transport outcome not yet known.
    Pending,
    /// The transport accepted the frame.
    Sent,
    /// The send was refused or its outcome could not be confirmed.
    Failed,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within a transcript.
    pub id: MessageId,
    /// Message body. Never empty or whitespace-only.
    pub text: String,
    /// Creation time (send time for local, wire timestamp for remote).
    pub timestamp: DateTime<Utc>,
    /// Local or remote origin.
    pub origin: Origin,
    /// Delivery state; `None` for remote messages (not applicable).
    pub delivery: Option<DeliveryState>,
}

impl Message {
    /// Creates a locally originated message in the `Pending` state.
    ///
    /// The caller is responsible for trimming and rejecting empty
    /// text before construction; the sync engine does this.
    pub fn local(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Message {
            id: MessageId::new(),
            text: text.into(),
            timestamp,
            origin: Origin::Local,
            delivery: Some(DeliveryState::Pending),
        }
    }

    /// Creates a remote message from already-validated parts.
    ///
    /// Prefer [`WireMessage::decode`], which validates the payload.
    pub fn remote(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Message {
            id: MessageId::new(),
            text: text.into(),
            timestamp,
            origin: Origin::Remote,
            delivery: None,
        }
    }

    /// Produces the transport payload for this message.
    ///
    /// Lossy by design: `id`, `origin`, and `delivery` are local-only
    /// fields and are not transmitted.
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            text: self.text.clone(),
            timestamp: self.timestamp.to_rfc3339(),
        }
    }

    /// True if the message is still awaiting a delivery outcome.
    pub fn is_pending(&self) -> bool {
        self.delivery == Some(DeliveryState::Pending)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
