// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol events for client-server communication.
//!
//! The protocol is a single event kind in each direction:
//! - Client emits `message` events with `{ text, timestamp }`
//! - Server pushes `message` events with the same schema
//!
//! Timestamps travel as RFC 3339 strings. Any server-side enrichment
//! (sender identity and the like) happens before the payload reaches
//! this client and is not represented here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::Message;

/// The `message` event payload as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireMessage {
    /// Message body.
    pub text: String,
    /// RFC 3339 timestamp string.
    pub timestamp: String,
}

impl WireMessage {
    /// Decodes the payload into a remote-origin [`Message`].
    ///
    /// Fails with [`Error::MalformedMessage`] when the text is empty
    /// after trimming or the timestamp does not parse as RFC 3339.
    pub fn decode(&self) -> Result<Message> {
        if self.text.trim().is_empty() {
            return Err(Error::malformed("empty text"));
        }

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| Error::malformed(format!("bad timestamp '{}': {}", self.timestamp, e)))?
            .with_timezone(&Utc);

        Ok(Message::remote(self.text.clone(), timestamp))
    }
}

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A chat message submitted by this client.
    Message(WireMessage),
}

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat message delivered to this client.
    Message(WireMessage),
}

impl ClientEvent {
    /// Creates a message event from a local [`Message`].
    pub fn message(message: &Message) -> Self {
        ClientEvent::Message(message.to_wire())
    }

    /// Serializes the event to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the event from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerEvent {
    /// Creates a message event from a raw payload.
    pub fn message(wire: WireMessage) -> Self {
        ServerEvent::Message(wire)
    }

    /// Serializes the event to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the event from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
