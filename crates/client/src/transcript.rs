// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered, append-only local log of chat messages.
//!
//! The store is owned exclusively by the sync engine; consumers only
//! ever see point-in-time snapshots, never a live view, so they
//! cannot observe a half-applied mutation. Insertion order is append
//! order, which is network delivery order for remote messages and
//! submission order for local ones.

use std::collections::HashSet;

use nt_core::{DeliveryState, Message, MessageId};

/// Error type for transcript mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// A message with this id is already in the transcript.
    ///
    /// Integrity guard against duplicate delivery or duplicate local
    /// echo; the transcript is left unchanged.
    #[error("duplicate message id: {0}")]
    DuplicateId(MessageId),

    /// No pending message with this id exists.
    ///
    /// Also returned when the message exists but its delivery state is
    /// terminal: `sent` and `failed` cannot be overwritten.
    #[error("no pending message with id: {0}")]
    NotFound(MessageId),
}

/// The ordered local transcript.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    entries: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl TranscriptStore {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the transcript.
    ///
    /// Fails with [`TranscriptError::DuplicateId`] if a message with
    /// the same id already exists; the transcript is not modified.
    pub fn append(&mut self, message: Message) -> Result<(), TranscriptError> {
        if !self.ids.insert(message.id) {
            return Err(TranscriptError::DuplicateId(message.id));
        }
        self.entries.push(message);
        Ok(())
    }

    /// Resolve the delivery state of a pending local message.
    ///
    /// Only a `Pending` message may transition, and only its delivery
    /// state is touched. Fails with [`TranscriptError::NotFound`] if
    /// no pending message with that id exists.
    pub fn update_delivery(
        &mut self,
        id: MessageId,
        state: DeliveryState,
    ) -> Result<(), TranscriptError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|m| m.id == id && m.is_pending())
            .ok_or(TranscriptError::NotFound(id))?;
        entry.delivery = Some(state);
        Ok(())
    }

    /// Ids of local messages still awaiting a delivery outcome.
    pub fn pending_ids(&self) -> Vec<MessageId> {
        self.entries
            .iter()
            .filter(|m| m.is_pending())
            .map(|m| m.id)
            .collect()
    }

    /// An immutable ordered copy of the transcript at this instant.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }

    /// Number of messages in the transcript.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the transcript has no messages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
