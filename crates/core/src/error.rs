// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors produced by the nt-core message and protocol layer.
#[derive(Debug, Error)]
pub enum Error {
    /// An inbound payload that cannot become a valid message.
    ///
    /// Covers missing/empty text and unparseable timestamps. Malformed
    /// payloads are discarded by the engine, never fatal.
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },
}

impl Error {
    /// Creates a MalformedMessage error with the given reason.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedMessage {
            reason: reason.into(),
        }
    }
}

/// Result type for nt-core operations.
pub type Result<T> = std::result::Result<T, Error>;
