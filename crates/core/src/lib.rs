// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! nt-core: Shared library for the natter chat client
//!
//! This crate provides the message model, the wire protocol, and the
//! clock primitives used by the nt-client sync engine.

pub mod clock;
pub mod error;
pub mod message;
pub mod protocol;
pub mod state;

pub use clock::{ClockSource, SystemClock};
pub use error::{Error, Result};
pub use message::{DeliveryState, Message, MessageId, Origin};
pub use protocol::{ClientEvent, ServerEvent, WireMessage};
pub use state::ConnectionState;
