// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the client crate.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};

use nt_core::ClockSource;

/// A clock frozen at a fixed instant.
pub(crate) struct FixedClock(pub DateTime<Utc>);

impl ClockSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The instant used by tests that need a deterministic timestamp.
pub(crate) fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}
