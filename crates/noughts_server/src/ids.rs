//! Process-wide identifiers for sessions and connections.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a game session.
///
/// Allocated from a monotonically increasing counter and never reused, so
/// a client holding the id of a torn-down session can never reach a newer
/// one by accident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Unique identifier for a live connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
pub struct ConnId(u64);

impl ConnId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Monotonic allocator; the first id handed out is 1.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator that starts at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next unused value.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocates a session id.
    pub fn next_session(&self) -> SessionId {
        SessionId(self.next())
    }

    /// Allocates a connection id.
    pub fn next_conn(&self) -> ConnId {
        ConnId(self.next())
    }
}
