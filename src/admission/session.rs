//! Per-session call history.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Opaque identifier for one interactive session.
///
/// Wraps a string so session identifiers cannot be confused with queries or
/// other free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session identifier from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Call history for one session.
///
/// Timestamps are kept in ascending order. Only the admission controller
/// mutates them.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    call_timestamps: VecDeque<OffsetDateTime>,
}

impl Session {
    /// Creates an empty session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            call_timestamps: VecDeque::new(),
        }
    }

    /// Returns the session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the recorded call instants, oldest first.
    pub fn call_timestamps(&self) -> &VecDeque<OffsetDateTime> {
        &self.call_timestamps
    }

    /// Returns true if no recorded call falls inside the window ending at `now`.
    ///
    /// An expired session carries no state that could affect a future
    /// admission decision. If `now - window` falls before the earliest
    /// representable instant, only an empty session is expired.
    pub fn is_expired(&self, now: OffsetDateTime, window: Duration) -> bool {
        match self.call_timestamps.back() {
            None => true,
            Some(&newest) => now.checked_sub(window).is_some_and(|cutoff| newest <= cutoff),
        }
    }

    /// Drops every timestamp at or before `cutoff`.
    pub(crate) fn purge_through(&mut self, cutoff: OffsetDateTime) {
        while self.call_timestamps.front().is_some_and(|&t| t <= cutoff) {
            self.call_timestamps.pop_front();
        }
    }

    /// Records a call, keeping timestamps sorted even if the clock stepped back.
    pub(crate) fn record(&mut self, at: OffsetDateTime) {
        let index = self.call_timestamps.partition_point(|&t| t <= at);
        self.call_timestamps.insert(index, at);
    }

    pub(crate) fn oldest(&self) -> Option<OffsetDateTime> {
        self.call_timestamps.front().copied()
    }
}
