//! Process-wide map from session identifier to session state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use tracing::debug;

use super::controller::{Admission, AdmissionController};
use super::session::{Session, SessionId};

/// Owns every live session and serializes admission checks per session.
///
/// Sessions are created on first use and evicted once none of their calls
/// remain inside the policy window. The map lock is only held to find or
/// insert an entry; the admission check itself runs under the session's own
/// lock, so different sessions never wait on each other.
#[derive(Debug)]
pub struct SessionRegistry {
    controller: AdmissionController,
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    /// Creates an empty registry that admits calls through `controller`.
    pub fn new(controller: AdmissionController) -> Self {
        Self {
            controller,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to admit one call for the session identified by `id`.
    ///
    /// Expired sessions are evicted first, then the session is looked up or
    /// created. The read-evict-append sequence runs while holding that
    /// session's lock, so overlapping attempts cannot both take the last slot.
    pub fn acquire(&self, id: &SessionId, now: OffsetDateTime) -> Admission {
        let session = {
            let mut sessions = lock(&self.sessions);
            self.evict_locked(&mut sessions, now);
            Arc::clone(
                sessions
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(Session::new(id.clone())))),
            )
        };

        let mut session = lock(&session);
        self.controller.try_acquire(&mut session, now)
    }

    /// Removes sessions whose calls have all left the window ending at `now`.
    ///
    /// Sessions currently held by an in-flight `acquire` are kept. Returns the
    /// number of sessions removed.
    pub fn evict_expired(&self, now: OffsetDateTime) -> usize {
        let mut sessions = lock(&self.sessions);
        self.evict_locked(&mut sessions, now)
    }

    /// Returns the number of tracked sessions.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Returns true if no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a session with this identifier is tracked.
    pub fn contains(&self, id: &SessionId) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    fn evict_locked(
        &self,
        sessions: &mut HashMap<SessionId, Arc<Mutex<Session>>>,
        now: OffsetDateTime,
    ) -> usize {
        let window = self.controller.policy().window();
        let before = sessions.len();

        // With the map locked, a strong count of 1 means no caller holds the entry.
        sessions.retain(|_, session| {
            if Arc::strong_count(session) > 1 {
                return true;
            }
            match session.try_lock() {
                Ok(guard) => !guard.is_expired(now, window),
                Err(_) => true,
            }
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted expired sessions");
        }
        evicted
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Session state is a sorted list of timestamps, which stays valid even if a
/// holder unwound mid-call.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
