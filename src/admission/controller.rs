//! Sliding-window admission decisions.

use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::policy::RateLimitPolicy;
use super::session::Session;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; it has been counted against the session.
    Admitted,
    /// The session is at its limit. The oldest call leaves the window after `retry_after`.
    Denied { retry_after: Duration },
}

impl Admission {
    /// Returns true if the attempt was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Gates query attempts so no session exceeds its policy.
///
/// The controller holds no per-session state itself. Callers pass the
/// `Session` in, and concurrent callers must serialize access to it
/// (see `SessionRegistry`).
#[derive(Debug, Clone, Copy)]
pub struct AdmissionController {
    policy: RateLimitPolicy,
}

impl AdmissionController {
    /// Creates a controller enforcing `policy`.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { policy }
    }

    /// Returns the enforced policy.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Attempts to admit one call for `session` at instant `now`.
    ///
    /// Evicts every timestamp that is no longer inside the trailing window,
    /// then admits and records `now` if there is room. Calls exactly one
    /// window old no longer count. The result depends only on the session's
    /// timestamps and `now`.
    pub fn try_acquire(&self, session: &mut Session, now: OffsetDateTime) -> Admission {
        let window = self.policy.window();
        // Before the earliest representable cutoff nothing is old enough to evict.
        if let Some(cutoff) = now.checked_sub(window) {
            session.purge_through(cutoff);
        }

        let in_window = session.call_timestamps().len();
        if in_window < self.policy.max_calls_per_window() as usize {
            session.record(now);
            debug!(
                session = %session.id(),
                calls_in_window = in_window + 1,
                "Admitted query attempt"
            );
            return Admission::Admitted;
        }

        // At the limit the deque is non-empty, so oldest() is always Some here.
        let oldest = session.oldest().unwrap_or(now);
        let retry_after = (window - (now - oldest)).clamp(Duration::ZERO, window);
        debug!(
            session = %session.id(),
            calls_in_window = in_window,
            retry_after_secs = retry_after.as_seconds_f64(),
            "Denied query attempt"
        );

        Admission::Denied { retry_after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{MAX_WINDOW, SessionId};
    use time::PrimitiveDateTime;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

    fn at(secs: i64) -> OffsetDateTime {
        T0 + Duration::seconds(secs)
    }

    fn controller(max: u32, window_secs: i64) -> AdmissionController {
        AdmissionController::new(
            RateLimitPolicy::new(max, Duration::seconds(window_secs)).unwrap(),
        )
    }

    fn session() -> Session {
        Session::new(SessionId::from("test-session"))
    }

    #[test]
    fn three_per_minute_scenario() {
        let controller = controller(3, 60);
        let mut session = session();

        assert_eq!(controller.try_acquire(&mut session, at(0)), Admission::Admitted);
        assert_eq!(controller.try_acquire(&mut session, at(1)), Admission::Admitted);
        assert_eq!(controller.try_acquire(&mut session, at(2)), Admission::Admitted);
        assert_eq!(
            controller.try_acquire(&mut session, at(3)),
            Admission::Denied {
                retry_after: Duration::seconds(57)
            }
        );
        assert_eq!(controller.try_acquire(&mut session, at(61)), Admission::Admitted);
    }

    #[test]
    fn admits_exactly_max_calls_then_denies() {
        let controller = controller(5, 60);
        let mut session = session();

        let admitted = (0..5)
            .filter(|&i| controller.try_acquire(&mut session, at(i)).is_admitted())
            .count();
        assert_eq!(admitted, 5);
        assert!(!controller.try_acquire(&mut session, at(5)).is_admitted());
    }

    #[test]
    fn denied_attempts_are_not_recorded() {
        let controller = controller(1, 60);
        let mut session = session();

        assert!(controller.try_acquire(&mut session, at(0)).is_admitted());
        for i in 1..10 {
            assert!(!controller.try_acquire(&mut session, at(i)).is_admitted());
        }
        assert_eq!(session.call_timestamps().len(), 1);
        assert!(controller.try_acquire(&mut session, at(60)).is_admitted());
    }

    #[test]
    fn admitted_count_never_exceeds_limit_in_any_window() {
        let controller = controller(4, 10);
        let mut session = session();
        let mut admitted_at = Vec::new();

        // One attempt every half second for two minutes.
        for step in 0..240 {
            let now = T0 + Duration::milliseconds(step * 500);
            if controller.try_acquire(&mut session, now).is_admitted() {
                admitted_at.push(now);
            }
        }

        for &start in &admitted_at {
            let in_window = admitted_at
                .iter()
                .filter(|&&t| t >= start && t < start + Duration::seconds(10))
                .count();
            assert!(in_window <= 4, "{in_window} admissions in one window");
        }
        assert!(admitted_at.len() > 4);
    }

    #[test]
    fn idle_for_a_full_window_readmits_denied_session() {
        let controller = controller(2, 30);
        let mut session = session();

        controller.try_acquire(&mut session, at(0));
        controller.try_acquire(&mut session, at(10));
        assert!(!controller.try_acquire(&mut session, at(11)).is_admitted());

        assert!(controller.try_acquire(&mut session, at(41)).is_admitted());
    }

    #[test]
    fn sliding_window_blocks_burst_at_boundary() {
        // A fixed window would reset at t=60 and admit a second burst.
        let controller = controller(3, 60);
        let mut session = session();

        for t in [57, 58, 59] {
            assert!(controller.try_acquire(&mut session, at(t)).is_admitted());
        }
        assert_eq!(
            controller.try_acquire(&mut session, at(61)),
            Admission::Denied {
                retry_after: Duration::seconds(56)
            }
        );
    }

    #[test]
    fn decision_is_deterministic_for_same_state() {
        let controller = controller(2, 60);
        let mut a = session();
        let mut b = session();

        for t in [0, 5, 6, 70, 71, 72] {
            assert_eq!(
                controller.try_acquire(&mut a, at(t)),
                controller.try_acquire(&mut b, at(t))
            );
        }
        assert_eq!(a.call_timestamps(), b.call_timestamps());
    }

    #[test]
    fn retry_after_never_exceeds_window_when_clock_steps_back() {
        let controller = controller(1, 60);
        let mut session = session();

        controller.try_acquire(&mut session, at(30));
        match controller.try_acquire(&mut session, at(20)) {
            Admission::Denied { retry_after } => assert_eq!(retry_after, Duration::seconds(60)),
            Admission::Admitted => panic!("expected denial"),
        }
    }

    #[test]
    fn cutoff_before_earliest_instant_evicts_nothing() {
        let controller = AdmissionController::new(RateLimitPolicy::new(2, MAX_WINDOW).unwrap());
        let earliest = PrimitiveDateTime::MIN.assume_utc();
        let mut session = session();

        assert!(controller.try_acquire(&mut session, earliest).is_admitted());
        assert!(controller.try_acquire(&mut session, earliest + Duration::DAY).is_admitted());
        assert_eq!(
            controller.try_acquire(&mut session, earliest + Duration::days(2)),
            Admission::Denied {
                retry_after: MAX_WINDOW - Duration::days(2)
            }
        );
    }
}
