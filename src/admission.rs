/// Session-scoped admission control.
///
/// This module decides whether a session may issue another model call before
/// any network traffic happens. The decision uses a sliding window over the
/// session's recent call timestamps.
mod controller;
mod policy;
mod registry;
mod session;

pub use controller::{Admission, AdmissionController};
pub use policy::{MAX_WINDOW, PolicyError, RateLimitPolicy};
pub use registry::SessionRegistry;
pub use session::{Session, SessionId};
