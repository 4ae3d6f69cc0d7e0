//! Process-wide session
//!
//! The host boundary has no object to carry state in, so exactly one
//! controller is installed per process. Installation is one-shot: a second
//! [`install`] is refused and the first controller stays in place.

use once_cell::sync::OnceCell;
use tracing::info;

use super::{LifecycleController, SessionError};

static SESSION: OnceCell<LifecycleController> = OnceCell::new();

/// Install the process-wide controller.
pub fn install(controller: LifecycleController) -> Result<&'static LifecycleController, SessionError> {
    match SESSION.try_insert(controller) {
        Ok(installed) => {
            info!(engine = installed.engine.name(), "session controller installed");
            Ok(installed)
        }
        Err((_existing, _rejected)) => Err(SessionError::AlreadyInstalled),
    }
}

/// The installed controller, if any.
#[inline]
pub fn global() -> Option<&'static LifecycleController> {
    SESSION.get()
}

/// The installed controller, or [`SessionError::NotInstalled`].
pub fn require() -> Result<&'static LifecycleController, SessionError> {
    global().ok_or(SessionError::NotInstalled)
}
