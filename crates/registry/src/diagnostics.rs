//! Diagnostics sink shared with plugin modules.
//!
//! A dynamically loaded module links its own copy of `tracing`, including
//! its own global dispatcher. The host hands its dispatcher to the module's
//! registration entry point so that events logged inside the module reach
//! the host's subscriber.

use tracing::Dispatch;

#[derive(Debug, Clone)]
pub struct Diagnostics {
    dispatch: Dispatch,
}

impl Diagnostics {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Captures the dispatcher active on the calling thread.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(|dispatch| dispatch.clone()))
    }

    /// Makes this sink the global default of the calling module.
    ///
    /// Returns `false` if the module already had a global default.
    pub fn install_global(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }

    /// Runs `f` with this sink as the thread-local default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::current()
    }
}
