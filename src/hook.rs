//! Hook registry for circuit breaker events.

use crate::error::Rejection;
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;
type RejectionHookFn = Arc<dyn Fn(Rejection) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
///
/// Hooks run inline on the thread that triggered them: break and recover
/// hooks on the refresh thread, the rest on the calling thread. Keep them
/// short.
pub struct HookRegistry {
    on_break: RwLock<Option<RejectionHookFn>>,
    on_recover: RwLock<Option<HookFn>>,
    on_reject: RwLock<Option<RejectionHookFn>>,
    on_success: RwLock<Option<HookFn>>,
    on_failure: RwLock<Option<HookFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_break: RwLock::new(None),
            on_recover: RwLock::new(None),
            on_reject: RwLock::new(None),
            on_success: RwLock::new(None),
            on_failure: RwLock::new(None),
        }
    }

    /// Sets the hook to call when a refresh finds a breached limit.
    pub fn set_on_break<F>(&self, f: F)
    where
        F: Fn(Rejection) + Send + Sync + 'static,
    {
        *self.on_break.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a refresh passes after a break.
    pub fn set_on_recover<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_recover.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the gate refuses an action.
    pub fn set_on_reject<F>(&self, f: F)
    where
        F: Fn(Rejection) + Send + Sync + 'static,
    {
        *self.on_reject.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when an action succeeds.
    pub fn set_on_success<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_success.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when an action fails.
    pub fn set_on_failure<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_failure.write() = Some(Arc::new(f));
    }

    pub(crate) fn execute_break_hook(&self, rejection: Rejection) {
        if let Some(hook) = self.on_break.read().as_ref() {
            hook(rejection);
        }
    }

    pub(crate) fn execute_recover_hook(&self) {
        if let Some(hook) = self.on_recover.read().as_ref() {
            hook();
        }
    }

    pub(crate) fn execute_reject_hook(&self, rejection: Rejection) {
        if let Some(hook) = self.on_reject.read().as_ref() {
            hook(rejection);
        }
    }

    pub(crate) fn execute_success_hook(&self) {
        if let Some(hook) = self.on_success.read().as_ref() {
            hook();
        }
    }

    pub(crate) fn execute_failure_hook(&self) {
        if let Some(hook) = self.on_failure.read().as_ref() {
            hook();
        }
    }
}
