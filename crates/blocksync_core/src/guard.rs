//! Reentrancy guard shared by the two change appliers.
//!
//! The guard is a suppression switch, not a blocking lock: there is no
//! true parallelism in the binding's scheduling model, only observer
//! callbacks that can fire as a side effect of guarded mutations. An
//! applier that finds the guard already held knows the notification it
//! is reacting to was produced by the other applier, and no-ops.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::types::ChangeOrigin;

const IDLE: u8 = 0;
const APPLYING_LOCAL: u8 = 1;
const APPLYING_REMOTE: u8 = 2;

/// Single-flight exclusion between the local and remote change appliers.
///
/// The guard models an explicit two-state machine: `Idle`, or
/// `Applying(origin)`. [`run`](ReentrancyGuard::run) enters `Applying`
/// only from `Idle`; an attempt to enter while already applying does not
/// run the callback at all. No thread ever blocks on this.
///
/// Every binding owns exactly one guard; it is never shared across
/// bindings, so multiple documents open at once cannot cross-suppress.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    state: AtomicU8,
    runs: AtomicU64,
}

impl ReentrancyGuard {
    /// Create a new guard in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the guard held for `origin`.
    ///
    /// Returns `Some` with `f`'s result if the guard was idle, `None` if
    /// it was already held (in which case `f` is not invoked). The guard
    /// returns to idle when `f` finishes, including by panic; panics
    /// propagate unchanged.
    pub fn run<T>(&self, origin: ChangeOrigin, f: impl FnOnce() -> T) -> Option<T> {
        let entered = match origin {
            ChangeOrigin::Local => APPLYING_LOCAL,
            ChangeOrigin::Remote => APPLYING_REMOTE,
        };
        if self
            .state
            .compare_exchange(IDLE, entered, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        self.runs.fetch_add(1, Ordering::SeqCst);

        // Restore Idle even if f unwinds.
        struct Reset<'a>(&'a AtomicU8);
        impl Drop for Reset<'_> {
            fn drop(&mut self) {
                self.0.store(IDLE, Ordering::SeqCst);
            }
        }
        let _reset = Reset(&self.state);

        Some(f())
    }

    /// The origin currently holding the guard, if any.
    pub fn current(&self) -> Option<ChangeOrigin> {
        match self.state.load(Ordering::SeqCst) {
            APPLYING_LOCAL => Some(ChangeOrigin::Local),
            APPLYING_REMOTE => Some(ChangeOrigin::Remote),
            _ => None,
        }
    }

    /// Whether no applier currently holds the guard.
    pub fn is_idle(&self) -> bool {
        self.state.load(Ordering::SeqCst) == IDLE
    }

    /// Number of guarded sections entered so far.
    ///
    /// Diagnostic counter: a single user action should account for
    /// exactly one guarded run.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_when_idle() {
        let guard = ReentrancyGuard::new();
        let result = guard.run(ChangeOrigin::Local, || 42);
        assert_eq!(result, Some(42));
        assert!(guard.is_idle());
        assert_eq!(guard.runs(), 1);
    }

    #[test]
    fn test_reentry_is_suppressed() {
        let guard = ReentrancyGuard::new();
        let result = guard.run(ChangeOrigin::Local, || {
            assert_eq!(guard.current(), Some(ChangeOrigin::Local));
            // A nested attempt from either origin must not run.
            assert_eq!(guard.run(ChangeOrigin::Remote, || -> () { unreachable!() }), None);
            assert_eq!(guard.run(ChangeOrigin::Local, || -> () { unreachable!() }), None);
            "done"
        });
        assert_eq!(result, Some("done"));
        assert_eq!(guard.runs(), 1);
    }

    #[test]
    fn test_idle_after_run() {
        let guard = ReentrancyGuard::new();
        guard.run(ChangeOrigin::Remote, || {});
        assert!(guard.is_idle());
        assert_eq!(guard.current(), None);

        // The guard is reusable after a completed run.
        assert_eq!(guard.run(ChangeOrigin::Local, || 1), Some(1));
        assert_eq!(guard.runs(), 2);
    }

    #[test]
    fn test_resets_on_panic() {
        let guard = ReentrancyGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.run(ChangeOrigin::Local, || panic!("boom"))
        }));
        assert!(result.is_err());
        assert!(guard.is_idle());
    }
}
