//! One-shot readiness latch.
//!
//! The gate starts closed. Readers wait on it (bounded by a timeout) until the
//! first successful load opens it; once open it stays open and waiting returns
//! immediately.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Single-use latch guarding reads until the first successful load.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    released: Mutex<bool>,
    cond: Condvar,
}

impl ReadinessGate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the gate and wakes every waiter.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn release(&self) -> bool {
        let mut released = self.lock();
        if *released {
            return false;
        }
        *released = true;
        self.cond.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        *self.lock()
    }

    /// Blocks until the gate is released or `timeout` elapses.
    ///
    /// Returns whether the gate was released in time. A timeout too large to
    /// form a deadline waits without one.
    pub fn wait_for_ready(&self, timeout: Duration) -> bool {
        let mut released = self.lock();
        if *released {
            return true;
        }

        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*released {
                released = match self.cond.wait(released) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            return true;
        };

        while !*released {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            released = match self.cond.wait_timeout(released, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        match self.released.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
