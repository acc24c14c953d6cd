//! Reentrant mutual exclusion keyed by thread.
//!
//! The owning thread may acquire the gate any number of times; every acquire
//! must be paired with a release from the same thread. Other threads block
//! until the hold count drops back to zero.

use crate::error::GateError;
use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ThreadId>,
    holds: usize,
}

/// A reentrant gate.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    /// Wakes one blocked `acquire`.
    released: Condvar,
    /// Wakes every `wait_until_free`.
    freed: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the gate, blocking while another thread holds it.
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.holds > 0 && state.owner != Some(me) {
            self.released.wait(&mut state);
        }
        state.owner = Some(me);
        state.holds += 1;
    }

    /// Releases one hold taken by the current thread.
    pub fn release(&self) -> Result<(), GateError> {
        let mut state = self.state.lock();
        if state.holds == 0 {
            return Err(GateError::NotHeld);
        }
        if state.owner != Some(thread::current().id()) {
            return Err(GateError::NotOwner);
        }

        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
            self.freed.notify_all();
        }
        Ok(())
    }

    /// Acquires the gate and returns a guard releasing it on drop.
    pub fn lock(&self) -> GateGuard<'_> {
        self.acquire();
        GateGuard {
            gate: self,
            _not_send: PhantomData,
        }
    }

    /// Blocks until nobody holds the gate, without acquiring it.
    ///
    /// Fails with [`GateError::Starved`] if the gate is still held when
    /// `timeout` elapses.
    pub fn wait_until_free(&self, timeout: Duration) -> Result<(), GateError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.holds > 0 {
            if self.freed.wait_until(&mut state, deadline).timed_out() && state.holds > 0 {
                return Err(GateError::Starved {
                    holds: state.holds,
                    waited: timeout,
                });
            }
        }
        Ok(())
    }

    /// Current hold count.
    pub fn holds(&self) -> usize {
        self.state.lock().holds
    }

    /// Returns whether the calling thread owns the gate.
    pub fn is_held_by_current_thread(&self) -> bool {
        let state = self.state.lock();
        state.holds > 0 && state.owner == Some(thread::current().id())
    }
}

/// Scoped hold on a [`Gate`].
///
/// Not `Send`: the release must happen on the acquiring thread.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a Gate,
    _not_send: PhantomData<*const ()>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.gate.release() {
            tracing::error!("gate guard release failed: {}", e);
        }
    }
}
