//! Cooperative pause/resume for a [`crate::Machine`] driven from a second
//! thread. Plain `std::sync` rather than an async runtime: the CPU crates this
//! sits on top of are synchronous top to bottom, and pulling in an executor
//! for one condition variable would be the odd one out in this stack.

use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    PauseRequested,
    Paused,
}

/// Shared handle a debugger/UI thread holds to pause and resume the thread
/// actually calling [`crate::Machine::run`]. Cloning is cheap (an `Arc`
/// underneath) and every clone controls the same machine.
#[derive(Clone)]
pub struct PauseHandle {
    inner: Arc<(Mutex<RunState>, Condvar)>,
}

impl Default for PauseHandle {
    fn default() -> Self {
        PauseHandle {
            inner: Arc::new((Mutex::new(RunState::Running), Condvar::new())),
        }
    }
}

impl PauseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a pause. Does not block: the run loop notices at its next
    /// `poll` call (after the in-flight instruction finishes) and parks
    /// itself there.
    pub fn request_pause(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap() = RunState::PauseRequested;
    }

    /// Wakes a parked run loop. A no-op if the machine was never paused.
    pub fn resume(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        *state = RunState::Running;
        cvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        matches!(*self.inner.0.lock().unwrap(), RunState::Paused)
    }

    /// Called by the run loop between instructions. Parks the calling
    /// thread on the condvar if a pause was requested, and returns only
    /// once `resume` has been called.
    pub fn poll(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        if *state != RunState::PauseRequested {
            return;
        }
        *state = RunState::Paused;
        while *state == RunState::Paused {
            state = cvar.wait(state).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn poll_is_a_no_op_until_a_pause_is_requested() {
        let handle = PauseHandle::new();
        handle.poll();
        assert!(!handle.is_paused());
    }

    #[test]
    fn request_pause_parks_poll_until_resumed() {
        let handle = PauseHandle::new();
        handle.request_pause();
        let parked = handle.clone();
        let t = thread::spawn(move || {
            parked.poll();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(handle.is_paused());
        handle.resume();
        t.join().unwrap();
        assert!(!handle.is_paused());
    }
}
