use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use btpcm_protocol::PauseState;

struct Inner {
    state: PauseState,
    resume_requested: bool,
    disconnected: bool,
}

/// The pause/resume handshake (spec §4.3). One waiter on the application
/// side, one signaller on the transfer side; both roles reverse during the
/// resume half of the handshake.
pub struct PauseCoordinator {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl PauseCoordinator {
    pub fn new() -> Self {
        PauseCoordinator {
            inner: Mutex::new(Inner {
                state: PauseState::Running,
                resume_requested: false,
                disconnected: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn state(&self) -> PauseState {
        self.inner.lock().unwrap().state
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().unwrap().state == PauseState::Pending
    }

    // --- Application thread ---

    /// `pause(true)` step 1: `state |= PENDING`.
    pub fn request_pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PauseState::Running {
            inner.state = PauseState::Pending;
        }
    }

    /// `pause(true)` step 2: wait until `PAUSED` is set or disconnected.
    pub fn wait_until_paused(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.state != PauseState::Paused && !inner.disconnected {
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// `pause(false)` steps 1-2: request resume and wake the transfer
    /// thread out of its park.
    pub fn request_resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.resume_requested = true;
        self.cond.notify_all();
    }

    // --- Transfer thread ---

    /// Transfer thread observes `PENDING`: acknowledge by transitioning to
    /// `PAUSED`, broadcast, then block on the resume wake. Returns once
    /// resumed (state is `RUNNING` again), disconnected, or `cancel` is
    /// observed (a plain `stop()`, not a real resume).
    pub fn ack_pending_and_park(&self, cancel: &AtomicBool) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = PauseState::Paused;
        self.cond.notify_all();

        while !inner.resume_requested && !inner.disconnected && !cancel.load(Ordering::Acquire) {
            let (guard, _) = self
                .cond
                .wait_timeout(inner, Duration::from_millis(100))
                .unwrap();
            inner = guard;
        }

        inner.resume_requested = false;
        if !inner.disconnected {
            inner.state = PauseState::Running;
        }
    }

    pub fn mark_disconnected(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.disconnected = true;
        self.cond.notify_all();
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.lock().unwrap().disconnected
    }
}

impl Default for PauseCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pause_then_resume_round_trip() {
        let coord = Arc::new(PauseCoordinator::new());
        coord.request_pause();
        assert_eq!(coord.state(), PauseState::Pending);

        let coord2 = coord.clone();
        let handle = thread::spawn(move || {
            coord2.ack_pending_and_park(&AtomicBool::new(false));
        });

        coord.wait_until_paused();
        assert_eq!(coord.state(), PauseState::Paused);

        coord.request_resume();
        handle.join().unwrap();
        assert_eq!(coord.state(), PauseState::Running);
    }

    #[test]
    fn disconnect_unparks_application_wait() {
        let coord = Arc::new(PauseCoordinator::new());
        coord.request_pause();

        let coord2 = coord.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            coord2.mark_disconnected();
        });

        coord.wait_until_paused();
        handle.join().unwrap();
        assert!(coord.is_disconnected());
    }
}
