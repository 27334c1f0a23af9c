use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Wakes the transfer thread when the ring buffer goes from idle
/// (`hw_ptr == -1`) back to having frames to move, without running that
/// wakeup through the real pause/resume handshake in [`crate::pause`] -
/// going idle because nothing has been written yet is not the same thing
/// as the application asking to pause, and conflating the two would make
/// `pause_state()` lie to callers. This is the generic "something changed,
/// come back and look" signal the per-iteration algorithm parks on in
/// step 1 when `hw_ptr == -1` and no pause is pending.
pub struct IdleGate {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl IdleGate {
    pub fn new() -> Self {
        IdleGate {
            woken: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Wake the transfer thread if it's parked here.
    pub fn wake(&self) {
        *self.woken.lock().unwrap() = true;
        self.cond.notify_all();
    }

    /// Block until woken or `cancel` is observed. Polls `cancel`
    /// periodically so a `stop()` racing a park is never missed.
    pub fn park_until_woken(&self, cancel: &AtomicBool) {
        let mut woken = self.woken.lock().unwrap();

        while !*woken && !cancel.load(Ordering::Acquire) {
            let (guard, _) = self
                .cond
                .wait_timeout(woken, Duration::from_millis(100))
                .unwrap();
            woken = guard;
        }

        *woken = false;
    }
}

impl Default for IdleGate {
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
    fn wake_unparks_waiter() {
        let gate = Arc::new(IdleGate::new());
        let cancel = Arc::new(AtomicBool::new(false));

        let gate2 = gate.clone();
        let cancel2 = cancel.clone();
        let handle = thread::spawn(move || {
            gate2.park_until_woken(&cancel2);
        });

        thread::sleep(Duration::from_millis(20));
        gate.wake();
        handle.join().unwrap();
    }

    #[test]
    fn cancel_unparks_waiter_without_explicit_wake() {
        let gate = Arc::new(IdleGate::new());
        let cancel = Arc::new(AtomicBool::new(false));

        let gate2 = gate.clone();
        let cancel2 = cancel.clone();
        let handle = thread::spawn(move || {
            gate2.park_until_woken(&cancel2);
        });

        thread::sleep(Duration::from_millis(20));
        cancel.store(true, Ordering::Release);
        handle.join().unwrap();
    }
}
