use std::io;
use std::os::unix::io::RawFd;

/// High bits written to the event descriptor to mean "transport terminally
/// failed, treat as disconnect" (spec §3, §6).
pub const DISCONNECT_SENTINEL: u64 = 0xDEAD_0000;

const DISCONNECT_MASK: u64 = 0xFFFF_0000;

/// Ordinary wakeup value (new data, state change, pause handshake).
pub const READY_SIGNAL: u64 = 1;

/// The single counting semaphore used to wake the application thread
/// (spec §3 "Event descriptor", §6 "pseudo-events").
///
/// Backed by a Linux `eventfd`: writes add to a 64-bit counter, reads
/// return and reset it. This gives us the "counting" wakeup semantics the
/// spec asks for for free, at the cost of the disconnect sentinel only
/// being unambiguous if it lands on an otherwise-zero counter - which is
/// the case in practice, since the transfer thread stops sending ordinary
/// wakeups once it has decided to fail permanently.
pub struct EventDescriptor {
    fd: RawFd,
}

impl EventDescriptor {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(EventDescriptor { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn signal(&self, value: u64) -> io::Result<()> {
        let buf = value.to_ne_bytes();

        loop {
            let n = unsafe {
                libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len())
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            return Ok(());
        }
    }

    pub fn signal_ready(&self) -> io::Result<()> {
        self.signal(READY_SIGNAL)
    }

    pub fn signal_disconnect(&self) -> io::Result<()> {
        self.signal(DISCONNECT_SENTINEL)
    }

    /// Read and clear the counter. Called exactly once per wake (spec
    /// invariant: "every wake from the event descriptor is followed by at
    /// most one read of that descriptor before the next wake").
    pub fn read(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];

        loop {
            let n = unsafe {
                libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, 8)
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            return Ok(u64::from_ne_bytes(buf));
        }
    }

    pub fn is_disconnect(value: u64) -> bool {
        value & DISCONNECT_MASK == DISCONNECT_SENTINEL
    }

    /// Block until the descriptor has a value to read or `timeout`
    /// elapses; returns `false` on timeout. Used by the drain loop and by
    /// the host poll integration.
    pub fn poll_readable(&self, timeout: std::time::Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }

        Ok(rc > 0)
    }
}

impl Drop for EventDescriptor {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signal_then_read() {
        let ev = EventDescriptor::new().unwrap();
        ev.signal_ready().unwrap();
        let value = ev.read().unwrap();
        assert_eq!(value, READY_SIGNAL);
        assert!(!EventDescriptor::is_disconnect(value));
    }

    #[test]
    fn disconnect_sentinel_recognised() {
        let ev = EventDescriptor::new().unwrap();
        ev.signal_disconnect().unwrap();
        let value = ev.read().unwrap();
        assert!(EventDescriptor::is_disconnect(value));
    }

    #[test]
    fn counter_accumulates_across_missed_reads() {
        let ev = EventDescriptor::new().unwrap();
        ev.signal_ready().unwrap();
        ev.signal_ready().unwrap();
        ev.signal_ready().unwrap();
        assert_eq!(ev.read().unwrap(), 3);
    }

    #[test]
    fn poll_readable_times_out_without_a_signal() {
        let ev = EventDescriptor::new().unwrap();
        let ready = ev.poll_readable(std::time::Duration::from_millis(20)).unwrap();
        assert!(!ready);
    }

    #[test]
    fn poll_readable_true_after_signal() {
        let ev = EventDescriptor::new().unwrap();
        ev.signal_ready().unwrap();
        let ready = ev.poll_readable(std::time::Duration::from_millis(50)).unwrap();
        assert!(ready);
    }
}
