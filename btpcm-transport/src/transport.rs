use std::os::unix::io::RawFd;
use std::time::Duration;

use btpcm_protocol::Direction;

use crate::control::ControlChannel;
use crate::event::EventDescriptor;
use crate::fifo::{Fifo, NullSink};

/// The external bus-dispatch collaborator (spec §6, §9 "delay estimator's
/// abstracted property-service dependency"): something that can run a
/// dispatch loop and be multiplexed into the caller's own poll set. The
/// real Bluetooth D-Bus connection is out of scope; this is the seam it
/// would plug into.
pub trait PropertyService {
    /// Run one dispatch pass, blocking up to `timeout` (or indefinitely
    /// if `None`). Returns whether anything was actually dispatched.
    fn dispatch(&self, timeout: Option<Duration>) -> bool;

    /// Descriptor suitable for the caller's own `poll`/`select` loop.
    fn poll_fd(&self) -> RawFd;
}

impl PropertyService for EventDescriptor {
    fn dispatch(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(Duration::from_secs(3600));
        match self.poll_readable(timeout) {
            Ok(true) => {
                let _ = self.read();
                true
            }
            _ => false,
        }
    }

    fn poll_fd(&self) -> RawFd {
        self.as_raw_fd()
    }
}

/// Everything a `Pcm` needs from the transport layer, constructed once
/// per `Pcm::open` (spec §6 "Transport" collaborator).
pub struct Transport {
    pub fifo: Fifo,
    pub control: ControlChannel,
    pub event: EventDescriptor,
    /// Only present for playback, where silence hwcompat wants somewhere
    /// to discard data instead of writing it to the FIFO.
    pub null_sink: Option<NullSink>,
}

impl Transport {
    pub fn new(fifo: Fifo, control: ControlChannel, event: EventDescriptor) -> Self {
        let null_sink = match fifo.direction() {
            Direction::Playback => NullSink::open().ok(),
            Direction::Capture => None,
        };

        Transport { fifo, control, event, null_sink }
    }
}
