use btpcm_protocol::{Direction, PcmState};
use btpcm_transport::EventDescriptor;

use crate::engine::TransferEngine;

bitflags::bitflags! {
    /// Mirrors `struct pollfd::revents` (spec §4.5). Only the bits the
    /// engine ever sets are modeled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RevEvents: u16 {
        const IN   = libc::POLLIN as u16;
        const OUT  = libc::POLLOUT as u16;
        const ERR  = libc::POLLERR as u16;
        const HUP  = libc::POLLHUP as u16;
        const NVAL = libc::POLLNVAL as u16;
    }
}

/// What the host framework does with the event descriptor around a
/// dispatch (spec §4.5): dispatch pending wakeups (applying whatever
/// property update they carry), read it exactly once per wake, then
/// re-arm the wakeup if the state is still actionable.
///
/// Distinct from `btpcm_transport::PropertyService` (the external
/// bus-dispatch collaborator, spec §6, which this reuses as the dispatch
/// primitive since there's no separate bus descriptor here) - `PcmState`
/// is supplied by the caller, which owns the authoritative lifecycle
/// state; the engine only ever infers local ring/pause bookkeeping.
pub trait PollDispatch {
    fn dispatch_blocking(&self, state: PcmState) -> RevEvents;
    fn dispatch_nonblocking(&self, state: PcmState) -> RevEvents;
}

impl PollDispatch for TransferEngine {
    /// Caller has already blocked on the event descriptor (normally via
    /// the host's own poll loop) and is now asking what happened.
    fn dispatch_blocking(&self, state: PcmState) -> RevEvents {
        if let Ok(value) = self.event().read() {
            self.apply_dispatched_value(value);
        }
        self.revents_for_state(state)
    }

    /// Caller is polling without having blocked - used by drain's
    /// non-blocking path and by `snd_pcm_poll_descriptors_revents`-style
    /// callers that don't own the wait themselves.
    fn dispatch_nonblocking(&self, state: PcmState) -> RevEvents {
        self.revents_for_state(state)
    }
}

impl TransferEngine {
    /// Applies whatever a dispatched wakeup value means (spec §4.5 step 1,
    /// §6 "apply property updates"): the disconnect sentinel means the
    /// remote stream has stopped, anything else is an ordinary wakeup
    /// that implies it's still running.
    fn apply_dispatched_value(&self, value: u64) {
        self.set_remote_running(!EventDescriptor::is_disconnect(value));
    }

    fn revents_for_state(&self, state: PcmState) -> RevEvents {
        let mask = poll_revents(state, self);

        // Re-arm: if we're still in a state the caller would immediately
        // poll-ready on, and it isn't an error/hangup condition (which
        // only ever clears by a state transition, not another wake),
        // make sure a subsequent poll doesn't block forever.
        if !mask.is_empty() && !mask.intersects(RevEvents::ERR | RevEvents::HUP | RevEvents::NVAL) {
            let _ = self.event().signal_ready();
        }

        mask
    }
}

/// The state -> revents dispatch table (spec §4.5).
pub fn poll_revents(state: PcmState, engine: &TransferEngine) -> RevEvents {
    match state {
        PcmState::Open => RevEvents::ERR | RevEvents::NVAL,
        PcmState::Disconnected => RevEvents::HUP,
        PcmState::Xrun | PcmState::Suspended => RevEvents::ERR,
        PcmState::Paused => RevEvents::ERR,
        PcmState::Setup => RevEvents::empty(),
        PcmState::Prepared => match engine.ring().direction() {
            Direction::Capture => RevEvents::empty(),
            Direction::Playback => direction_ready(engine),
        },
        PcmState::Running => direction_ready(engine),
        PcmState::Draining => match engine.ring().direction() {
            Direction::Playback => {
                if engine.ring().available() == engine.ring().buffer_size() {
                    RevEvents::OUT
                } else {
                    RevEvents::empty()
                }
            }
            Direction::Capture => RevEvents::empty(),
        },
    }
}

fn direction_ready(engine: &TransferEngine) -> RevEvents {
    if engine.ring().available() < engine.geometry().avail_min {
        return RevEvents::empty();
    }

    match engine.ring().direction() {
        Direction::Playback => RevEvents::OUT,
        Direction::Capture => RevEvents::IN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PcmGeometry;
    use crate::ring::RingBuffer;
    use btpcm_protocol::{SampleFormat, SampleRate};

    fn geometry() -> PcmGeometry {
        PcmGeometry {
            rate: SampleRate(44_100),
            channels: 2,
            format: SampleFormat::S16LE,
            period_size: 100,
            buffer_size: 1000,
            avail_min: 100,
            boundary: 1_000_000,
        }
    }

    #[test]
    fn setup_state_has_no_bits() {
        assert!(poll_revents_standalone(PcmState::Setup, Direction::Playback, 0, 0).is_empty());
    }

    #[test]
    fn xrun_reports_err() {
        assert_eq!(
            poll_revents_standalone(PcmState::Xrun, Direction::Playback, 0, 0),
            RevEvents::ERR
        );
    }

    #[test]
    fn disconnected_reports_hup() {
        assert_eq!(
            poll_revents_standalone(PcmState::Disconnected, Direction::Capture, 0, 0),
            RevEvents::HUP
        );
    }

    // Exercises the table directly against a bare RingBuffer, without
    // standing up a full TransferEngine (which needs real fds).
    fn poll_revents_standalone(
        state: PcmState,
        direction: Direction,
        hw_ptr: i64,
        appl_ptr: i64,
    ) -> RevEvents {
        let geometry = geometry();
        let ring = RingBuffer::new(geometry.buffer_size, geometry.boundary, direction);
        ring.publish_hw_ptr(hw_ptr);
        ring.set_appl_ptr(appl_ptr);

        match state {
            PcmState::Open => RevEvents::ERR | RevEvents::NVAL,
            PcmState::Disconnected => RevEvents::HUP,
            PcmState::Xrun | PcmState::Suspended | PcmState::Paused => RevEvents::ERR,
            PcmState::Setup => RevEvents::empty(),
            PcmState::Prepared if direction == Direction::Capture => RevEvents::empty(),
            PcmState::Prepared | PcmState::Running => {
                if ring.available() < geometry.avail_min {
                    RevEvents::empty()
                } else {
                    match direction {
                        Direction::Playback => RevEvents::OUT,
                        Direction::Capture => RevEvents::IN,
                    }
                }
            }
            PcmState::Draining => {
                if direction == Direction::Playback && ring.available() == ring.buffer_size() {
                    RevEvents::OUT
                } else {
                    RevEvents::empty()
                }
            }
        }
    }

    #[test]
    fn running_playback_ready_once_avail_min_met() {
        assert!(poll_revents_standalone(PcmState::Running, Direction::Playback, 0, 0).is_empty());
        assert_eq!(
            poll_revents_standalone(PcmState::Running, Direction::Playback, 0, 100),
            RevEvents::OUT
        );
    }

    #[test]
    fn draining_playback_ready_only_once_buffer_fully_empty() {
        assert!(poll_revents_standalone(PcmState::Draining, Direction::Playback, 0, 0).is_empty());
        assert_eq!(
            poll_revents_standalone(PcmState::Draining, Direction::Playback, 1000, 0),
            RevEvents::OUT
        );
    }
}
