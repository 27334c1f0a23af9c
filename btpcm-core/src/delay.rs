use std::sync::Mutex;
use std::time::Duration;

use btpcm_protocol::{Direction, PcmState, SampleRate, TimestampMicros};
use btpcm_util::time::now;

/// A snapshot of everything the delay formula needs, taken by the transfer
/// thread after every period transfer (spec §3, §4.1 step 6). Read by the
/// delay estimator under a mutex; the transfer thread never blocks on the
/// FIFO while holding it (invariant 3).
#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    timestamp: TimestampMicros,
    fifo_frames: i64,
    buffer_frames: i64,
}

/// What `delay()` reports back to the host framework, mirroring the state
/// mapping in spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    Frames(i64),
    Paused(i64),
    Overrun(i64),
    Suspended,
    Zero,
}

pub struct DelayEstimator {
    direction: Direction,
    rate: SampleRate,
    snapshot: Mutex<Snapshot>,
    paused_delay: Mutex<Option<i64>>,
    codec_delay_dms: Mutex<i64>,
    client_delay_dms: i64,
    extra_delay_frames: i64,
    last_dispatch: Mutex<TimestampMicros>,
}

impl DelayEstimator {
    pub fn new(direction: Direction, rate: SampleRate, client_delay_dms: i64, extra_delay_frames: i64) -> Self {
        DelayEstimator {
            direction,
            rate,
            snapshot: Mutex::new(Snapshot::default()),
            paused_delay: Mutex::new(None),
            codec_delay_dms: Mutex::new(0),
            client_delay_dms,
            extra_delay_frames,
            last_dispatch: Mutex::new(now()),
        }
    }

    /// Called by the transfer thread after every period transfer.
    pub fn update_snapshot(&self, fifo_frames: i64, buffer_frames: i64) {
        let mut snapshot = self.snapshot.lock().unwrap();
        snapshot.timestamp = now();
        snapshot.fifo_frames = fifo_frames;
        snapshot.buffer_frames = buffer_frames;
    }

    /// Applied from a property-change notification (spec §6).
    pub fn set_codec_delay_dms(&self, dms: i64) {
        *self.codec_delay_dms.lock().unwrap() = dms;
    }

    /// Same as `set_codec_delay_dms`, but taking the codec's algorithmic
    /// delay directly in samples (what `EscoFifoAdapter::codec_delay_samples`
    /// reports) and converting at this estimator's own rate.
    pub fn set_codec_delay_samples(&self, samples: u64) {
        let dms = (samples as i64) * 10_000 / i64::from(self.rate.0.max(1));
        self.set_codec_delay_dms(dms);
    }

    pub fn note_dispatch(&self) {
        *self.last_dispatch.lock().unwrap() = now();
    }

    /// Whether more than one second has passed since the control channel
    /// was last dispatched; `delay()` uses this to trigger a synchronous
    /// catch-up dispatch (spec §4.6, §6).
    pub fn dispatch_is_stale(&self) -> bool {
        let last = *self.last_dispatch.lock().unwrap();
        now().elapsed_since(last) > Duration::from_secs(1)
    }

    /// Capture `delay()`'s current value as the frozen "paused delay"
    /// (`pause(true)` step 4).
    pub fn capture_paused_delay(&self, state: PcmState) {
        let delay = self.compute_running_delay(state);
        *self.paused_delay.lock().unwrap() = Some(delay);
    }

    pub fn clear_paused_delay(&self) {
        *self.paused_delay.lock().unwrap() = None;
    }

    fn compute_running_delay(&self, state: PcmState) -> i64 {
        let snapshot = *self.snapshot.lock().unwrap();

        match self.direction {
            Direction::Capture => snapshot.buffer_frames.max(0),
            Direction::Playback => {
                let mut delay = snapshot.fifo_frames;

                if state == PcmState::Running {
                    delay += snapshot.buffer_frames;
                }

                let elapsed = now().elapsed_since(snapshot.timestamp);
                let tframes = (elapsed.as_millis() as i64) * i64::from(self.rate.0) / 1000;
                delay = (delay - tframes).max(0);

                if state != PcmState::Running {
                    delay += snapshot.buffer_frames;
                }

                let codec_delay_dms = *self.codec_delay_dms.lock().unwrap();
                delay += i64::from(self.rate.0) * codec_delay_dms / 10_000;
                delay += i64::from(self.rate.0) * self.client_delay_dms / 10_000;
                delay += self.extra_delay_frames;

                delay.max(0)
            }
        }
    }

    /// `delay()`, mapping PCM state to the return codes in spec §4.6.
    pub fn delay(&self, state: PcmState) -> DelayOutcome {
        match state {
            PcmState::Prepared | PcmState::Running => {
                DelayOutcome::Frames(self.compute_running_delay(state))
            }
            PcmState::Paused => {
                DelayOutcome::Paused(self.paused_delay.lock().unwrap().unwrap_or(0))
            }
            PcmState::Xrun => DelayOutcome::Overrun(self.compute_running_delay(state)),
            PcmState::Suspended => DelayOutcome::Suspended,
            _ => DelayOutcome::Zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_delay_is_buffer_fill() {
        let est = DelayEstimator::new(Direction::Capture, SampleRate(48_000), 0, 0);
        est.update_snapshot(0, 512);
        assert_eq!(est.delay(PcmState::Running), DelayOutcome::Frames(512));
    }

    #[test]
    fn paused_delay_is_frozen() {
        let est = DelayEstimator::new(Direction::Playback, SampleRate(48_000), 0, 0);
        est.update_snapshot(1000, 0);
        est.capture_paused_delay(PcmState::Running);

        // Changing the live snapshot afterwards must not move the frozen value.
        est.update_snapshot(0, 0);
        assert_eq!(est.delay(PcmState::Paused), DelayOutcome::Paused(1000));
    }

    #[test]
    fn suspended_state_reports_suspend_signal() {
        let est = DelayEstimator::new(Direction::Playback, SampleRate(48_000), 0, 0);
        assert_eq!(est.delay(PcmState::Suspended), DelayOutcome::Suspended);
    }

    #[test]
    fn setup_state_reports_zero() {
        let est = DelayEstimator::new(Direction::Playback, SampleRate(48_000), 0, 0);
        assert_eq!(est.delay(PcmState::Setup), DelayOutcome::Zero);
    }

    #[test]
    fn client_delay_offset_is_added_for_playback() {
        let est = DelayEstimator::new(Direction::Playback, SampleRate(48_000), 10, 0);
        est.update_snapshot(0, 0);
        // 10 deci-milliseconds == 1ms -> 48 frames at 48kHz.
        assert_eq!(est.delay(PcmState::Running), DelayOutcome::Frames(48));
    }
}
