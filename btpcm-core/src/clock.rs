use std::thread;
use std::time::Duration;

use btpcm_protocol::SampleRate;
use btpcm_util::time::now;

/// Paces playback at the nominal sample rate by sleeping to an absolute
/// deadline on a monotonic clock, anchored once at the start of the
/// transfer session and re-anchored on every pause resume (spec §4.2).
pub struct RateClock {
    rate: SampleRate,
    anchor_micros: u64,
    frames_produced: u64,
}

impl RateClock {
    pub fn new(rate: SampleRate) -> Self {
        RateClock {
            rate,
            anchor_micros: now().0,
            frames_produced: 0,
        }
    }

    pub fn reanchor(&mut self) {
        self.anchor_micros = now().0;
        self.frames_produced = 0;
    }

    /// Sleep until `frames` more frames (cumulative since the last anchor)
    /// should have elapsed at the nominal rate.
    pub fn pace(&mut self, frames: u64) {
        self.frames_produced += frames;

        let due_micros =
            self.anchor_micros + (self.frames_produced * 1_000_000) / u64::from(self.rate.0);
        let now_micros = now().0;

        if due_micros > now_micros {
            thread::sleep(Duration::from_micros(due_micros - now_micros));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn pace_sleeps_roughly_the_right_duration() {
        let mut clock = RateClock::new(SampleRate(48_000));
        let start = Instant::now();
        clock.pace(4_800); // 100ms worth of frames
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn reanchor_resets_frame_count() {
        let mut clock = RateClock::new(SampleRate(48_000));
        clock.pace(4_800);
        clock.reanchor();
        assert_eq!(clock.frames_produced, 0);
    }
}
