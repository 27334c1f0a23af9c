use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

/// The negotiated sample rate of a PCM, in Hz.
#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{_0}Hz")]
pub struct SampleRate(pub u32);

impl From<SampleRate> for u32 {
    fn from(value: SampleRate) -> Self { value.0 }
}

impl From<SampleRate> for u64 {
    fn from(value: SampleRate) -> Self { value.0.into() }
}

impl From<SampleRate> for i64 {
    fn from(value: SampleRate) -> Self { value.0.into() }
}

impl From<SampleRate> for u128 {
    fn from(value: SampleRate) -> Self { value.0.into() }
}

/// Wall-clock time, monotonic, denominated in microseconds.
///
/// Never constructed from `SystemTime` - always from a monotonic clock
/// source, see `btpcm_util::time::now`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimestampMicros(pub u64);

impl TimestampMicros {
    pub fn saturating_sub(&self, duration: Duration) -> TimestampMicros {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        TimestampMicros(self.0.saturating_sub(micros))
    }

    pub fn elapsed_since(&self, earlier: TimestampMicros) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// A frame count relative to some PCM's negotiated sample rate.
///
/// Unlike `bark`'s `SampleDuration`, the rate here is not a single
/// process-wide constant - every `Pcm` negotiates its own rate - so
/// conversions to/from wall-clock time take the rate as a parameter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SampleDuration(u64);

impl SampleDuration {
    pub const fn zero() -> Self {
        SampleDuration(0)
    }

    pub const fn from_frame_count(frames: u64) -> Self {
        SampleDuration(frames)
    }

    pub fn to_frame_count(self) -> u64 {
        self.0
    }

    pub fn from_std_duration_lossy(duration: Duration, rate: SampleRate) -> SampleDuration {
        let frames = (duration.as_micros() * u128::from(rate)) / 1_000_000;
        let frames = u64::try_from(frames).expect("can't narrow frame count to u64");
        SampleDuration(frames)
    }

    pub fn to_std_duration_lossy(self, rate: SampleRate) -> Duration {
        let micros = (u128::from(self.0) * 1_000_000) / u128::from(rate);
        let micros = u64::try_from(micros).expect("can't narrow usecs to u64");
        Duration::from_micros(micros)
    }
}

impl Add<SampleDuration> for SampleDuration {
    type Output = SampleDuration;
    fn add(self, rhs: SampleDuration) -> Self::Output {
        SampleDuration(self.0.checked_add(rhs.0).expect("SampleDuration::add overflow"))
    }
}

impl AddAssign<SampleDuration> for SampleDuration {
    fn add_assign(&mut self, rhs: SampleDuration) {
        *self = *self + rhs;
    }
}

impl Sub<SampleDuration> for SampleDuration {
    type Output = SampleDuration;
    fn sub(self, rhs: SampleDuration) -> Self::Output {
        SampleDuration(self.0.checked_sub(rhs.0).expect("SampleDuration::sub underflow"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_duration() {
        let rate = SampleRate(44100);
        let dur = Duration::from_millis(250);
        let frames = SampleDuration::from_std_duration_lossy(dur, rate);
        assert_eq!(frames.to_frame_count(), 11025);
        let back = frames.to_std_duration_lossy(rate);
        assert_eq!(back.as_millis(), 250);
    }

    #[test]
    fn elapsed_since_saturates() {
        let early = TimestampMicros(100);
        let late = TimestampMicros(50);
        // clock went "backwards" relative to our expectation - never panic
        assert_eq!(late.elapsed_since(early), Duration::from_micros(0));
    }
}
