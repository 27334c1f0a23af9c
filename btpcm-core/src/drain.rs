use std::time::{Duration, Instant};

use btpcm_protocol::SampleRate;
use btpcm_transport::{control, Command};

use crate::engine::{EngineError, TransferEngine};

#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("drain timed out waiting for the buffer to empty")]
    Timeout,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub enum DrainOutcome {
    Done,
    /// Non-blocking mode returned immediately with the buffer still
    /// non-empty; the caller should try again later.
    Again,
}

/// Playback drain (spec §4.3, §8). Capture drain is a no-op success the
/// caller handles directly - there's nothing for this function to do
/// there, so it isn't represented here at all.
pub fn drain_playback(engine: &TransferEngine, nonblock: bool) -> Result<DrainOutcome, DrainError> {
    if !engine.is_connected() {
        return Err(DrainError::Disconnected);
    }

    engine.start()?;

    if nonblock {
        if engine.ring().available() == 0 {
            send_drain(engine)?;
            return Ok(DrainOutcome::Done);
        }
        return Ok(DrainOutcome::Again);
    }

    let avail_at_start = engine.ring().available();
    let bound = Duration::from_millis(100) + period_count_bound(
        avail_at_start,
        engine.geometry().period_size,
        engine.geometry().rate,
    );
    let deadline = Instant::now() + bound;

    loop {
        if !engine.is_connected() {
            return Err(DrainError::Disconnected);
        }

        if engine.ring().available() == 0 {
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            let _ = engine.stop();
            return Err(DrainError::Timeout);
        }

        let wait = (deadline - now).min(Duration::from_millis(100));
        if engine.event().poll_readable(wait).unwrap_or(false) {
            let _ = engine.event().read();
        }
    }

    send_drain(engine)?;
    Ok(DrainOutcome::Done)
}

fn send_drain(engine: &TransferEngine) -> Result<(), DrainError> {
    engine
        .send_control_and_wait(Command::Drain, control::DEFAULT_TIMEOUT)
        .map_err(DrainError::Engine)
}

/// `⌈avail/period⌉ · period / rate · 1000 ms` (spec §4.3).
fn period_count_bound(avail: i64, period: i64, rate: SampleRate) -> Duration {
    if period <= 0 || rate.0 == 0 {
        return Duration::ZERO;
    }

    let periods = (avail + period - 1) / period;
    let millis = (periods as u64) * (period as u64) * 1000 / u64::from(rate.0);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_count_bound_rounds_up() {
        // 220 frames at 25ms period (1102 frames @ 44.1kHz) rounds up to 2 periods.
        let bound = period_count_bound(1, 1102, SampleRate(44_100));
        assert_eq!(bound, Duration::from_millis(25));
    }

    #[test]
    fn period_count_bound_zero_when_empty() {
        assert_eq!(period_count_bound(0, 1102, SampleRate(44_100)), Duration::ZERO);
    }
}
