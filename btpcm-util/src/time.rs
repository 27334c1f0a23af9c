use btpcm_protocol::TimestampMicros;

/// Current time from a monotonic clock source, never `SystemTime`.
///
/// Used to anchor the rate-pacing clock and to timestamp delay snapshots;
/// must never jump backwards or be affected by `settimeofday`.
pub fn now() -> TimestampMicros {
    let timespec = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
        .expect("clock_gettime(CLOCK_MONOTONIC) failed, are we on Linux?");

    let micros = (timespec.tv_sec() as u64) * 1_000_000
        + (timespec.tv_nsec() as u64) / 1_000;

    TimestampMicros(micros)
}
