use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btpcm_protocol::{HwCompat, SampleRate};

/// Whether the PCM should report "device busy" rather than operate
/// normally, given the current hwcompat mode and whether the remote
/// stream is running (spec §4.4, §7 device-busy error kind).
pub fn is_device_busy(mode: HwCompat, remote_running: bool) -> bool {
    match mode {
        HwCompat::None | HwCompat::Busy => !remote_running,
        HwCompat::Silence => false,
    }
}

/// Deadline for one period's worth of real data to arrive before silence
/// is substituted, at the nominal rate (spec §4.4 silence capture).
pub fn period_deadline(period_frames: i64, rate: SampleRate) -> Duration {
    Duration::from_secs_f64(period_frames as f64 / f64::from(rate.0))
}

/// Capture-side silence gate: tracks whether the engine is currently
/// inserting synthesized silence or doing real transfers, and whether the
/// FIFO has buffered enough to safely switch to real reads in the first
/// place (spec §4.4, §9 "1.5-period pre-buffering rule").
pub struct SilenceCaptureGate {
    active: AtomicBool,
    prebuffered: AtomicBool,
}

impl SilenceCaptureGate {
    pub fn new() -> Self {
        SilenceCaptureGate {
            active: AtomicBool::new(false),
            prebuffered: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Whether it's safe to switch to real reads: once true, stays true
    /// for the life of the gate. Before the first real read, if the FIFO
    /// holds fewer than 1.5 periods and the period is smaller than the
    /// FIFO's capacity, we keep inserting silence rather than draining the
    /// FIFO dry the moment we start reading it.
    pub fn ready_for_real_reads(
        &self,
        fifo_queued_frames: i64,
        period_frames: i64,
        fifo_capacity_frames: i64,
    ) -> bool {
        if self.prebuffered.load(Ordering::Acquire) {
            return true;
        }

        if period_frames >= fifo_capacity_frames {
            self.prebuffered.store(true, Ordering::Release);
            return true;
        }

        let threshold = period_frames + period_frames / 2;
        let ready = fifo_queued_frames >= threshold;

        if ready {
            self.prebuffered.store(true, Ordering::Release);
        }

        ready
    }
}

impl Default for SilenceCaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_and_busy_modes_report_busy_when_not_running() {
        assert!(is_device_busy(HwCompat::None, false));
        assert!(is_device_busy(HwCompat::Busy, false));
        assert!(!is_device_busy(HwCompat::None, true));
    }

    #[test]
    fn silence_mode_never_reports_busy() {
        assert!(!is_device_busy(HwCompat::Silence, false));
        assert!(!is_device_busy(HwCompat::Silence, true));
    }

    #[test]
    fn prebuffer_gate_waits_for_one_and_half_periods() {
        let gate = SilenceCaptureGate::new();
        assert!(!gate.ready_for_real_reads(100, 100, 1000));
        assert!(gate.ready_for_real_reads(150, 100, 1000));
    }

    #[test]
    fn prebuffer_gate_latches_ready_once_true() {
        let gate = SilenceCaptureGate::new();
        assert!(gate.ready_for_real_reads(200, 100, 1000));
        // Even if the FIFO later drains below threshold, stays ready.
        assert!(gate.ready_for_real_reads(0, 100, 1000));
    }

    #[test]
    fn prebuffer_skipped_when_period_not_smaller_than_fifo() {
        let gate = SilenceCaptureGate::new();
        assert!(gate.ready_for_real_reads(0, 1000, 500));
    }
}
