use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use btpcm_protocol::Direction;

/// Sentinel value for `hw_ptr` meaning "idle; nothing to transfer" (spec §3).
pub const HW_PTR_IDLE: i64 = -1;

/// The mirrored pointer pair: `hw_ptr` is written only by the transfer
/// thread, `appl_ptr` only by the application thread, both read by the
/// opposite side. Lock-free, word-atomic (spec §3 invariant 1, §9).
pub struct RingBuffer {
    hw_ptr: AtomicI64,
    appl_ptr: AtomicI64,
    buffer_size: i64,
    boundary: i64,
    direction: Direction,
}

impl RingBuffer {
    pub fn new(buffer_size: i64, boundary: i64, direction: Direction) -> Self {
        RingBuffer {
            hw_ptr: AtomicI64::new(0),
            appl_ptr: AtomicI64::new(0),
            buffer_size,
            boundary,
            direction,
        }
    }

    /// Zero both pointers (`prepare()`).
    pub fn reset(&self) {
        self.hw_ptr.store(0, Ordering::Release);
        self.appl_ptr.store(0, Ordering::Release);
    }

    pub fn buffer_size(&self) -> i64 {
        self.buffer_size
    }

    pub fn boundary(&self) -> i64 {
        self.boundary
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn hw_ptr(&self) -> i64 {
        self.hw_ptr.load(Ordering::Acquire)
    }

    /// Publish a new `hw_ptr`. Must happen after the corresponding FIFO
    /// transfer and delay-snapshot update (spec §5 ordering guarantee).
    pub fn publish_hw_ptr(&self, value: i64) {
        self.hw_ptr.store(value, Ordering::Release);
    }

    pub fn mark_idle(&self) {
        self.hw_ptr.store(HW_PTR_IDLE, Ordering::Release);
    }

    pub fn is_idle(&self) -> bool {
        self.hw_ptr() == HW_PTR_IDLE
    }

    pub fn appl_ptr(&self) -> i64 {
        self.appl_ptr.load(Ordering::Acquire)
    }

    pub fn set_appl_ptr(&self, value: i64) {
        self.appl_ptr.store(value, Ordering::Release);
    }

    /// Offset of `hw_ptr` within the buffer; used to decide whether a
    /// transfer must fold across the end of the buffer (spec §4.1 step 3).
    pub fn hw_offset(&self) -> i64 {
        self.hw_ptr().rem_euclid(self.buffer_size)
    }

    pub fn appl_offset(&self) -> i64 {
        self.appl_ptr().rem_euclid(self.buffer_size)
    }

    /// Frames available for the application: to consume, for capture; to
    /// fill, for playback. Direction-dependent formula, spec §4.1 step 2.
    pub fn available(&self) -> i64 {
        if self.is_idle() {
            return 0;
        }

        let hw = self.hw_ptr();
        let appl = self.appl_ptr();

        match self.direction {
            Direction::Capture => wrap_diff(hw, appl, self.boundary),
            Direction::Playback => self.buffer_size - wrap_diff(appl, hw, self.boundary),
        }
    }
}

pub(crate) fn wrap_diff(a: i64, b: i64, boundary: i64) -> i64 {
    let diff = a - b;
    if diff < 0 {
        diff + boundary
    } else {
        diff
    }
}

/// The host-owned sample storage behind the ring buffer's pointer pair.
///
/// In a real ioplug this is the mmap area the host sound API allocates;
/// that allocation and its hardware-parameter negotiation are out of scope
/// here (spec §1). This stands in for it with a plain locked byte buffer -
/// safe, and sufficient for the transfer engine's own bookkeeping, at the
/// cost of not being truly lock-free like the real mmap area. Only the
/// transfer thread and the application thread ever touch it, and they're
/// kept from overlapping by the pointer discipline above; the lock here is
/// never held across anything that blocks.
pub struct RingStorage {
    frame_bytes: usize,
    buffer_size: i64,
    bytes: Mutex<Vec<u8>>,
}

impl RingStorage {
    pub fn new(buffer_size: i64, frame_bytes: usize) -> Self {
        RingStorage {
            frame_bytes,
            buffer_size,
            bytes: Mutex::new(vec![0u8; buffer_size as usize * frame_bytes]),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Copy `frames` worth of bytes starting at ring offset `offset` into
    /// `out`. Caller guarantees `offset + frames <= buffer_size` (no wrap
    /// within a single call; wraps are split into two calls by the engine).
    pub fn read_at(&self, offset: i64, frames: i64, out: &mut [u8]) {
        let start = offset as usize * self.frame_bytes;
        let len = frames as usize * self.frame_bytes;
        let bytes = self.bytes.lock().unwrap();
        out[..len].copy_from_slice(&bytes[start..start + len]);
    }

    pub fn write_at(&self, offset: i64, frames: i64, data: &[u8]) {
        let start = offset as usize * self.frame_bytes;
        let len = frames as usize * self.frame_bytes;
        let mut bytes = self.bytes.lock().unwrap();
        bytes[start..start + len].copy_from_slice(&data[..len]);
    }

    /// Fill `frames` worth of the ring with silence (spec §4.4 silence
    /// hwcompat, capture side).
    pub fn write_silence(&self, offset: i64, frames: i64) {
        let start = offset as usize * self.frame_bytes;
        let len = frames as usize * self.frame_bytes;
        let mut bytes = self.bytes.lock().unwrap();
        bytes[start..start + len].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_available_shrinks_as_hw_ptr_advances() {
        let ring = RingBuffer::new(100, 1_000_000, Direction::Playback);
        ring.set_appl_ptr(100);
        assert_eq!(ring.available(), 100);
        ring.publish_hw_ptr(40);
        assert_eq!(ring.available(), 60);
    }

    #[test]
    fn capture_available_grows_as_hw_ptr_advances() {
        let ring = RingBuffer::new(100, 1_000_000, Direction::Capture);
        assert_eq!(ring.available(), 0);
        ring.publish_hw_ptr(25);
        assert_eq!(ring.available(), 25);
    }

    #[test]
    fn idle_sentinel_reports_zero_available() {
        let ring = RingBuffer::new(100, 1_000_000, Direction::Capture);
        ring.mark_idle();
        assert_eq!(ring.available(), 0);
        assert!(ring.is_idle());
    }

    #[test]
    fn pointers_wrap_at_boundary() {
        let ring = RingBuffer::new(100, 1000, Direction::Capture);
        ring.publish_hw_ptr(990);
        ring.set_appl_ptr(950);
        assert_eq!(ring.available(), 40);
        // hw_ptr advances past the boundary and wraps to 40 (990 + 50 = 1040 mod 1000)
        ring.publish_hw_ptr(40);
        assert_eq!(ring.available(), 90);
    }

    #[test]
    fn storage_round_trips_bytes() {
        let storage = RingStorage::new(10, 4);
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        storage.write_at(2, 2, &data);

        let mut out = [0u8; 8];
        storage.read_at(2, 2, &mut out);
        assert_eq!(out, data);
    }
}
