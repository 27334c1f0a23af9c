use btpcm_protocol::{SampleFormat, SampleRate};

/// The negotiated shape of one PCM instance: everything the transfer
/// engine needs to know about rate, framing and buffering, arrived at
/// during hardware-parameter / software-parameter negotiation (host glue,
/// out of scope here - this is just the result of that negotiation).
#[derive(Debug, Clone, Copy)]
pub struct PcmGeometry {
    pub rate: SampleRate,
    pub channels: u16,
    pub format: SampleFormat,
    /// Frames per period; the application is woken at most once per period.
    pub period_size: i64,
    /// Frames in the whole ring; `buffer_size / period_size` is in `[2, 1024]`.
    pub buffer_size: i64,
    /// Minimum frames available before waking the application.
    pub avail_min: i64,
    /// Virtual modulus `hw_ptr`/`appl_ptr` wrap against; larger than `buffer_size`.
    pub boundary: i64,
}

impl PcmGeometry {
    pub fn frame_bytes(&self) -> usize {
        self.format.frame_bytes(self.channels)
    }

    pub fn period_bytes(&self) -> usize {
        self.period_size as usize * self.frame_bytes()
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_size as usize * self.frame_bytes()
    }
}
