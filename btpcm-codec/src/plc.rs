//! Packet loss concealment for frames the sequence-number tracker in
//! [`crate::esco::EscoDecoder`] has determined were lost on the wire.

pub trait PacketLossConcealment {
    /// Called after every successful decode, so the concealer has a model
    /// of what came before the next gap.
    fn observe(&mut self, frame: &[i16]);

    /// Fill `out` with concealment samples for one lost frame.
    fn conceal(&mut self, out: &mut [i16]);
}

/// Repeats the last successfully decoded frame verbatim. Crude but
/// deterministic, which is what the in-process tests need; a real deployment
/// would plug in a codec-specific PLC instead.
#[derive(Default)]
pub struct RepeatLastFrame {
    last: heapless::Vec<i16, { crate::esco::MAX_CODE_SAMPLES }>,
}

impl PacketLossConcealment for RepeatLastFrame {
    fn observe(&mut self, frame: &[i16]) {
        self.last.clear();
        // Frame is always <= MAX_CODE_SAMPLES by construction of the framer.
        let _ = self.last.extend_from_slice(frame);
    }

    fn conceal(&mut self, out: &mut [i16]) {
        if self.last.is_empty() {
            out.fill(0);
            return;
        }

        for (dst, &src) in out.iter_mut().zip(self.last.iter().cycle()) {
            *dst = src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conceals_silence_before_any_frame_observed() {
        let mut plc = RepeatLastFrame::default();
        let mut out = [1i16; 4];
        plc.conceal(&mut out);
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn repeats_last_observed_frame() {
        let mut plc = RepeatLastFrame::default();
        plc.observe(&[10, 20, 30]);

        let mut out = [0i16; 3];
        plc.conceal(&mut out);
        assert_eq!(out, [10, 20, 30]);
    }
}
