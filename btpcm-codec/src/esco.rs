//! eSCO wire framing: H2 header plus a fixed-size codec payload, on top of
//! a pluggable [`PayloadCodec`] that does the actual SBC/LC3 compression.
//!
//! The framer owns two small fixed-capacity buffers - "three frames of wire
//! bytes" on the way in, "six frames of PCM samples" on the way out (or the
//! mirror image for the encoder) - sized generously enough that the
//! transfer engine's hop between "enough bytes arrived" and "a full frame
//! is available to decode" never needs to allocate.

use crate::h2::{self, H2Header};
use crate::plc::PacketLossConcealment;

/// Largest `code_sample_count()` across known codecs; buffer sizing uses
/// this as the fixed capacity shared by both directions.
pub const MAX_CODE_SAMPLES: usize = 240;
const MAX_PAYLOAD_LEN: usize = 58;
const MAX_TOTAL_FRAME_LEN: usize = 60;

const WIRE_BUF_FRAMES: usize = 3;
const PCM_BUF_FRAMES: usize = 6;

const CAP_WIRE: usize = WIRE_BUF_FRAMES * MAX_TOTAL_FRAME_LEN;
const CAP_PCM: usize = PCM_BUF_FRAMES * MAX_CODE_SAMPLES;

/// The set of framings this crate knows how to speak. `TestRaw16` isn't a
/// real over-the-air codec; it exists so the framer's sequencing and PLC
/// logic can be exercised deterministically without a real SBC/LC3 library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscoCodecKind {
    MsbcEsco,
    Lc3SwbEsco,
    #[doc(hidden)]
    TestRaw16,
}

impl EscoCodecKind {
    pub const fn payload_len(self) -> usize {
        match self {
            EscoCodecKind::MsbcEsco => 57,
            EscoCodecKind::Lc3SwbEsco => 58,
            EscoCodecKind::TestRaw16 => 32,
        }
    }

    pub const fn padding_len(self) -> usize {
        self.total_frame_len() - 2 - self.payload_len()
    }

    pub const fn total_frame_len(self) -> usize {
        match self {
            EscoCodecKind::MsbcEsco => 60,
            EscoCodecKind::Lc3SwbEsco => 60,
            EscoCodecKind::TestRaw16 => 34,
        }
    }

    pub const fn code_sample_count(self) -> usize {
        match self {
            EscoCodecKind::MsbcEsco => 120,
            EscoCodecKind::Lc3SwbEsco => 240,
            EscoCodecKind::TestRaw16 => 16,
        }
    }

    /// Codec algorithmic delay, in PCM samples, that the delay estimator
    /// folds into its total. Fixed per codec rather than measured.
    pub const fn delay_samples(self) -> u64 {
        match self {
            EscoCodecKind::MsbcEsco => 73,
            // No real LC3 library is linked here; this stands in for
            // whatever the real decoder reports.
            EscoCodecKind::Lc3SwbEsco => 180,
            EscoCodecKind::TestRaw16 => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("codec payload was corrupt or could not be decoded")]
    Corrupt,
}

/// The actual SBC/LC3 compression, abstracted so the framer above doesn't
/// need to know the bit layout of any particular codec's payload.
pub trait PayloadCodec {
    fn encode_frame(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<(), CodecError>;
    fn decode_frame(&mut self, payload: &[u8], out: &mut [i16]) -> Result<(), CodecError>;
}

/// Identity codec used only by this crate's own tests: payload is just the
/// PCM samples as little-endian bytes. Never used for `MsbcEsco` or
/// `Lc3SwbEsco`, whose payload sizes don't divide evenly by 2.
#[derive(Default)]
pub struct RawPcm16Codec;

impl PayloadCodec for RawPcm16Codec {
    fn encode_frame(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() != pcm.len() * 2 {
            return Err(CodecError::Corrupt);
        }

        for (chunk, &sample) in out.chunks_exact_mut(2).zip(pcm) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }

        Ok(())
    }

    fn decode_frame(&mut self, payload: &[u8], out: &mut [i16]) -> Result<(), CodecError> {
        if payload.len() != out.len() * 2 {
            return Err(CodecError::Corrupt);
        }

        for (dst, chunk) in out.iter_mut().zip(payload.chunks_exact(2)) {
            *dst = i16::from_le_bytes([chunk[0], chunk[1]]);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    #[error("framer buffer is full")]
    BufferFull,
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

fn drop_front_u8(buf: &mut heapless::Vec<u8, CAP_WIRE>, n: usize) {
    buf.copy_within(n.., 0);
    buf.truncate(buf.len() - n);
}

fn drop_front_i16(buf: &mut heapless::Vec<i16, CAP_PCM>, n: usize) {
    buf.copy_within(n.., 0);
    buf.truncate(buf.len() - n);
}

pub struct EscoEncoder<C> {
    kind: EscoCodecKind,
    codec: C,
    pcm_in: heapless::Vec<i16, CAP_PCM>,
    wire_out: heapless::Vec<u8, CAP_WIRE>,
    next_seq: u8,
}

impl<C: PayloadCodec> EscoEncoder<C> {
    pub fn new(kind: EscoCodecKind, codec: C) -> Self {
        EscoEncoder {
            kind,
            codec,
            pcm_in: heapless::Vec::new(),
            wire_out: heapless::Vec::new(),
            next_seq: 0,
        }
    }

    /// Accept more PCM input, encoding as many whole frames as are now
    /// available. Encoded bytes accumulate until [`Self::take_bytes`] is
    /// called to drain them.
    pub fn push_samples(&mut self, pcm: &[i16]) -> Result<(), FramerError> {
        self.pcm_in
            .extend_from_slice(pcm)
            .map_err(|_| FramerError::BufferFull)?;

        self.drain_frames()
    }

    fn drain_frames(&mut self) -> Result<(), FramerError> {
        let code_samples = self.kind.code_sample_count();
        let payload_len = self.kind.payload_len();

        while self.pcm_in.len() >= code_samples {
            let mut payload = [0u8; MAX_PAYLOAD_LEN];
            self.codec
                .encode_frame(&self.pcm_in[..code_samples], &mut payload[..payload_len])?;

            let header = H2Header { seq: self.next_seq };
            self.wire_out
                .extend_from_slice(&header.to_le_bytes())
                .map_err(|_| FramerError::BufferFull)?;
            self.wire_out
                .extend_from_slice(&payload[..payload_len])
                .map_err(|_| FramerError::BufferFull)?;
            for _ in 0..self.kind.padding_len() {
                self.wire_out.push(0).map_err(|_| FramerError::BufferFull)?;
            }

            self.next_seq = (self.next_seq + 1) % 4;
            drop_front_i16(&mut self.pcm_in, code_samples);
        }

        Ok(())
    }

    /// Drain produced wire bytes into `out`, returning how many were
    /// written. Call repeatedly until it returns 0.
    pub fn take_bytes(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.wire_out.len());
        out[..n].copy_from_slice(&self.wire_out[..n]);
        drop_front_u8(&mut self.wire_out, n);
        n
    }

    pub fn pending_bytes(&self) -> usize {
        self.wire_out.len()
    }
}

fn seq_gap(last_seq: Option<u8>, new_seq: u8) -> u8 {
    match last_seq {
        None => 0,
        Some(last) => {
            let expected = (last + 1) % 4;
            (new_seq + 4 - expected) % 4
        }
    }
}

pub struct EscoDecoder<C, P> {
    kind: EscoCodecKind,
    codec: C,
    plc: P,
    wire_in: heapless::Vec<u8, CAP_WIRE>,
    pcm_out: heapless::Vec<i16, CAP_PCM>,
    last_seq: Option<u8>,
    conceal_on_codec_error: bool,
}

impl<C: PayloadCodec, P: PacketLossConcealment> EscoDecoder<C, P> {
    pub fn new(kind: EscoCodecKind, codec: C, plc: P, conceal_on_codec_error: bool) -> Self {
        EscoDecoder {
            kind,
            codec,
            plc,
            wire_in: heapless::Vec::new(),
            pcm_out: heapless::Vec::new(),
            last_seq: None,
            conceal_on_codec_error,
        }
    }

    /// Feed more wire bytes in, processing as many complete frames as are
    /// now available. Decoded (and PLC-concealed) samples accumulate until
    /// [`Self::take_samples`] drains them.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), FramerError> {
        self.wire_in
            .extend_from_slice(bytes)
            .map_err(|_| FramerError::BufferFull)?;

        self.process()
    }

    fn process(&mut self) -> Result<(), FramerError> {
        let frame_len = self.kind.total_frame_len();
        let payload_len = self.kind.payload_len();
        let code_samples = self.kind.code_sample_count();

        loop {
            let Some((header, offset)) = h2::scan(&self.wire_in) else {
                break;
            };

            if self.wire_in.len() < offset + frame_len {
                // Header found but the frame isn't fully in yet; drop the
                // garbage before it and wait for more bytes.
                drop_front_u8(&mut self.wire_in, offset);
                break;
            }

            let gap = seq_gap(self.last_seq, header.seq);

            // Defer: not enough room in pcm_out for the gap concealment
            // plus this frame's decoded output. Strip only the garbage
            // ahead of the header and stop; the frame itself stays in
            // wire_in and the next push_bytes/take_samples cycle picks it
            // back up rather than silently dropping output.
            drop_front_u8(&mut self.wire_in, offset);
            if self.pcm_out.len() + gap as usize * code_samples + code_samples > CAP_PCM {
                break;
            }

            for _ in 0..gap {
                let mut concealed = [0i16; MAX_CODE_SAMPLES];
                self.plc.conceal(&mut concealed[..code_samples]);
                let _ = self.pcm_out.extend_from_slice(&concealed[..code_samples]);
            }

            let payload = &self.wire_in[2..2 + payload_len];
            let mut decoded = [0i16; MAX_CODE_SAMPLES];
            match self.codec.decode_frame(payload, &mut decoded[..code_samples]) {
                Ok(()) => {
                    self.plc.observe(&decoded[..code_samples]);
                    let _ = self.pcm_out.extend_from_slice(&decoded[..code_samples]);
                }
                Err(err) => {
                    if self.conceal_on_codec_error {
                        let mut concealed = [0i16; MAX_CODE_SAMPLES];
                        self.plc.conceal(&mut concealed[..code_samples]);
                        let _ = self.pcm_out.extend_from_slice(&concealed[..code_samples]);
                    } else {
                        drop_front_u8(&mut self.wire_in, frame_len);
                        self.last_seq = Some(header.seq);
                        return Err(FramerError::Codec(err));
                    }
                }
            }

            self.last_seq = Some(header.seq);
            drop_front_u8(&mut self.wire_in, frame_len);
        }

        Ok(())
    }

    /// Drain decoded PCM samples into `out`, returning how many were
    /// written. Call repeatedly until it returns 0.
    pub fn take_samples(&mut self, out: &mut [i16]) -> usize {
        let n = out.len().min(self.pcm_out.len());
        out[..n].copy_from_slice(&self.pcm_out[..n]);
        drop_front_i16(&mut self.pcm_out, n);
        n
    }

    pub fn pending_samples(&self) -> usize {
        self.pcm_out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plc::RepeatLastFrame;

    fn sine_frame(kind: EscoCodecKind, frame_index: i32) -> Vec<i16> {
        let n = kind.code_sample_count();
        (0..n)
            .map(|i| {
                let phase = (frame_index * n as i32 + i as i32) as f32 * 0.1;
                (phase.sin() * 1000.0) as i16
            })
            .collect()
    }

    #[test]
    fn encode_then_decode_round_trip() {
        let kind = EscoCodecKind::TestRaw16;
        let mut encoder = EscoEncoder::new(kind, RawPcm16Codec);
        let mut decoder =
            EscoDecoder::new(kind, RawPcm16Codec, RepeatLastFrame::default(), true);

        for frame in 0..18 {
            let pcm = sine_frame(kind, frame);
            encoder.push_samples(&pcm).unwrap();
        }

        let mut wire = vec![0u8; encoder.pending_bytes()];
        let n = encoder.take_bytes(&mut wire);
        wire.truncate(n);

        decoder.push_bytes(&wire).unwrap();

        let mut out = vec![0i16; decoder.pending_samples()];
        let n = decoder.take_samples(&mut out);
        out.truncate(n);

        assert_eq!(out.len(), 18 * kind.code_sample_count());
    }

    #[test]
    fn single_dropped_frame_is_concealed_not_lost() {
        let kind = EscoCodecKind::TestRaw16;
        let mut encoder = EscoEncoder::new(kind, RawPcm16Codec);
        let mut decoder =
            EscoDecoder::new(kind, RawPcm16Codec, RepeatLastFrame::default(), true);

        for frame in 0..18 {
            let pcm = sine_frame(kind, frame);
            encoder.push_samples(&pcm).unwrap();
        }

        let mut wire = vec![0u8; encoder.pending_bytes()];
        let n = encoder.take_bytes(&mut wire);
        wire.truncate(n);

        let frame_len = kind.total_frame_len();
        // Drop the 3rd frame on the wire (index 2) in its entirety.
        wire.drain(frame_len * 2..frame_len * 3);

        decoder.push_bytes(&wire).unwrap();

        let mut out = vec![0i16; decoder.pending_samples()];
        let n = decoder.take_samples(&mut out);
        out.truncate(n);

        assert_eq!(out.len(), 18 * kind.code_sample_count());
    }

    #[test]
    fn four_contiguous_dropped_frames_exceed_recovery_window() {
        let kind = EscoCodecKind::TestRaw16;
        let mut encoder = EscoEncoder::new(kind, RawPcm16Codec);
        let mut decoder =
            EscoDecoder::new(kind, RawPcm16Codec, RepeatLastFrame::default(), true);

        for frame in 0..18 {
            let pcm = sine_frame(kind, frame);
            encoder.push_samples(&pcm).unwrap();
        }

        let mut wire = vec![0u8; encoder.pending_bytes()];
        let n = encoder.take_bytes(&mut wire);
        wire.truncate(n);

        let frame_len = kind.total_frame_len();
        // Drop frames at indices 2..6 (4 contiguous frames) - a run long
        // enough that the 2-bit sequence counter aliases and the gap goes
        // undetected.
        wire.drain(frame_len * 2..frame_len * 6);

        decoder.push_bytes(&wire).unwrap();

        let mut out = vec![0i16; decoder.pending_samples()];
        let n = decoder.take_samples(&mut out);
        out.truncate(n);

        assert_eq!(out.len(), (18 - 4) * kind.code_sample_count());
    }

    #[test]
    fn decoder_defers_instead_of_dropping_when_output_is_full() {
        let kind = EscoCodecKind::TestRaw16;
        let mut encoder = EscoEncoder::new(kind, RawPcm16Codec);
        let mut decoder =
            EscoDecoder::new(kind, RawPcm16Codec, RepeatLastFrame::default(), true);

        let frames_to_fill = CAP_PCM / kind.code_sample_count();
        let mut wire_frames = Vec::new();
        for frame in 0..=frames_to_fill {
            let pcm = sine_frame(kind, frame as i32);
            encoder.push_samples(&pcm).unwrap();
            let mut wire = vec![0u8; encoder.pending_bytes()];
            let n = encoder.take_bytes(&mut wire);
            wire.truncate(n);
            wire_frames.push(wire);
        }

        for wire in &wire_frames {
            decoder.push_bytes(wire).unwrap();
        }

        // Capped at capacity, not overflowed past it or silently dropped.
        assert_eq!(decoder.pending_samples(), CAP_PCM);

        // Draining frees room; re-processing (triggered by any push_bytes
        // call) picks the deferred frame back up instead of having lost it.
        let mut out = vec![0i16; kind.code_sample_count()];
        decoder.take_samples(&mut out);
        decoder.push_bytes(&[]).unwrap();
        assert_eq!(decoder.pending_samples(), CAP_PCM);
    }

    #[test]
    fn garbage_prefix_is_skipped_during_resync() {
        let kind = EscoCodecKind::TestRaw16;
        let mut encoder = EscoEncoder::new(kind, RawPcm16Codec);
        let mut decoder =
            EscoDecoder::new(kind, RawPcm16Codec, RepeatLastFrame::default(), true);

        let pcm = sine_frame(kind, 0);
        encoder.push_samples(&pcm).unwrap();

        let mut wire = vec![0xaa, 0xbb, 0xcc];
        let mut frame = vec![0u8; encoder.pending_bytes()];
        let n = encoder.take_bytes(&mut frame);
        frame.truncate(n);
        wire.extend_from_slice(&frame);

        decoder.push_bytes(&wire).unwrap();

        let mut out = vec![0i16; decoder.pending_samples()];
        let n = decoder.take_samples(&mut out);
        out.truncate(n);

        assert_eq!(out, pcm);
    }
}
