//! Adapts the generic eSCO framer (`btpcm_codec`) onto the byte-oriented
//! `FifoChannel` the engine expects, so the transfer engine never has to
//! know that the SCO profile's wire bytes aren't raw PCM (spec §4.7).

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use btpcm_codec::{EscoCodecKind, EscoDecoder, EscoEncoder, PacketLossConcealment, PayloadCodec};
use btpcm_transport::{Fifo, FifoChannel, FifoError};

/// Wraps a real `Fifo` carrying eSCO HCI frames and presents it to the
/// transfer engine as a plain PCM byte channel.
pub struct EscoFifoAdapter<C, P> {
    inner: Fifo,
    kind: EscoCodecKind,
    encoder: Mutex<EscoEncoder<C>>,
    decoder: Mutex<EscoDecoder<C, P>>,
}

impl<C, P> EscoFifoAdapter<C, P>
where
    C: PayloadCodec + Clone,
    P: PacketLossConcealment,
{
    pub fn new(inner: Fifo, kind: EscoCodecKind, codec: C, plc: P, conceal_on_codec_error: bool) -> Self {
        EscoFifoAdapter {
            inner,
            kind,
            encoder: Mutex::new(EscoEncoder::new(kind, codec.clone())),
            decoder: Mutex::new(EscoDecoder::new(kind, codec, plc, conceal_on_codec_error)),
        }
    }

}

fn bytes_to_samples(buf: &[u8]) -> Vec<i16> {
    buf.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
}

fn samples_to_bytes(samples: &[i16], out: &mut [u8]) {
    for (chunk, sample) in out.chunks_exact_mut(2).zip(samples) {
        chunk.copy_from_slice(&sample.to_le_bytes());
    }
}

impl<C, P> FifoChannel for EscoFifoAdapter<C, P>
where
    C: PayloadCodec + Send,
    P: PacketLossConcealment + Send,
{
    fn write_all(&self, buf: &[u8]) -> Result<(), FifoError> {
        let pcm = bytes_to_samples(buf);
        let mut encoder = self.encoder.lock().unwrap();

        encoder
            .push_samples(&pcm)
            .map_err(|_| FifoError::Io(io::Error::new(io::ErrorKind::Other, "eSCO encode buffer full")))?;

        let mut wire = [0u8; 256];
        loop {
            let n = encoder.take_bytes(&mut wire);
            if n == 0 {
                break;
            }
            self.inner.write_all(&wire[..n])?;
        }

        Ok(())
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), FifoError> {
        let needed_samples = buf.len() / 2;
        let mut decoder = self.decoder.lock().unwrap();
        let frame_len = self.kind.total_frame_len();
        let mut wire_frame = vec![0u8; frame_len];

        while decoder.pending_samples() < needed_samples {
            self.inner.read_exact(&mut wire_frame)?;
            decoder
                .push_bytes(&wire_frame)
                .map_err(|_| FifoError::Io(io::Error::new(io::ErrorKind::Other, "eSCO decode buffer full")))?;
        }

        let mut samples = vec![0i16; needed_samples];
        decoder.take_samples(&mut samples);
        samples_to_bytes(&samples, buf);
        Ok(())
    }

    fn poll_ready(&self, timeout: Duration) -> io::Result<bool> {
        // Approximation: readiness of the underlying wire channel, not of
        // "enough decoded PCM to satisfy the next read_exact". Good enough
        // to avoid busy-polling; `read_exact` still blocks as needed.
        self.inner.poll_ready(timeout)
    }

    fn queued_bytes(&self) -> io::Result<i64> {
        // In wire bytes, not decoded PCM bytes - a known approximation for
        // the delay estimator's fifo_frames term on the SCO profile.
        self.inner.queued_bytes()
    }

    fn try_grow_capacity(&self, min_bytes: usize) {
        self.inner.try_grow_capacity(min_bytes);
    }

    fn codec_delay_samples(&self) -> u64 {
        self.kind.delay_samples()
    }
}
