use std::io;
use std::os::unix::io::RawFd;

use btpcm_protocol::Direction;

/// The byte-oriented FIFO data channel handed to us by the external
/// Bluetooth audio service (spec §3, "FIFO transport pair").
///
/// A blocking half-duplex pipe in the direction of the stream. We own the
/// descriptor for the lifetime of the `Pcm`; the external service is
/// responsible for the other end.
pub struct Fifo {
    fd: RawFd,
    direction: Direction,
}

#[derive(Debug, thiserror::Error)]
pub enum FifoError {
    #[error("fifo peer closed the connection")]
    PeerClosed,
    #[error("fifo i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Fifo {
    /// Takes ownership of an already-open descriptor, as handed to us by
    /// the external service. Closed on drop.
    pub fn from_raw_fd(fd: RawFd, direction: Direction) -> Self {
        Fifo { fd, direction }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Read until `buf` is completely filled, retrying on interrupted
    /// syscalls and continuing from the offset reached on short reads
    /// (spec §4.1 step 5).
    pub fn read_exact(&self, mut buf: &mut [u8]) -> Result<(), FifoError> {
        while !buf.is_empty() {
            let n = self.read_partial(buf)?;
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Write until all of `buf` has been written, same retry/continuation
    /// rules as `read_exact`.
    pub fn write_all(&self, mut buf: &[u8]) -> Result<(), FifoError> {
        while !buf.is_empty() {
            let n = self.write_partial(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }

    fn read_partial(&self, buf: &mut [u8]) -> Result<usize, FifoError> {
        loop {
            let n = unsafe {
                libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(FifoError::Io(err));
            }

            if n == 0 {
                // zero-length read: peer closed their end
                return Err(FifoError::PeerClosed);
            }

            return Ok(n as usize);
        }
    }

    /// Bytes currently queued and unread in the pipe (Linux `FIONREAD`).
    /// Used by the delay estimator and by silence-hwcompat pre-buffering.
    pub fn queued_bytes(&self) -> io::Result<i64> {
        let mut n: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(self.fd, libc::FIONREAD as _, &mut n) };

        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(n as i64)
    }

    /// Block until the descriptor is ready for this direction's I/O or
    /// `timeout` elapses; returns `false` on timeout. Gives the transfer
    /// thread a way to notice a cancellation flag without blocking in
    /// `read`/`write` indefinitely.
    pub fn poll_ready(&self, timeout: std::time::Duration) -> io::Result<bool> {
        let events = match self.direction {
            Direction::Capture => libc::POLLIN,
            Direction::Playback => libc::POLLOUT,
        };

        let mut pfd = libc::pollfd {
            fd: self.fd,
            events,
            revents: 0,
        };

        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }

        Ok(rc > 0)
    }

    fn write_partial(&self, buf: &[u8]) -> Result<usize, FifoError> {
        loop {
            let n = unsafe {
                libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len())
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                if err.raw_os_error() == Some(libc::EPIPE) {
                    return Err(FifoError::PeerClosed);
                }
                return Err(FifoError::Io(err));
            }

            return Ok(n as usize);
        }
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// What the transfer engine needs from the data channel, abstracted so a
/// profile that frames its own wire format (eSCO) can sit an adapter
/// between the ring buffer and the real `Fifo` without the engine
/// knowing the difference (spec §4.7 "auxiliary codec framing... tightly
/// coupled to the same ring-buffer machinery").
pub trait FifoChannel: Send + Sync {
    fn write_all(&self, buf: &[u8]) -> Result<(), FifoError>;
    fn read_exact(&self, buf: &mut [u8]) -> Result<(), FifoError>;
    fn poll_ready(&self, timeout: std::time::Duration) -> io::Result<bool>;
    fn queued_bytes(&self) -> io::Result<i64>;

    /// Best-effort request that the channel hold at least `min_bytes`
    /// before blocking writers (spec §4.4, §6 - silence hwcompat capture
    /// wants the FIFO grown to a couple of periods before it starts
    /// pre-buffering). Channels with no notion of a resizable buffer just
    /// ignore it.
    fn try_grow_capacity(&self, min_bytes: usize) {
        let _ = min_bytes;
    }

    /// Codec algorithmic delay in samples, folded into the delay
    /// estimator's `codec_delay_dms` term (spec §4.6, §9). Zero for a
    /// channel that carries raw PCM.
    fn codec_delay_samples(&self) -> u64 {
        0
    }
}

impl FifoChannel for Fifo {
    fn write_all(&self, buf: &[u8]) -> Result<(), FifoError> {
        Fifo::write_all(self, buf)
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), FifoError> {
        Fifo::read_exact(self, buf)
    }

    fn poll_ready(&self, timeout: std::time::Duration) -> io::Result<bool> {
        Fifo::poll_ready(self, timeout)
    }

    fn queued_bytes(&self) -> io::Result<i64> {
        Fifo::queued_bytes(self)
    }

    /// Linux `F_SETPIPE_SZ`; best-effort, the kernel may round up or
    /// refuse without an error we need to surface here.
    fn try_grow_capacity(&self, min_bytes: usize) {
        if min_bytes == 0 {
            return;
        }
        let target = min_bytes.min(libc::c_int::MAX as usize) as libc::c_int;
        unsafe {
            libc::fcntl(self.fd, libc::F_SETPIPE_SZ, target);
        }
    }
}

/// A no-op sink descriptor used by silence-hwcompat playback to flush the
/// ring buffer's consumed side without a real Bluetooth link behind it
/// (spec §4.4).
pub struct NullSink {
    fd: RawFd,
}

impl NullSink {
    pub fn open() -> io::Result<Self> {
        let path = std::ffi::CString::new("/dev/null").unwrap();
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC) };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(NullSink { fd })
    }

    /// Discard `buf`. Short writes to `/dev/null` never happen in
    /// practice, but we loop anyway for the same reason `Fifo` does.
    pub fn discard(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = unsafe {
                libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len())
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            buf = &buf[n as usize..];
        }

        Ok(())
    }
}

impl Drop for NullSink {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn write_all_then_read_exact() {
        let (r, w) = pipe();
        let reader = Fifo::from_raw_fd(r, Direction::Capture);
        let writer = Fifo::from_raw_fd(w, Direction::Playback);

        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        writer.write_all(&data).unwrap();

        let mut out = [0u8; 8];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn peer_close_detected_on_read() {
        let (r, w) = pipe();
        let reader = Fifo::from_raw_fd(r, Direction::Capture);
        drop(Fifo::from_raw_fd(w, Direction::Playback));

        let mut buf = [0u8; 4];
        let err = reader.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, FifoError::PeerClosed));
    }

    #[test]
    fn null_sink_discards() {
        let sink = NullSink::open().unwrap();
        sink.discard(&[0u8; 4096]).unwrap();
    }

    #[test]
    fn queued_bytes_reflects_unread_data() {
        let (r, w) = pipe();
        let reader = Fifo::from_raw_fd(r, Direction::Capture);
        let writer = Fifo::from_raw_fd(w, Direction::Playback);

        assert_eq!(reader.queued_bytes().unwrap(), 0);
        writer.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(reader.queued_bytes().unwrap(), 4);
    }

    #[test]
    fn poll_ready_times_out_without_data() {
        let (r, w) = pipe();
        let reader = Fifo::from_raw_fd(r, Direction::Capture);
        let _writer = Fifo::from_raw_fd(w, Direction::Playback);

        let ready = reader.poll_ready(std::time::Duration::from_millis(20)).unwrap();
        assert!(!ready);
    }

    #[test]
    fn poll_ready_true_once_data_arrives() {
        let (r, w) = pipe();
        let reader = Fifo::from_raw_fd(r, Direction::Capture);
        let writer = Fifo::from_raw_fd(w, Direction::Playback);

        writer.write_all(&[9]).unwrap();
        let ready = reader.poll_ready(std::time::Duration::from_millis(100)).unwrap();
        assert!(ready);
    }
}
