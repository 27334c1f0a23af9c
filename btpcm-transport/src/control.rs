use std::io;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::time::Duration;

/// Default wait applied to Drop/Drain, which don't have a reason to bound
/// application blocking as tightly as Pause/Resume do (spec §5).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause/Resume get a short timeout so a misbehaving server can't block
/// the application thread indefinitely (spec §5).
pub const PAUSE_RESUME_TIMEOUT: Duration = Duration::from_millis(200);

/// The four verbs this plug-in ever sends over the control channel
/// (spec §4.8, §6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Drop,
    Drain,
}

impl Command {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Command::Pause => b"Pause",
            Command::Resume => b"Resume",
            Command::Drop => b"Drop",
            Command::Drain => b"Drain",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control channel timed out waiting for reply")]
    Timeout,
    #[error("control channel i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("control channel reported error: {0}")]
    Remote(String),
}

/// Client for the short request/response protocol over the control
/// descriptor handed to us by the external service (spec §4.8).
///
/// Requests and responses are one-shot and unordered across commands, so
/// a plain datagram socket gives us message framing for free without a
/// length-prefix scheme.
pub struct ControlChannel {
    socket: UnixDatagram,
}

impl ControlChannel {
    /// Takes ownership of an already-connected descriptor handed to us by
    /// the external service.
    pub fn from_raw_fd(fd: RawFd) -> Self {
        let socket = unsafe { UnixDatagram::from_raw_fd(fd) };
        ControlChannel { socket }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        use std::os::unix::io::AsRawFd;
        self.socket.as_raw_fd()
    }

    /// Send `cmd` and wait up to `timeout` for `"OK"`.
    ///
    /// If the wait is interrupted by a signal we retry the *wait*, not
    /// the send - the command has already gone out (spec §4.8).
    pub fn send_and_wait(&self, cmd: Command, timeout: Duration) -> Result<(), ControlError> {
        self.send(cmd)?;
        self.wait_reply(timeout)
    }

    /// Send `cmd` without waiting for a reply at all. Used by `stop()`,
    /// which sends Drop and tears the engine down regardless of whether
    /// the server ever answers.
    pub fn send(&self, cmd: Command) -> Result<(), ControlError> {
        self.socket.send(cmd.as_bytes())?;
        Ok(())
    }

    fn wait_reply(&self, timeout: Duration) -> Result<(), ControlError> {
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buf = [0u8; 256];

        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    let reply = &buf[..n];
                    if reply == b"OK" {
                        return Ok(());
                    }
                    return Err(ControlError::Remote(String::from_utf8_lossy(reply).into_owned()));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut => {
                    return Err(ControlError::Timeout);
                }
                Err(e) => return Err(ControlError::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::io::IntoRawFd;

    fn loopback_pair() -> (ControlChannel, UnixDatagram) {
        let (a, b) = UnixDatagram::pair().unwrap();
        (ControlChannel::from_raw_fd(a.into_raw_fd()), b)
    }

    #[test]
    fn send_and_wait_success() {
        let (client, server) = loopback_pair();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let n = server.recv(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"Pause");
            server.send(b"OK").unwrap();
        });

        client.send_and_wait(Command::Pause, Duration::from_secs(1)).unwrap();
        responder.join().unwrap();
    }

    #[test]
    fn send_and_wait_remote_error() {
        let (client, server) = loopback_pair();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let _ = server.recv(&mut buf).unwrap();
            server.send(b"no such stream").unwrap();
        });

        let err = client.send_and_wait(Command::Drain, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ControlError::Remote(_)));
        responder.join().unwrap();
    }

    #[test]
    fn send_and_wait_times_out() {
        let (client, _server) = loopback_pair();
        let err = client.send_and_wait(Command::Resume, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ControlError::Timeout));
    }
}
