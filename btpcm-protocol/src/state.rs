/// Which way frames flow between the ring buffer and the FIFO.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

/// Pause handshake state, shared between the application thread and the
/// transfer thread under a mutex + condvar (spec §3, §4.3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PauseState {
    Running,
    /// Application has asked to pause; transfer thread hasn't parked yet.
    Pending,
    /// Transfer thread has parked and is waiting for a resume wake.
    Paused,
}

/// FIFO hardware-compatibility mode (spec §4.4).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum HwCompat {
    #[default]
    None,
    Busy,
    Silence,
}

impl std::str::FromStr for HwCompat {
    type Err = UnknownHwCompat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(HwCompat::None),
            "busy" => Ok(HwCompat::Busy),
            "silence" => Ok(HwCompat::Silence),
            _ => Err(UnknownHwCompat(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown hwcompat mode: {0:?} (expected none, busy or silence)")]
pub struct UnknownHwCompat(String);

/// The host framework's view of PCM lifecycle state (spec §4.5, §7).
///
/// Hardware-parameter negotiation itself is an external collaborator; this
/// enum only captures the states the engine needs to branch on for poll
/// dispatch, delay reporting and error surfacing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    Xrun,
    Draining,
    Paused,
    Suspended,
    Disconnected,
}
