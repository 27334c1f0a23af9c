use btpcm_codec::FramerError;
use btpcm_core::{DrainError, EngineError};
use btpcm_protocol::config::ConfigError;
use btpcm_transport::{ControlError, FifoError};

/// The error taxonomy surfaced across the PCM lifecycle (spec §7),
/// aggregating each lower-level crate's own error type the way
/// `bark::RunError` aggregates `ListenError` and the `cpal` errors.
#[derive(Debug, thiserror::Error)]
pub enum PcmError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("device busy")]
    DeviceBusy,

    #[error("no such device (transport gone)")]
    TransportGone,

    #[error("buffer overrun/underrun")]
    Overrun,

    #[error("protocol timeout")]
    ProtocolTimeout,

    #[error("fifo i/o error: {0}")]
    Fifo(#[from] FifoError),

    #[error("control channel error: {0}")]
    Control(#[from] ControlError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("drain error: {0}")]
    Drain(#[from] DrainError),

    #[error("codec framing error: {0}")]
    Framer(#[from] FramerError),

    #[error("operation not valid in current state")]
    BadState,
}

impl PcmError {
    /// Classify a control-channel failure into the named error kinds the
    /// spec distinguishes (§7), rather than always falling back to the
    /// generic `Engine` wrapper.
    pub(crate) fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Disconnected => PcmError::TransportGone,
            EngineError::Control(ControlError::Timeout) => PcmError::ProtocolTimeout,
            EngineError::Control(inner) => PcmError::Control(inner),
        }
    }
}
