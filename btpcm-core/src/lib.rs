pub mod clock;
pub mod delay;
pub mod drain;
pub mod engine;
pub mod geometry;
pub mod hwcompat;
pub mod idle;
pub mod pause;
pub mod poll;
pub mod ring;

pub use delay::{DelayEstimator, DelayOutcome};
pub use drain::{drain_playback, DrainError, DrainOutcome};
pub use engine::{EngineError, TransferEngine};
pub use geometry::PcmGeometry;
pub use pause::PauseCoordinator;
pub use poll::{poll_revents, PollDispatch, RevEvents};
pub use ring::{RingBuffer, RingStorage};
