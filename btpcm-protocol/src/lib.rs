pub mod config;
pub mod format;
pub mod state;
pub mod time;

pub use config::PcmConfig;
pub use format::SampleFormat;
pub use state::{Direction, HwCompat, PauseState, PcmState};
pub use time::{SampleDuration, SampleRate, TimestampMicros};
