pub mod config;
pub mod error;
pub mod pcm;
pub mod sco;

pub use error::PcmError;
pub use pcm::Pcm;
