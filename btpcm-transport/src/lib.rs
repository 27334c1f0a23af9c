pub mod control;
pub mod event;
pub mod fifo;
pub mod transport;

pub use control::{Command, ControlChannel, ControlError};
pub use event::EventDescriptor;
pub use fifo::{Fifo, FifoChannel, FifoError, NullSink};
pub use transport::{PropertyService, Transport};
