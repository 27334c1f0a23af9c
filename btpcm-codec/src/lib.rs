pub mod esco;
pub mod h2;
pub mod plc;

pub use esco::{CodecError, EscoCodecKind, EscoDecoder, EscoEncoder, FramerError, PayloadCodec};
pub use h2::H2Header;
pub use plc::{PacketLossConcealment, RepeatLastFrame};
