//! Client-facing wire formats. A connection picks one codec with its first byte and keeps it.
mod binary;
mod codec;
mod error;
mod json;
mod message;

pub use codec::CodecKind;
pub use codec::MessageCodec;
pub use error::DecodeError;
pub use error::EncodeError;
pub use error::FrameError;
pub use message::WireMessage;

pub(crate) use binary::MAX_BODY as MAX_BODY_LEN;
pub(crate) use codec::read_codec_selector;
pub(crate) use codec::write_codec_selector;
