//! Protocol module containing message types, the stream framer, and the binary codec.

pub mod codec;
pub mod framer;
pub mod messages;

pub use codec::{decode_frame, decode_message, encode_command, ProtocolError};
pub use framer::{encode_frame, FeedOutput, FrameCodec};
pub use messages::*;
