//! WRP message encoding
//!
//! This module binds the WRP `Message` to its two wire formats and pools the
//! encoder/decoder objects:
//! - MessagePack: the binary format, payload carried as `bin`
//! - JSON: the text format, payload carried as base64

pub mod codec;
pub mod message;
pub mod pool;

pub use codec::{CodecError, CodecResult, Decoder, Encoder};
pub use message::{Format, Message, MessageType};
pub use pool::{DecoderPool, EncoderPool};
