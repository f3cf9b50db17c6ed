//! Reusable WRP encoders and decoders
//!
//! Each codec object owns a scratch buffer that survives between operations, which is
//! what makes pooling them worthwhile. The buffer is cleared at the start of every
//! operation, so a failed encode or decode never leaks state into the next one.

use std::io::{Read, Write};

use super::message::{Format, Message};

/// Codec error types
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{format} encode error: {message}")]
    Encode { format: Format, message: String },

    #[error("{format} decode error: {message}")]
    Decode { format: Format, message: String },

    #[error("Unrecognized wire format: {0}")]
    UnknownFormat(String),
}

impl CodecError {
    fn encode(format: Format, cause: impl std::fmt::Display) -> Self {
        CodecError::Encode {
            format,
            message: cause.to_string(),
        }
    }

    fn decode(format: Format, cause: impl std::fmt::Display) -> Self {
        CodecError::Decode {
            format,
            message: cause.to_string(),
        }
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes messages in one wire format
#[derive(Debug)]
pub struct Encoder {
    format: Format,
    buffer: Vec<u8>,
}

impl Encoder {
    pub fn new(format: Format, initial_buffer_size: usize) -> Self {
        Self {
            format,
            buffer: Vec::with_capacity(initial_buffer_size),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Encode `message` and write the result to `output`
    pub fn encode<W: Write>(&mut self, message: &Message, mut output: W) -> CodecResult<()> {
        self.fill(message)?;
        output
            .write_all(&self.buffer)
            .map_err(|e| CodecError::encode(self.format, e))
    }

    /// Encode `message` into a freshly allocated byte vector
    pub fn encode_bytes(&mut self, message: &Message) -> CodecResult<Vec<u8>> {
        self.fill(message)?;
        Ok(self.buffer.clone())
    }

    fn fill(&mut self, message: &Message) -> CodecResult<()> {
        self.buffer.clear();
        match self.format {
            Format::Msgpack => rmp_serde::encode::write_named(&mut self.buffer, message)
                .map_err(|e| CodecError::encode(self.format, e)),
            Format::Json => serde_json::to_writer(&mut self.buffer, message)
                .map_err(|e| CodecError::encode(self.format, e)),
        }
    }
}

/// Decodes messages in one wire format
#[derive(Debug)]
pub struct Decoder {
    format: Format,
    buffer: Vec<u8>,
}

impl Decoder {
    pub fn new(format: Format, initial_buffer_size: usize) -> Self {
        Self {
            format,
            buffer: Vec::with_capacity(initial_buffer_size),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Read `input` to its end and decode it into `target`.
    ///
    /// `target` is left untouched when decoding fails.
    pub fn decode<R: Read>(&mut self, target: &mut Message, mut input: R) -> CodecResult<()> {
        self.buffer.clear();
        input
            .read_to_end(&mut self.buffer)
            .map_err(|e| CodecError::decode(self.format, e))?;

        *target = from_slice(self.format, &self.buffer)?;
        Ok(())
    }

    /// Decode `bytes` into `target`
    pub fn decode_bytes(&mut self, target: &mut Message, bytes: &[u8]) -> CodecResult<()> {
        *target = from_slice(self.format, bytes)?;
        Ok(())
    }
}

fn from_slice(format: Format, bytes: &[u8]) -> CodecResult<Message> {
    match format {
        Format::Msgpack => rmp_serde::from_slice(bytes).map_err(|e| CodecError::decode(format, e)),
        Format::Json => serde_json::from_slice(bytes).map_err(|e| CodecError::decode(format, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message::simple_event("mac:11112222333", "foobar.com/test", "codec test")
            .with_transaction_uuid("c2bb1f16-09c8-11e7-93ae-92361f002671")
            .with_content_type("text/plain")
            .with_header("X-Webpa-Test: true")
            .with_metadata("/boot-time", "1489695318")
    }

    #[test]
    fn test_round_trip_both_formats() {
        for format in [Format::Msgpack, Format::Json] {
            let original = sample_message();
            let mut encoder = Encoder::new(format, 64);
            let mut decoder = Decoder::new(format, 64);

            let encoded = encoder.encode_bytes(&original).unwrap();
            let mut decoded = Message::default();
            decoder.decode_bytes(&mut decoded, &encoded).unwrap();

            assert_eq!(original, decoded, "round trip failed for {}", format);
        }
    }

    #[test]
    fn test_encode_to_writer_matches_bytes() {
        let message = sample_message();
        let mut encoder = Encoder::new(Format::Msgpack, 0);

        let mut output = Vec::new();
        encoder.encode(&message, &mut output).unwrap();
        let bytes = encoder.encode_bytes(&message).unwrap();

        assert!(!output.is_empty());
        assert_eq!(output, bytes);
    }

    #[test]
    fn test_decode_error_leaves_target_untouched() {
        let mut decoder = Decoder::new(Format::Json, 16);
        let mut target = sample_message();

        let err = decoder
            .decode(&mut target, &b"{not json"[..])
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode { format: Format::Json, .. }));
        assert_eq!(target, sample_message());
    }

    #[test]
    fn test_decoder_reusable_after_error() {
        let message = sample_message();
        let encoded = Encoder::new(Format::Msgpack, 0)
            .encode_bytes(&message)
            .unwrap();

        let mut decoder = Decoder::new(Format::Msgpack, 0);
        let mut target = Message::default();
        assert!(decoder.decode(&mut target, &[0xc1u8, 0x00][..]).is_err());

        decoder.decode(&mut target, encoded.as_slice()).unwrap();
        assert_eq!(target, message);
    }

    #[test]
    fn test_formats_are_not_interchangeable() {
        let encoded = Encoder::new(Format::Msgpack, 0)
            .encode_bytes(&sample_message())
            .unwrap();

        let mut target = Message::default();
        let result = Decoder::new(Format::Json, 0).decode_bytes(&mut target, &encoded);
        assert!(result.is_err());
    }
}
