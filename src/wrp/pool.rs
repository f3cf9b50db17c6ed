//! Bounded pools of encoders and decoders
//!
//! A pool never blocks: an empty pool allocates a fresh codec, a full pool drops the
//! returned one. The idle store holds at most `capacity` instances.

use parking_lot::Mutex;
use std::io::{Read, Write};
use tracing::trace;

use super::codec::{CodecResult, Decoder, Encoder};
use super::message::{Format, Message};
use crate::config::CodecPoolConfig;

/// Something a pool can construct on demand
trait Reusable: Send {
    fn create(format: Format, initial_buffer_size: usize) -> Self;
}

impl Reusable for Encoder {
    fn create(format: Format, initial_buffer_size: usize) -> Self {
        Encoder::new(format, initial_buffer_size)
    }
}

impl Reusable for Decoder {
    fn create(format: Format, initial_buffer_size: usize) -> Self {
        Decoder::new(format, initial_buffer_size)
    }
}

#[derive(Debug)]
struct Pool<T> {
    format: Format,
    initial_buffer_size: usize,
    capacity: usize,
    idle: Mutex<Vec<T>>,
}

impl<T: Reusable> Pool<T> {
    fn new(capacity: usize, initial_buffer_size: usize, format: Format) -> Self {
        let idle = (0..capacity)
            .map(|_| T::create(format, initial_buffer_size))
            .collect::<Vec<_>>();

        Self {
            format,
            initial_buffer_size,
            capacity,
            idle: Mutex::new(idle),
        }
    }

    fn get(&self) -> T {
        let reused = self.idle.lock().pop();
        match reused {
            Some(item) => item,
            None => {
                trace!(format = %self.format, "codec pool exhausted, allocating");
                T::create(self.format, self.initial_buffer_size)
            }
        }
    }

    fn put(&self, item: T) {
        let rejected = {
            let mut idle = self.idle.lock();
            if idle.len() < self.capacity {
                idle.push(item);
                None
            } else {
                Some(item)
            }
        };

        if rejected.is_some() {
            trace!(format = %self.format, capacity = self.capacity, "codec pool full, discarding");
        }
    }

    fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// A pool of [`Encoder`]s bound to one format
#[derive(Debug)]
pub struct EncoderPool {
    pool: Pool<Encoder>,
}

impl EncoderPool {
    /// Create a pool holding up to `capacity` encoders.
    ///
    /// A capacity of 0 disables caching: every `get` allocates and every `put` discards.
    pub fn new(capacity: usize, initial_buffer_size: usize, format: Format) -> Self {
        Self {
            pool: Pool::new(capacity, initial_buffer_size, format),
        }
    }

    pub fn from_config(config: &CodecPoolConfig) -> Self {
        Self::new(config.pool_size, config.initial_buffer_size, config.format)
    }

    pub fn format(&self) -> Format {
        self.pool.format
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity
    }

    pub fn initial_buffer_size(&self) -> usize {
        self.pool.initial_buffer_size
    }

    /// Number of encoders currently idle in the pool
    pub fn idle(&self) -> usize {
        self.pool.idle()
    }

    /// Take an encoder, allocating one when the pool is empty
    pub fn get(&self) -> Encoder {
        self.pool.get()
    }

    /// Return an encoder; dropped silently when the pool is full
    pub fn put(&self, encoder: Encoder) {
        self.pool.put(encoder)
    }

    /// Encode `message` onto `output` using a pooled encoder
    pub fn encode<W: Write>(&self, output: W, message: &Message) -> CodecResult<()> {
        let mut encoder = self.get();
        let result = encoder.encode(message, output);
        self.put(encoder);
        result
    }

    /// Encode `message` into a new byte vector using a pooled encoder
    pub fn encode_bytes(&self, message: &Message) -> CodecResult<Vec<u8>> {
        let mut encoder = self.get();
        let result = encoder.encode_bytes(message);
        self.put(encoder);
        result
    }
}

/// A pool of [`Decoder`]s bound to one format
#[derive(Debug)]
pub struct DecoderPool {
    pool: Pool<Decoder>,
}

impl DecoderPool {
    /// Create a pool holding up to `capacity` decoders.
    ///
    /// A capacity of 0 disables caching: every `get` allocates and every `put` discards.
    pub fn new(capacity: usize, initial_buffer_size: usize, format: Format) -> Self {
        Self {
            pool: Pool::new(capacity, initial_buffer_size, format),
        }
    }

    pub fn from_config(config: &CodecPoolConfig) -> Self {
        Self::new(config.pool_size, config.initial_buffer_size, config.format)
    }

    pub fn format(&self) -> Format {
        self.pool.format
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity
    }

    pub fn initial_buffer_size(&self) -> usize {
        self.pool.initial_buffer_size
    }

    /// Number of decoders currently idle in the pool
    pub fn idle(&self) -> usize {
        self.pool.idle()
    }

    /// Take a decoder, allocating one when the pool is empty
    pub fn get(&self) -> Decoder {
        self.pool.get()
    }

    /// Return a decoder; dropped silently when the pool is full
    pub fn put(&self, decoder: Decoder) {
        self.pool.put(decoder)
    }

    /// Decode everything `input` yields into `target`
    pub fn decode<R: Read>(&self, target: &mut Message, input: R) -> CodecResult<()> {
        let mut decoder = self.get();
        let result = decoder.decode(target, input);
        self.put(decoder);
        result
    }

    /// Decode `bytes` into `target`
    pub fn decode_bytes(&self, target: &mut Message, bytes: &[u8]) -> CodecResult<()> {
        let mut decoder = self.get();
        let result = decoder.decode_bytes(target, bytes);
        self.put(decoder);
        result
    }

    /// Decode everything `input` yields into a new message
    pub fn decode_message<R: Read>(&self, input: R) -> CodecResult<Message> {
        let mut message = Message::default();
        self.decode(&mut message, input)?;
        Ok(message)
    }

    /// Decode `bytes` into a new message
    pub fn decode_message_bytes(&self, bytes: &[u8]) -> CodecResult<Message> {
        let mut message = Message::default();
        self.decode_bytes(&mut message, bytes)?;
        Ok(message)
    }
}
