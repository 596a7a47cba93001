//! Streaming compression for log payloads.
//!
//! Compressed lines are raw deflate, sync-flushed at the end of every line
//! and wrapped in base64 so they stay on one printable line. Compressor and
//! decompressor each run as a single stream across the whole file, so later
//! lines can back-reference text from earlier ones.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use thiserror::Error;

/// Every sync flush ends with an empty stored block.
const SYNC_MARKER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

const MIN_CHUNK: usize = 256;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid payload envelope: {0}")]
    Envelope(#[from] base64::DecodeError),

    #[error("Payload is truncated (no sync marker)")]
    Truncated,

    #[error("Inflate failed: {0}")]
    Inflate(#[from] flate2::DecompressError),

    #[error("Deflate failed: {0}")]
    Deflate(#[from] flate2::CompressError),

    #[error("Payload is not valid UTF-8")]
    NotUtf8(#[from] std::string::FromUtf8Error),
}

/// Shared compression state for one log file.
///
/// The decode half tracks what a reader has seen so far; the encode half is
/// what a writer appends with. After a replay has fed every decoded payload
/// through [`CompressionContext::prime`], both halves hold the same history
/// and new appends keep sharing the window with the replayed text.
pub struct CompressionContext {
    compress: Compress,
    decompress: Decompress,
    level: Compression,
}

impl Default for CompressionContext {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl std::fmt::Debug for CompressionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionContext")
            .field("level", &self.level.level())
            .field("encoded_in", &self.compress.total_in())
            .field("decoded_out", &self.decompress.total_out())
            .finish()
    }
}

impl CompressionContext {
    pub fn new(level: Compression) -> Self {
        Self {
            compress: Compress::new(level, false),
            decompress: Decompress::new(false),
            level,
        }
    }

    /// Forget all history on both halves.
    pub fn reset(&mut self) {
        self.compress.reset();
        self.decompress.reset(false);
    }

    /// Compress `data` as the next line of the stream and wrap it in the
    /// text envelope.
    pub fn encode(&mut self, data: &[u8]) -> Result<String, CodecError> {
        let deflated = self.deflate(data)?;
        Ok(STANDARD.encode(deflated))
    }

    /// Feed already-written plain bytes through the compressor so later
    /// [`encode`](Self::encode) calls can reference them. The output is
    /// discarded.
    pub fn prime(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.deflate(data).map(drop)
    }

    /// Unwrap and inflate one encoded line.
    ///
    /// Envelope and truncation errors are caught before the decompressor
    /// sees any input, so a damaged line does not poison the stream state.
    pub fn decode(&mut self, text: &str) -> Result<Vec<u8>, CodecError> {
        let input = STANDARD.decode(text.trim())?;
        if !input.ends_with(&SYNC_MARKER) {
            return Err(CodecError::Truncated);
        }
        self.inflate(&input)
    }

    /// [`decode`](Self::decode) followed by UTF-8 validation.
    pub fn decode_str(&mut self, text: &str) -> Result<String, CodecError> {
        Ok(String::from_utf8(self.decode(text)?)?)
    }

    fn deflate(&mut self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(data.len() / 2 + MIN_CHUNK);
        let mut consumed = 0;
        loop {
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(MIN_CHUNK));
            }
            let before = self.compress.total_in();
            self.compress
                .compress_vec(&data[consumed..], &mut out, FlushCompress::Sync)?;
            consumed += (self.compress.total_in() - before) as usize;

            // The flush is complete once the compressor stops filling the buffer.
            if consumed == data.len() && out.len() < out.capacity() {
                return Ok(out);
            }
        }
    }

    fn inflate(&mut self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(input.len() * 3 + MIN_CHUNK);
        let mut consumed = 0;
        loop {
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(MIN_CHUNK));
            }
            let (in_before, out_before) = (self.decompress.total_in(), self.decompress.total_out());
            let status = self.decompress.decompress_vec(
                &input[consumed..],
                &mut out,
                FlushDecompress::Sync,
            )?;
            let read = (self.decompress.total_in() - in_before) as usize;
            let wrote = self.decompress.total_out() - out_before;
            consumed += read;

            if status == Status::StreamEnd {
                return Ok(out);
            }
            if consumed == input.len() && out.len() < out.capacity() {
                return Ok(out);
            }
            if read == 0 && wrote == 0 && out.len() < out.capacity() {
                return Err(CodecError::Truncated);
            }
        }
    }
}
