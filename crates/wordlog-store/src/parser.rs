//! Line grammar: `T<seconds>[Z] <payload>`.
//!
//! A `Z` glued to the timestamp token means the payload is a compressed
//! envelope; otherwise the payload is literal text.

use std::io::{self, BufRead};

use serde::Serialize;
use tracing::warn;

use crate::codec::CompressionContext;
use crate::timestamp;
use crate::warning::{CorruptRun, Warning, WarningSink};

pub const COMPRESSED_MARKER: char = 'Z';

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLine {
    /// `None` when the line had no usable timestamp.
    pub offset: Option<f64>,
    pub compressed: bool,
    /// The compressed payload could not be decoded; `payload` holds the
    /// still-encoded text.
    pub corrupt: bool,
    pub payload: String,
}

impl ParsedLine {
    fn unparsed(raw: &str) -> Self {
        Self {
            offset: None,
            compressed: false,
            corrupt: false,
            payload: raw.to_string(),
        }
    }

    /// Whether this is an intact, timestamped line.
    pub fn is_usable(&self) -> bool {
        self.offset.is_some() && !self.corrupt
    }
}

/// Format a complete line, without the trailing newline.
pub fn format_line(offset: f64, compressed: bool, payload: &str) -> String {
    let stamp = timestamp::encode(offset);
    if compressed {
        format!("{stamp}{COMPRESSED_MARKER} {payload}")
    } else {
        format!("{stamp} {payload}")
    }
}

/// Parses lines of one file in order.
///
/// Compressed lines must be fed in file order since they share one
/// decompression stream.
pub struct LineParser<'a> {
    codec: &'a mut CompressionContext,
    prime: bool,
    corrupt: CorruptRun,
}

impl<'a> LineParser<'a> {
    pub fn new(codec: &'a mut CompressionContext) -> Self {
        Self {
            codec,
            prime: false,
            corrupt: CorruptRun::default(),
        }
    }

    /// Also feed decoded payloads to the codec's compressor, so a writer
    /// appending after this pass continues the same window.
    pub fn priming(mut self, prime: bool) -> Self {
        self.prime = prime;
        self
    }

    pub fn parse(&mut self, line: usize, raw: &str, sink: &mut dyn WarningSink) -> ParsedLine {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.trim().is_empty() {
            return ParsedLine::unparsed(raw);
        }

        let (token, rest) = raw.split_once(' ').unwrap_or((raw, ""));
        if !token.starts_with(timestamp::PREFIX) {
            sink.warn(Warning::MissingTimestamp {
                line,
                raw: raw.to_string(),
            });
            return ParsedLine::unparsed(raw);
        }

        let (stamp, compressed) = match token.strip_suffix(COMPRESSED_MARKER) {
            Some(stamp) => (stamp, true),
            None => (token, false),
        };
        let offset = match timestamp::decode(stamp) {
            Ok(offset) => offset,
            Err(_) => {
                sink.warn(Warning::MalformedTimestamp {
                    line,
                    token: token.to_string(),
                });
                return ParsedLine::unparsed(raw);
            }
        };

        if !compressed {
            self.corrupt.end(sink);
            return ParsedLine {
                offset: Some(offset),
                compressed: false,
                corrupt: false,
                payload: rest.to_string(),
            };
        }

        match self.decode(rest) {
            Ok(payload) => {
                self.corrupt.end(sink);
                ParsedLine {
                    offset: Some(offset),
                    compressed: true,
                    corrupt: false,
                    payload,
                }
            }
            Err(error) => {
                self.corrupt.failed(sink, line, error);
                ParsedLine {
                    offset: Some(offset),
                    compressed: true,
                    corrupt: true,
                    payload: rest.to_string(),
                }
            }
        }
    }

    /// Flush any pending corrupt-run summary. Call once after the last line.
    pub fn finish(mut self, sink: &mut dyn WarningSink) {
        self.corrupt.end(sink);
    }

    fn decode(&mut self, encoded: &str) -> Result<String, String> {
        let bytes = self.codec.decode(encoded).map_err(|e| e.to_string())?;
        if self.prime {
            // The inflater has already taken these bytes into its window,
            // valid UTF-8 or not; the compressor must see the same history.
            if let Err(e) = self.codec.prime(&bytes) {
                warn!(error = %e, "Failed to prime compressor from replayed line");
            }
        }
        String::from_utf8(bytes).map_err(|e| e.to_string())
    }
}

/// A physical line read from a log file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// 1-based.
    pub number: usize,
    pub text: String,
    /// Whether the line ended in `\n`. Only the final line can lack one.
    pub terminated: bool,
}

/// Iterates the physical lines of a reader. Invalid UTF-8 is replaced
/// rather than failing the read.
pub struct RawLines<R> {
    reader: R,
    number: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> RawLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            number: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for RawLines<R> {
    type Item = io::Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.number += 1;
                let terminated = self.buf.last() == Some(&b'\n');
                if terminated {
                    self.buf.pop();
                }
                Some(Ok(RawLine {
                    number: self.number,
                    text: String::from_utf8_lossy(&self.buf).into_owned(),
                    terminated,
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
