//! Incremental reply decoding.
//!
//! A TCP stream delivers reply frames in arbitrary chunks: a frame may be
//! split inside a length header, inside bulk payload bytes, or between CR
//! and LF, and a single chunk may also carry several complete frames when
//! the server answers a pipelined burst. [`ReplyDecoder`] absorbs chunks in
//! arrival order and emits every completed reply exactly once, in order.
//!
//! Parsing is driven by an explicit stack instead of recursion, so nesting
//! depth is bounded by [`MAX_ARRAY_DEPTH`] rather than the thread stack.
//! Partial progress survives across chunks: completed header lines are
//! consumed from the buffer and recorded as stack frames, so only the bytes
//! of the frame currently being assembled are retained.

use bytes::{Bytes, BytesMut};

use crate::protocol::{ProtocolError, RespValue, Result};

/// Array nesting deeper than this fails with
/// [`ProtocolError::MalformedFrame`].
pub const MAX_ARRAY_DEPTH: usize = 128;

/// Bulk payloads above this size fail with [`ProtocolError::BadLength`].
/// Matches the server's default `proto-max-bulk-len`.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// One unfinished frame on the parse stack.
enum Frame {
    /// A bulk header was read; waiting for `len` payload bytes plus CRLF.
    AwaitBulk { len: usize },
    /// An array header was read; collecting its remaining elements.
    AwaitArray { remaining: usize, items: Vec<RespValue> },
}

/// Stateful reply reconstructor.
///
/// Feed it byte chunks as they arrive; it invokes the sink once per
/// completed reply, in arrival order, and retains left-over bytes for the
/// next call. The first decode error poisons the decoder permanently:
/// the stream position can no longer be trusted, so the owning connection
/// must tear down.
///
/// # Example
///
/// ```
/// use redpipe_common::codec::ReplyDecoder;
/// use redpipe_common::RespValue;
///
/// let mut decoder = ReplyDecoder::new();
/// let mut out = Vec::new();
/// decoder.feed(b"$5\r", |v| out.push(v)).unwrap();
/// decoder.feed(b"\nhel", |v| out.push(v)).unwrap();
/// decoder.feed(b"lo\r\n", |v| out.push(v)).unwrap();
/// assert_eq!(out.len(), 1);
/// assert!(matches!(&out[0], RespValue::Bulk(Some(b)) if &b[..] == b"hello"));
/// ```
pub struct ReplyDecoder {
    buf: BytesMut,
    stack: Vec<Frame>,
    poisoned: bool,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4 * 1024),
            stack: Vec::new(),
            poisoned: false,
        }
    }

    /// Whether an earlier decode error has poisoned this decoder.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Bytes buffered but not yet consumed by a completed frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Absorbs one chunk and emits every reply it completes.
    ///
    /// The sink is called exactly once per completed reply, in order. On
    /// error the decoder is poisoned and every later call fails fast with
    /// [`ProtocolError::Poisoned`].
    pub fn feed<F>(&mut self, chunk: &[u8], mut sink: F) -> Result<()>
    where
        F: FnMut(RespValue),
    {
        if self.poisoned {
            return Err(ProtocolError::Poisoned);
        }
        self.buf.extend_from_slice(chunk);
        match self.drain(&mut sink) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    /// Drives the state machine as far as the buffered bytes allow.
    fn drain<F>(&mut self, sink: &mut F) -> Result<()>
    where
        F: FnMut(RespValue),
    {
        loop {
            if let Some(Frame::AwaitBulk { len }) = self.stack.last() {
                let len = *len;
                if self.buf.len() < len + 2 {
                    return Ok(());
                }
                let payload = self.buf.split_to(len).freeze();
                let terminator = self.buf.split_to(2);
                if &terminator[..] != b"\r\n" {
                    return Err(ProtocolError::UnexpectedTerminator);
                }
                self.stack.pop();
                self.complete(RespValue::Bulk(Some(payload)), sink);
                continue;
            }

            let line = match self.take_line()? {
                Some(line) => line,
                None => return Ok(()),
            };
            let Some((&kind, rest)) = line.split_first() else {
                return Err(ProtocolError::MalformedFrame);
            };
            match kind {
                b'+' => self.complete(RespValue::Simple(line_text(rest)?), sink),
                b'-' => self.complete(RespValue::Error(line_text(rest)?), sink),
                b':' => {
                    let n = parse_decimal(rest).ok_or(ProtocolError::MalformedFrame)?;
                    self.complete(RespValue::Integer(n), sink);
                }
                b'$' => match parse_length(rest)? {
                    -1 => self.complete(RespValue::Bulk(None), sink),
                    len if len > MAX_BULK_LEN => return Err(ProtocolError::BadLength),
                    len => self.stack.push(Frame::AwaitBulk { len: len as usize }),
                },
                b'*' => match parse_length(rest)? {
                    -1 => self.complete(RespValue::Array(None), sink),
                    0 => self.complete(RespValue::Array(Some(Vec::new())), sink),
                    count => {
                        if self.stack.len() >= MAX_ARRAY_DEPTH {
                            return Err(ProtocolError::MalformedFrame);
                        }
                        self.stack.push(Frame::AwaitArray {
                            remaining: count as usize,
                            items: Vec::with_capacity((count as usize).min(1024)),
                        });
                    }
                },
                _ => return Err(ProtocolError::MalformedFrame),
            }
        }
    }

    /// Consumes one CRLF-terminated line, terminator excluded.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. A bare LF is
    /// rejected; a chunk boundary between CR and LF simply leaves the CR
    /// buffered until the LF arrives.
    fn take_line(&mut self) -> Result<Option<Bytes>> {
        match self.buf.iter().position(|&b| b == b'\n') {
            None => Ok(None),
            Some(0) => Err(ProtocolError::UnexpectedTerminator),
            Some(at) => {
                if self.buf[at - 1] != b'\r' {
                    return Err(ProtocolError::UnexpectedTerminator);
                }
                let mut line = self.buf.split_to(at + 1);
                line.truncate(at - 1);
                Ok(Some(line.freeze()))
            }
        }
    }

    /// Folds a finished value into its enclosing arrays, emitting it when
    /// the stack runs empty.
    fn complete<F>(&mut self, value: RespValue, sink: &mut F)
    where
        F: FnMut(RespValue),
    {
        let mut value = value;
        loop {
            match self.stack.last_mut() {
                None => {
                    sink(value);
                    return;
                }
                Some(Frame::AwaitArray { remaining, items }) => {
                    items.push(value);
                    *remaining -= 1;
                    if *remaining > 0 {
                        return;
                    }
                    match self.stack.pop() {
                        Some(Frame::AwaitArray { items, .. }) => {
                            value = RespValue::Array(Some(items));
                        }
                        _ => return,
                    }
                }
                // Bulk frames are resolved before their value completes.
                Some(Frame::AwaitBulk { .. }) => return,
            }
        }
    }
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple strings and errors are UTF-8 by protocol convention.
fn line_text(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::MalformedFrame)
}

/// Parses a bulk/array length, admitting `-1` as the null marker.
fn parse_length(raw: &[u8]) -> Result<i64> {
    match parse_decimal(raw) {
        Some(n) if n >= -1 => Ok(n),
        _ => Err(ProtocolError::BadLength),
    }
}

/// Parses a signed ASCII decimal without intermediate overflow, so the full
/// `i64` range round-trips (including `i64::MIN`).
fn parse_decimal(raw: &[u8]) -> Option<i64> {
    let (negative, digits) = match raw.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, raw),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_sub((b - b'0') as i64)?;
    }
    if negative {
        Some(value)
    } else {
        value.checked_neg()
    }
}
