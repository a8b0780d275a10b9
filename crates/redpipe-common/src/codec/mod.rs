//! RESP Wire Codec
//!
//! Encoding and decoding of RESP frames.
//!
//! # Wire Format
//!
//! A command with arguments `a1..an` is sent as an array of bulk strings:
//!
//! ```text
//! *n\r\n  then per argument:  $len\r\n  bytes  \r\n
//! ```
//!
//! A reply frame is selected by its first byte: `+` simple string, `-`
//! error, `:` integer, `$` bulk string, `*` array. Lengths and counts are
//! ASCII decimal; `-1` marks null bulks and null arrays. The line
//! terminator is always CRLF.
//!
//! # Components
//!
//! - [`encode_command`] / [`encode_value`] - deterministic frame encoding
//! - [`ReplyDecoder`] - incremental decoding of a reply byte stream, with
//!   support for frames split across arbitrary chunk boundaries

pub mod decoder;
pub mod encode;

pub use decoder::ReplyDecoder;
pub use encode::{encode_command, encode_value};
