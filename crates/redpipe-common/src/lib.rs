//! redpipe Protocol Layer
//!
//! This crate provides the protocol types and the RESP wire codec shared by
//! all redpipe components.
//!
//! # Overview
//!
//! Redis speaks RESP, a line-oriented binary protocol: a request is an array
//! of bulk strings, a reply is one of five framed value kinds. This crate
//! owns both directions:
//!
//! - **Protocol Layer**: [`RespValue`] replies, [`Command`] requests with
//!   their [`Expectation`] tags, and the [`ProtocolError`] type.
//! - **Codec Layer**: deterministic command/reply encoding and an
//!   incremental [`ReplyDecoder`] that reassembles replies from arbitrary
//!   byte chunks.
//!
//! # Components
//!
//! - [`protocol`] - Core protocol types (`Command`, `RespValue`, errors)
//! - [`codec`] - Encoding and incremental decoding of RESP frames
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use redpipe_common::{Command, Expectation, RespValue};
//! use redpipe_common::codec::{encode_command, ReplyDecoder};
//!
//! let command = Command::new(["GET", "foo"], Expectation::Bulk);
//!
//! let mut wire = BytesMut::new();
//! encode_command(&command, &mut wire);
//! assert_eq!(&wire[..], b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
//!
//! let mut decoder = ReplyDecoder::new();
//! let mut replies = Vec::new();
//! decoder.feed(b"$3\r\nbar\r\n", |value| replies.push(value)).unwrap();
//! assert_eq!(replies.len(), 1);
//! assert!(matches!(replies[0], RespValue::Bulk(Some(_))));
//! ```

pub mod codec;
pub mod protocol;

pub use protocol::{Command, Expectation, ProtocolError, RespValue, Result};
