//! redpipe Protocol Definitions
//!
//! This module defines the core protocol types: requests ([`Command`]),
//! replies ([`RespValue`]) and the protocol-level error type.
//!
//! # Reply Model
//!
//! A RESP reply is one of five kinds, selected by the first byte of the
//! frame: `+` simple string, `-` error, `:` integer, `$` bulk string, `*`
//! array. Bulk strings and arrays have null forms (`$-1`, `*-1`) which are
//! modelled as `None`.
//!
//! # Expectation Tags
//!
//! Every [`Command`] carries an [`Expectation`] describing the reply shape
//! a well-behaved server produces for it. The tag is part of the command's
//! static identity: typed reply extractors match on it at the API boundary
//! instead of guessing from the reply at runtime.

pub mod command;
pub mod error;
pub mod value;

pub use command::{Command, Expectation};
pub use error::{ProtocolError, Result};
pub use value::RespValue;
