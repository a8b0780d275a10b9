//! Commands and their reply expectations.

use std::fmt;

use bytes::Bytes;

use crate::protocol::value::RespValue;

/// Reply shape a command's sender may assume.
///
/// The expectation is fixed at construction and never changes; the typed
/// extractors on the client facade match on it at the API boundary, and the
/// connection actor uses it during setup to validate bring-up replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// A bulk string reply, possibly null (`GET`).
    Bulk,
    /// An integer reply (`DEL`, `INCR`).
    Integer,
    /// The `+OK` status reply (`SET`, `SELECT`).
    OkStatus,
    /// No reply; the server closes the connection (`QUIT`, `SHUTDOWN`).
    ConnectionClose,
    /// Any successful reply (`PING`, `ECHO`).
    Any,
}

impl Expectation {
    /// Whether `reply` satisfies this expectation.
    ///
    /// Error replies never satisfy any expectation, and a
    /// [`ConnectionClose`](Expectation::ConnectionClose) command has no
    /// reply to satisfy.
    pub fn is_satisfied_by(&self, reply: &RespValue) -> bool {
        match self {
            Expectation::Bulk => matches!(reply, RespValue::Bulk(_)),
            Expectation::Integer => matches!(reply, RespValue::Integer(_)),
            Expectation::OkStatus => reply.is_ok_status(),
            Expectation::ConnectionClose => false,
            Expectation::Any => reply.is_success(),
        }
    }
}

/// A command ready to be sent to the server.
///
/// A command is an ordered list of binary-safe arguments (the first being
/// the command name) plus an [`Expectation`] tag. It is immutable once
/// constructed and its wire encoding is deterministic.
///
/// # Example
///
/// ```
/// use redpipe_common::{Command, Expectation};
///
/// let command = Command::new(["SET", "key", "value"], Expectation::OkStatus);
/// assert_eq!(command.name(), "SET");
/// assert_eq!(command.args().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
    expectation: Expectation,
}

impl Command {
    /// Creates a command from its argument list and expectation tag.
    pub fn new<I, A>(args: I, expectation: Expectation) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            expectation,
        }
    }

    /// The ordered argument list, command name first.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// The command name, lossily decoded for display purposes.
    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .unwrap_or_default()
    }

    /// The reply expectation carried by this command.
    pub fn expectation(&self) -> Expectation {
        self.expectation
    }
}

impl fmt::Display for Command {
    /// Renders the command for error messages, truncating long arguments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_ARG: usize = 24;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let text = String::from_utf8_lossy(arg);
            if text.len() > MAX_ARG {
                let cut: String = text.chars().take(MAX_ARG).collect();
                write!(f, "{}...", cut)?;
            } else {
                f.write_str(&text)?;
            }
        }
        Ok(())
    }
}
