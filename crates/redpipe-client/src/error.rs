use std::time::Duration;

use redpipe_common::{Command, ProtocolError, RespValue};
use thiserror::Error;

/// Errors surfaced by the client.
///
/// Every variant carries the offending command when one exists. Connection
/// internal faults (decode errors, correlation violations) are converted to
/// [`ConnectionLost`](RedpipeError::ConnectionLost) before they reach a
/// caller.
#[derive(Error, Debug)]
pub enum RedpipeError {
    /// The server answered the command with an error reply.
    #[error("server error for [{command}]: {message}")]
    ErrorReply { command: Command, message: String },

    /// The reply shape contradicts the command's expectation tag.
    #[error("unexpected {} reply for [{command}]", .reply.kind())]
    UnexpectedReply { command: Command, reply: RespValue },

    /// The request deadline elapsed before a reply arrived.
    #[error("request timed out after {timeout:?} for [{command}]")]
    RequestTimeout { command: Command, timeout: Duration },

    /// The pool had no ready connection at routing time.
    #[error("no ready connection available")]
    NoReadyConnection,

    /// The connection died while requests were pending on it.
    #[error("connection lost: {cause}")]
    ConnectionLost { cause: String },

    /// Any other failure, wrapped with its cause.
    #[error("request execution failed for [{command}]: {cause}")]
    RequestExecution { command: Command, cause: String },

    /// A setup command was rejected during connection bring-up.
    #[error("setup command [{command}] rejected with {} reply", .reply.kind())]
    SetupFailed { command: Command, reply: RespValue },

    /// `wait_until_connected` gave up before the pool filled.
    #[error("pool did not reach {min_connections} ready connection(s) within {timeout:?}")]
    ConnectTimeout {
        timeout: Duration,
        min_connections: usize,
    },

    /// A RESP framing violation on the wire.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

impl RedpipeError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transient routing and connection faults are retryable; server-side
    /// errors and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RedpipeError::RequestTimeout { .. }
                | RedpipeError::NoReadyConnection
                | RedpipeError::ConnectionLost { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RedpipeError>;
