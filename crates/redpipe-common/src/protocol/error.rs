use thiserror::Error;

/// Errors raised while decoding RESP frames.
///
/// Every decode error is fatal to the connection it occurred on: the stream
/// position can no longer be trusted, so the decoder poisons itself and the
/// owning connection tears down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed frame: unrecognized or truncated frame header")]
    MalformedFrame,

    #[error("bad length: length or count failed to parse or was below -1")]
    BadLength,

    #[error("unexpected terminator: CRLF missing where required")]
    UnexpectedTerminator,

    #[error("decoder poisoned by an earlier protocol error")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
