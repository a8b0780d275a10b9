//! Command constructors.
//!
//! Each constructor returns a [`Command`] with the expectation tag matching
//! the reply the server documents for it; the tag decides which typed
//! extractor on the facade is legal for the command.

use bytes::Bytes;
use redpipe_common::{Command, Expectation};

fn decimal(value: i64) -> Bytes {
    Bytes::from(value.to_string())
}

/// `GET key` - bulk reply, null when the key is missing.
pub fn get(key: impl Into<Bytes>) -> Command {
    Command::new([Bytes::from_static(b"GET"), key.into()], Expectation::Bulk)
}

/// `SET key value` - `+OK` on success.
pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Command {
    Command::new(
        [Bytes::from_static(b"SET"), key.into(), value.into()],
        Expectation::OkStatus,
    )
}

/// `SET key value EX seconds` - `+OK` on success.
pub fn set_ex(key: impl Into<Bytes>, value: impl Into<Bytes>, seconds: u64) -> Command {
    Command::new(
        [
            Bytes::from_static(b"SET"),
            key.into(),
            value.into(),
            Bytes::from_static(b"EX"),
            decimal(seconds as i64),
        ],
        Expectation::OkStatus,
    )
}

/// `SETNX key value` - 1 when the key was set.
pub fn setnx(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Command {
    Command::new(
        [Bytes::from_static(b"SETNX"), key.into(), value.into()],
        Expectation::Integer,
    )
}

/// `DEL key` - number of keys removed.
pub fn del(key: impl Into<Bytes>) -> Command {
    Command::new([Bytes::from_static(b"DEL"), key.into()], Expectation::Integer)
}

/// `EXISTS key` - 1 when the key exists.
pub fn exists(key: impl Into<Bytes>) -> Command {
    Command::new(
        [Bytes::from_static(b"EXISTS"), key.into()],
        Expectation::Integer,
    )
}

/// `EXPIRE key seconds` - 1 when a timeout was set.
pub fn expire(key: impl Into<Bytes>, seconds: u64) -> Command {
    Command::new(
        [Bytes::from_static(b"EXPIRE"), key.into(), decimal(seconds as i64)],
        Expectation::Integer,
    )
}

/// `TTL key` - remaining seconds, -1 without expiry, -2 when missing.
pub fn ttl(key: impl Into<Bytes>) -> Command {
    Command::new([Bytes::from_static(b"TTL"), key.into()], Expectation::Integer)
}

/// `INCR key`.
pub fn incr(key: impl Into<Bytes>) -> Command {
    Command::new([Bytes::from_static(b"INCR"), key.into()], Expectation::Integer)
}

/// `INCRBY key delta`.
pub fn incr_by(key: impl Into<Bytes>, delta: i64) -> Command {
    Command::new(
        [Bytes::from_static(b"INCRBY"), key.into(), decimal(delta)],
        Expectation::Integer,
    )
}

/// `DECR key`.
pub fn decr(key: impl Into<Bytes>) -> Command {
    Command::new([Bytes::from_static(b"DECR"), key.into()], Expectation::Integer)
}

/// `APPEND key value` - length of the value after the append.
pub fn append(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Command {
    Command::new(
        [Bytes::from_static(b"APPEND"), key.into(), value.into()],
        Expectation::Integer,
    )
}

/// `STRLEN key`.
pub fn strlen(key: impl Into<Bytes>) -> Command {
    Command::new(
        [Bytes::from_static(b"STRLEN"), key.into()],
        Expectation::Integer,
    )
}

/// `PING` - `+PONG`.
pub fn ping() -> Command {
    Command::new([Bytes::from_static(b"PING")], Expectation::Any)
}

/// `ECHO message`.
pub fn echo(message: impl Into<Bytes>) -> Command {
    Command::new([Bytes::from_static(b"ECHO"), message.into()], Expectation::Bulk)
}

/// `SELECT db` - `+OK`; commonly used as a setup command.
pub fn select(db: u32) -> Command {
    Command::new(
        [Bytes::from_static(b"SELECT"), decimal(db as i64)],
        Expectation::OkStatus,
    )
}

/// `AUTH password` - `+OK`; commonly used as a setup command.
pub fn auth(password: impl Into<Bytes>) -> Command {
    Command::new(
        [Bytes::from_static(b"AUTH"), password.into()],
        Expectation::OkStatus,
    )
}

/// `CLIENT SETNAME name` - `+OK`; commonly used as a setup command.
pub fn client_setname(name: impl Into<Bytes>) -> Command {
    Command::new(
        [
            Bytes::from_static(b"CLIENT"),
            Bytes::from_static(b"SETNAME"),
            name.into(),
        ],
        Expectation::OkStatus,
    )
}

/// `FLUSHDB` - `+OK`.
pub fn flushdb() -> Command {
    Command::new([Bytes::from_static(b"FLUSHDB")], Expectation::OkStatus)
}

/// `QUIT` - the server closes the connection instead of replying.
pub fn quit() -> Command {
    Command::new([Bytes::from_static(b"QUIT")], Expectation::ConnectionClose)
}

/// `SHUTDOWN` - the server exits; the connection closes without a reply.
pub fn shutdown() -> Command {
    Command::new([Bytes::from_static(b"SHUTDOWN")], Expectation::ConnectionClose)
}
