//! Frame encoding.

use bytes::{BufMut, BytesMut};

use crate::protocol::{Command, RespValue};

/// Encodes a command as an array of bulk strings.
///
/// This is the only request form the codec emits; inline commands are never
/// produced. The encoding is deterministic: the same command always yields
/// the same bytes.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use redpipe_common::{Command, Expectation};
/// use redpipe_common::codec::encode_command;
///
/// let mut out = BytesMut::new();
/// encode_command(&Command::new(["GET", "foo"], Expectation::Bulk), &mut out);
/// assert_eq!(&out[..], b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
/// ```
pub fn encode_command(command: &Command, out: &mut BytesMut) {
    out.put_u8(b'*');
    put_decimal(out, command.args().len() as i64);
    out.put_slice(b"\r\n");
    for arg in command.args() {
        out.put_u8(b'$');
        put_decimal(out, arg.len() as i64);
        out.put_slice(b"\r\n");
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

/// Encodes a reply value.
///
/// The client itself never sends replies; this is the server-side half of
/// the codec, used by the round-trip tests and by scripted test servers.
pub fn encode_value(value: &RespValue, out: &mut BytesMut) {
    match value {
        RespValue::Simple(text) => {
            out.put_u8(b'+');
            out.put_slice(text.as_bytes());
            out.put_slice(b"\r\n");
        }
        RespValue::Error(text) => {
            out.put_u8(b'-');
            out.put_slice(text.as_bytes());
            out.put_slice(b"\r\n");
        }
        RespValue::Integer(n) => {
            out.put_u8(b':');
            put_decimal(out, *n);
            out.put_slice(b"\r\n");
        }
        RespValue::Bulk(None) => out.put_slice(b"$-1\r\n"),
        RespValue::Bulk(Some(data)) => {
            out.put_u8(b'$');
            put_decimal(out, data.len() as i64);
            out.put_slice(b"\r\n");
            out.put_slice(data);
            out.put_slice(b"\r\n");
        }
        RespValue::Array(None) => out.put_slice(b"*-1\r\n"),
        RespValue::Array(Some(items)) => {
            out.put_u8(b'*');
            put_decimal(out, items.len() as i64);
            out.put_slice(b"\r\n");
            for item in items {
                encode_value(item, out);
            }
        }
    }
}

/// Writes a signed decimal without going through a heap allocation.
fn put_decimal(out: &mut BytesMut, value: i64) {
    if value < 0 {
        out.put_u8(b'-');
    }
    let mut magnitude = value.unsigned_abs();
    let mut buf = [0u8; 20];
    let mut len = 0;
    if magnitude == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while magnitude > 0 {
            buf[len] = b'0' + (magnitude % 10) as u8;
            magnitude /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.put_slice(&buf[..len]);
}
