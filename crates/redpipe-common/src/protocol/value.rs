//! Reply values decoded from the wire.

use bytes::Bytes;

/// A single decoded RESP reply.
///
/// Bulk payloads are raw bytes; only simple strings and error messages are
/// required to be UTF-8 by the protocol convention. Arrays nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`, `+PONG` style status lines.
    Simple(String),
    /// `-ERR ...` server-reported errors.
    Error(String),
    /// `:123` signed integers.
    Integer(i64),
    /// `$...` bulk strings; `None` is the null bulk (`$-1`).
    Bulk(Option<Bytes>),
    /// `*...` arrays; `None` is the null array (`*-1`).
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// True for the `+OK` status reply.
    pub fn is_ok_status(&self) -> bool {
        matches!(self, RespValue::Simple(s) if s == "OK")
    }

    /// True for any non-error reply.
    pub fn is_success(&self) -> bool {
        !matches!(self, RespValue::Error(_))
    }

    /// Short kind name, used in log lines and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::Simple(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::Bulk(_) => "bulk string",
            RespValue::Array(_) => "array",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status_detection() {
        assert!(RespValue::Simple("OK".to_string()).is_ok_status());
        assert!(!RespValue::Simple("PONG".to_string()).is_ok_status());
        assert!(!RespValue::Error("OK".to_string()).is_ok_status());
    }

    #[test]
    fn test_success_subtype() {
        assert!(RespValue::Integer(1).is_success());
        assert!(RespValue::Bulk(None).is_success());
        assert!(RespValue::Array(None).is_success());
        assert!(!RespValue::Error("WRONGTYPE".to_string()).is_success());
    }
}
