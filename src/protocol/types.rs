//! RESP2 value types
//!
//! Defines the values exchanged with clients, plus the helpers commands use
//! to build replies.

use bytes::Bytes;
use std::fmt;

/// RESP2 value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple strings: +OK\r\n
    SimpleString(String),

    /// Errors: -ERR message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n
    BulkString(Bytes),

    /// Null bulk string: $-1\r\n
    Null,

    /// Null array: *-1\r\n (aborted EXEC, timed out blocking pops)
    NullArray,

    /// Arrays: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Create a simple string
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// The `+OK` reply
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Create an error
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Create an integer
    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Create a null value
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Create an array
    pub fn array(v: Vec<RespValue>) -> Self {
        RespValue::Array(v)
    }

    /// Build an array of bulk strings
    pub fn bulk_array<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespValue::Array(items.into_iter().map(|b| RespValue::BulkString(b.into())).collect())
    }

    /// Check if this is an error reply
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Try to extract array elements
    pub fn as_array(&self) -> Option<&Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to extract bulk string bytes
    pub fn as_bulk_string(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Try to extract integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Split a client request into an upper-cased command name and its arguments
    ///
    /// Requests are arrays of bulk strings; simple strings are tolerated for
    /// hand-written clients.
    pub fn into_command(self) -> Result<(String, Vec<Bytes>), RespError> {
        let parts = match self {
            RespValue::Array(parts) if !parts.is_empty() => parts,
            RespValue::Array(_) => {
                return Err(RespError::InvalidProtocol("empty command array".to_string()))
            }
            other => {
                return Err(RespError::InvalidProtocol(format!(
                    "expected array, got {}",
                    other
                )))
            }
        };

        let mut args = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                RespValue::BulkString(b) => args.push(b),
                RespValue::SimpleString(s) => args.push(Bytes::from(s)),
                RespValue::Integer(i) => args.push(Bytes::from(i.to_string())),
                other => {
                    return Err(RespError::InvalidProtocol(format!(
                        "command arguments must be bulk strings, got {}",
                        other
                    )))
                }
            }
        }

        let name = args.remove(0);
        let name = std::str::from_utf8(&name)
            .map_err(|_| RespError::InvalidUtf8)?
            .to_ascii_uppercase();

        Ok((name, args))
    }
}

impl From<Bytes> for RespValue {
    fn from(b: Bytes) -> Self {
        RespValue::BulkString(b)
    }
}

impl From<Option<Bytes>> for RespValue {
    fn from(b: Option<Bytes>) -> Self {
        b.map(RespValue::BulkString).unwrap_or(RespValue::Null)
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "SimpleString({})", s),
            RespValue::Error(e) => write!(f, "Error({})", e),
            RespValue::Integer(i) => write!(f, "Integer({})", i),
            RespValue::BulkString(b) => write!(f, "BulkString({} bytes)", b.len()),
            RespValue::Null => write!(f, "Null"),
            RespValue::NullArray => write!(f, "NullArray"),
            RespValue::Array(arr) => write!(f, "Array({} elements)", arr.len()),
        }
    }
}

/// RESP parsing and encoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum RespError {
    /// Invalid protocol format
    InvalidProtocol(String),

    /// Invalid UTF-8 where text was required
    InvalidUtf8,

    /// Length or integer field could not be parsed
    InvalidInteger,

    /// Bulk string larger than the accepted maximum
    TooLarge(usize),

    /// IO error on the underlying stream
    IoError(String),
}

impl fmt::Display for RespError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespError::InvalidProtocol(msg) => write!(f, "Invalid protocol: {}", msg),
            RespError::InvalidUtf8 => write!(f, "Invalid UTF-8"),
            RespError::InvalidInteger => write!(f, "Invalid integer"),
            RespError::TooLarge(len) => write!(f, "Bulk length {} exceeds limit", len),
            RespError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for RespError {}

impl From<std::io::Error> for RespError {
    fn from(err: std::io::Error) -> Self {
        RespError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_command_uppercases_name() {
        let frame = RespValue::array(vec![
            RespValue::bulk_string("set"),
            RespValue::bulk_string("k"),
            RespValue::bulk_string("v"),
        ]);
        let (name, args) = frame.into_command().unwrap();
        assert_eq!(name, "SET");
        assert_eq!(args, vec![Bytes::from("k"), Bytes::from("v")]);
    }

    #[test]
    fn test_into_command_rejects_non_arrays() {
        assert!(RespValue::integer(1).into_command().is_err());
        assert!(RespValue::array(vec![]).into_command().is_err());
    }
}
