//! RESP2 codec
//!
//! Decodes client requests and encodes replies through the
//! `tokio_util::codec` traits. Decoding walks the buffer with a cursor and
//! only consumes bytes once a complete frame is available.

use super::types::{RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string accepted from a client (512 MiB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted in a frame
pub const MAX_NESTING: usize = 32;

/// Codec for the RESP2 wire format
#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl RespCodec {
    pub fn new() -> Self {
        RespCodec
    }

    /// Encode a value into a fresh buffer
    pub fn encode_to_bytes(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        encode_value(&mut buf, value);
        buf.freeze()
    }
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = RespError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }

        match parse_frame(buf, 0, 0)? {
            Some((value, end)) => {
                buf.advance(end);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, value: RespValue, buf: &mut BytesMut) -> Result<(), RespError> {
        encode_value(buf, &value);
        Ok(())
    }
}

impl<'a> Encoder<&'a RespValue> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, value: &'a RespValue, buf: &mut BytesMut) -> Result<(), RespError> {
        encode_value(buf, value);
        Ok(())
    }
}

/// Parse one frame starting at `pos`, returning it with the position just past it
fn parse_frame(
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(&prefix) = buf.get(pos) else {
        return Ok(None);
    };

    match prefix {
        b'+' | b'-' | b':' => {
            let Some((line, next)) = read_line(buf, pos + 1) else {
                return Ok(None);
            };
            let value = match prefix {
                b'+' => RespValue::SimpleString(utf8(line)?),
                b'-' => RespValue::Error(utf8(line)?),
                _ => RespValue::Integer(parse_int(line)?),
            };
            Ok(Some((value, next)))
        }
        b'$' => parse_bulk(buf, pos),
        b'*' => parse_array(buf, pos, depth),
        _ if pos == 0 => parse_inline(buf),
        other => Err(RespError::InvalidProtocol(format!(
            "unknown type prefix: {:?}",
            other as char
        ))),
    }
}

fn parse_bulk(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((line, start)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    let len = parse_int(line)?;
    if len == -1 {
        return Ok(Some((RespValue::Null, start)));
    }
    if len < 0 {
        return Err(RespError::InvalidProtocol(format!(
            "invalid bulk string length: {}",
            len
        )));
    }

    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(RespError::TooLarge(len));
    }

    let end = start + len;
    if buf.len() < end + CRLF.len() {
        return Ok(None);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(RespError::InvalidProtocol(
            "missing CRLF after bulk string data".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[start..end]);
    Ok(Some((RespValue::BulkString(data), end + CRLF.len())))
}

fn parse_array(
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<Option<(RespValue, usize)>, RespError> {
    if depth >= MAX_NESTING {
        return Err(RespError::InvalidProtocol(format!(
            "arrays nested deeper than {}",
            MAX_NESTING
        )));
    }

    let Some((line, mut cursor)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    let count = parse_int(line)?;
    if count == -1 {
        return Ok(Some((RespValue::NullArray, cursor)));
    }
    if count < 0 {
        return Err(RespError::InvalidProtocol(format!(
            "invalid array count: {}",
            count
        )));
    }

    // Cap the preallocation; a hostile count must not reserve memory up front
    let mut elements = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        match parse_frame(buf, cursor, depth + 1)? {
            Some((value, next)) => {
                elements.push(value);
                cursor = next;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(elements), cursor)))
}

/// Inline commands (`PING\r\n`) as typed into a raw socket
fn parse_inline(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((line, next)) = read_line(buf, 0) else {
        return Ok(None);
    };

    let parts = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| RespValue::BulkString(Bytes::copy_from_slice(part)))
        .collect();

    Ok(Some((RespValue::Array(parts), next)))
}

/// Find the CRLF-terminated line starting at `start`
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let offset = rest.windows(2).position(|w| w == CRLF)?;
    Some((&rest[..offset], start + offset + CRLF.len()))
}

fn utf8(line: &[u8]) -> Result<String, RespError> {
    String::from_utf8(line.to_vec()).map_err(|_| RespError::InvalidUtf8)
}

fn parse_int(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(line)
        .map_err(|_| RespError::InvalidUtf8)?
        .parse::<i64>()
        .map_err(|_| RespError::InvalidInteger)
}

fn encode_value(buf: &mut BytesMut, value: &RespValue) {
    match value {
        RespValue::SimpleString(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        RespValue::Error(e) => {
            buf.put_u8(b'-');
            buf.put_slice(e.as_bytes());
            buf.put_slice(CRLF);
        }
        RespValue::Integer(i) => {
            buf.put_u8(b':');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_slice(CRLF);
        }
        RespValue::BulkString(bytes) => {
            buf.put_u8(b'$');
            buf.put_slice(bytes.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(bytes);
            buf.put_slice(CRLF);
        }
        RespValue::Null => buf.put_slice(b"$-1\r\n"),
        RespValue::NullArray => buf.put_slice(b"*-1\r\n"),
        RespValue::Array(arr) => {
            buf.put_u8(b'*');
            buf.put_slice(arr.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            for elem in arr {
                encode_value(buf, elem);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> (Option<RespValue>, usize) {
        let mut buf = BytesMut::from(input);
        let value = RespCodec.decode(&mut buf).unwrap();
        (value, buf.len())
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_all("+OK\r\n").0, Some(RespValue::simple_string("OK")));
        assert_eq!(decode_all("-ERR boom\r\n").0, Some(RespValue::error("ERR boom")));
        assert_eq!(decode_all(":1000\r\n").0, Some(RespValue::integer(1000)));
        assert_eq!(decode_all("$-1\r\n").0, Some(RespValue::Null));
        assert_eq!(decode_all("*-1\r\n").0, Some(RespValue::NullArray));
    }

    #[test]
    fn test_decode_array_of_bulk_strings() {
        let (value, rest) = decode_all("*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(value, Some(RespValue::bulk_array(["foo", "bar"])));
        assert_eq!(rest, 0);
    }

    #[test]
    fn test_partial_frame_consumes_nothing() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nfoo\r\n$3\r\nba");
        assert_eq!(RespCodec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 19);

        buf.extend_from_slice(b"r\r\n+PONG\r\n");
        assert_eq!(
            RespCodec.decode(&mut buf).unwrap(),
            Some(RespValue::bulk_array(["foo", "bar"]))
        );
        assert_eq!(
            RespCodec.decode(&mut buf).unwrap(),
            Some(RespValue::simple_string("PONG"))
        );
    }

    #[test]
    fn test_binary_bulk_string() {
        let mut buf = BytesMut::from(&b"$4\r\n\x00\xff\r\n\r\n"[..]);
        let value = RespCodec.decode(&mut buf).unwrap();
        assert_eq!(value, Some(RespValue::bulk_string(&b"\x00\xff\r\n"[..])));
    }

    #[test]
    fn test_inline_command() {
        let (value, _) = decode_all("SET  key value\r\n");
        assert_eq!(value, Some(RespValue::bulk_array(["SET", "key", "value"])));
    }

    #[test]
    fn test_rejects_oversized_bulk() {
        let mut buf = BytesMut::from("$999999999999\r\n");
        assert!(matches!(
            RespCodec.decode(&mut buf),
            Err(RespError::TooLarge(_))
        ));
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let mut buf = BytesMut::from("*1\r\n".repeat(200_000).as_str());
        assert!(matches!(
            RespCodec.decode(&mut buf),
            Err(RespError::InvalidProtocol(_))
        ));

        let (value, _) = decode_all("*1\r\n*1\r\n*1\r\n:7\r\n");
        assert_eq!(
            value,
            Some(RespValue::array(vec![RespValue::array(vec![RespValue::array(
                vec![RespValue::integer(7)]
            )])]))
        );
    }

    #[test]
    fn test_encode() {
        let value = RespValue::array(vec![
            RespValue::ok(),
            RespValue::integer(-2),
            RespValue::bulk_string("foobar"),
            RespValue::Null,
            RespValue::NullArray,
        ]);
        assert_eq!(
            RespCodec::encode_to_bytes(&value),
            Bytes::from("*5\r\n+OK\r\n:-2\r\n$6\r\nfoobar\r\n$-1\r\n*-1\r\n")
        );
    }
}
