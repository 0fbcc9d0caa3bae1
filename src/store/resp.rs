//! RESP2 framing for the Redis client.
//!
//! `RespCodec` plugs into `tokio_util::codec::Framed`; a frame that has not
//! fully arrived yet decodes to `Ok(None)` and leaves the buffer untouched.

use crate::error::StoreError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Build a command array of bulk strings, e.g. `["LPUSH", key, value]`.
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        RespValue::Array(Some(
            parts
                .into_iter()
                .map(|p| RespValue::BulkString(Some(Bytes::copy_from_slice(p.as_ref()))))
                .collect(),
        ))
    }

    pub fn bulk(data: &str) -> Self {
        RespValue::BulkString(Some(Bytes::copy_from_slice(data.as_bytes())))
    }

    pub fn simple(data: &str) -> Self {
        RespValue::SimpleString(Bytes::copy_from_slice(data.as_bytes()))
    }
}

#[derive(Debug, PartialEq)]
enum ParseError {
    Incomplete,
    Invalid(String),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl RespCodec {
    fn try_parse(input: &[u8]) -> Result<(RespValue, usize), ParseError> {
        if input.is_empty() {
            return Err(ParseError::Incomplete);
        }

        match input[0] {
            b'+' => Self::parse_line(input).map(|(line, n)| (RespValue::SimpleString(line), n)),
            b'-' => Self::parse_line(input).map(|(line, n)| (RespValue::Error(line), n)),
            b':' => Self::parse_integer(input),
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(ParseError::Invalid(format!(
                "unknown RESP type byte: {:?}",
                other as char
            ))),
        }
    }

    fn parse_line(input: &[u8]) -> Result<(Bytes, usize), ParseError> {
        let pos = Self::find_crlf(input)?;
        Ok((Bytes::copy_from_slice(&input[1..pos]), pos + 2))
    }

    fn parse_length(input: &[u8]) -> Result<(i64, usize), ParseError> {
        let pos = Self::find_crlf(input)?;
        let s = std::str::from_utf8(&input[1..pos])
            .map_err(|e| ParseError::Invalid(e.to_string()))?;
        let n = s
            .parse::<i64>()
            .map_err(|_| ParseError::Invalid(format!("invalid integer: {:?}", s)))?;
        Ok((n, pos + 2))
    }

    fn parse_integer(input: &[u8]) -> Result<(RespValue, usize), ParseError> {
        let (n, consumed) = Self::parse_length(input)?;
        Ok((RespValue::Integer(n), consumed))
    }

    fn parse_bulk_string(input: &[u8]) -> Result<(RespValue, usize), ParseError> {
        let (len, header) = Self::parse_length(input)?;
        if len == -1 {
            return Ok((RespValue::BulkString(None), header));
        }
        if len < 0 {
            return Err(ParseError::Invalid(format!("negative bulk length {}", len)));
        }

        let end = header + len as usize;
        if end + 2 > input.len() {
            return Err(ParseError::Incomplete);
        }
        if &input[end..end + 2] != b"\r\n" {
            return Err(ParseError::Invalid("bulk string missing CRLF".to_string()));
        }

        let data = Bytes::copy_from_slice(&input[header..end]);
        Ok((RespValue::BulkString(Some(data)), end + 2))
    }

    fn parse_array(input: &[u8]) -> Result<(RespValue, usize), ParseError> {
        let (len, header) = Self::parse_length(input)?;
        if len == -1 {
            return Ok((RespValue::Array(None), header));
        }
        if len < 0 {
            return Err(ParseError::Invalid(format!("negative array length {}", len)));
        }

        let mut elements = Vec::with_capacity(len.min(1024) as usize);
        let mut offset = header;
        for _ in 0..len {
            let (value, consumed) = Self::try_parse(&input[offset..])?;
            elements.push(value);
            offset += consumed;
        }

        Ok((RespValue::Array(Some(elements)), offset))
    }

    /// Position of the line terminator. A CR followed by anything but LF
    /// is malformed; waiting for more bytes would never complete the line.
    #[inline]
    fn find_crlf(input: &[u8]) -> Result<usize, ParseError> {
        let pos = memchr::memchr(b'\r', input).ok_or(ParseError::Incomplete)?;
        match input.get(pos + 1) {
            Some(b'\n') => Ok(pos),
            Some(_) => Err(ParseError::Invalid("CR not followed by LF".to_string())),
            None => Err(ParseError::Incomplete),
        }
    }

    fn encode_into(value: &RespValue, buf: &mut BytesMut) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.put_u8(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::BulkString(Some(data)) => {
                buf.put_u8(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
            RespValue::Array(Some(elements)) => {
                buf.put_u8(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
        }
    }
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = StoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RespValue>, StoreError> {
        match Self::try_parse(src) {
            Ok((value, consumed)) => {
                src.advance(consumed);
                Ok(Some(value))
            }
            Err(ParseError::Incomplete) => Ok(None),
            Err(ParseError::Invalid(msg)) => Err(StoreError::Protocol(msg)),
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = StoreError;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), StoreError> {
        Self::encode_into(&item, dst);
        Ok(())
    }
}
