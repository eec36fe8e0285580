//! Framing primitives: a cursor over a received payload and a writer that
//! frames outgoing messages.
//!
//! Integers are big-endian on the wire.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I32, U16, U32};

use crate::error::{Error, Result};

/// Cursor over the payload of one backend message.
///
/// Every read names the message in its error, so a truncated payload is
/// reported as e.g. "RowDescription: payload truncated".
pub struct Reader<'a> {
    data: &'a [u8],
    message: &'static str,
}

impl<'a> Reader<'a> {
    pub fn new(message: &'static str, data: &'a [u8]) -> Self {
        Self { data, message }
    }

    fn truncated(&self) -> Error {
        Error::Protocol(format!("{}: payload truncated", self.message))
    }

    fn fixed<T: FromBytes>(&mut self) -> Result<T> {
        match T::read_from_prefix(self.data) {
            Ok((value, rest)) => {
                self.data = rest;
                Ok(value)
            }
            Err(_) => Err(self.truncated()),
        }
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.fixed::<U16>().map(U16::get)
    }

    pub fn i32(&mut self) -> Result<i32> {
        self.fixed::<I32>().map(I32::get)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.fixed::<U32>().map(U32::get)
    }

    pub fn u8(&mut self) -> Result<u8> {
        let (&first, rest) = self.data.split_first().ok_or_else(|| self.truncated())?;
        self.data = rest;
        Ok(first)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let (head, rest) = self
            .data
            .split_at_checked(len)
            .ok_or_else(|| self.truncated())?;
        self.data = rest;
        Ok(head)
    }

    /// A NUL-terminated UTF-8 string.
    pub fn cstr(&mut self) -> Result<&'a str> {
        let end = memchr::memchr(0, self.data).ok_or_else(|| {
            Error::Protocol(format!("{}: unterminated string", self.message))
        })?;
        let text = simdutf8::compat::from_utf8(&self.data[..end])
            .map_err(|e| Error::Protocol(format!("{}: invalid UTF-8: {e}", self.message)))?;
        self.data = &self.data[end + 1..];
        Ok(text)
    }

    /// Everything not read yet.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Appends one framed frontend message to a buffer.
///
/// The length field is reserved on creation and filled in by `finish`.
pub struct MessageWriter<'a> {
    buf: &'a mut Vec<u8>,
    length_at: usize,
}

impl<'a> MessageWriter<'a> {
    /// Start a message with a type byte.
    pub fn tagged(buf: &'a mut Vec<u8>, tag: u8) -> Self {
        buf.push(tag);
        Self::untagged(buf)
    }

    /// Start a startup-phase message, which has no type byte.
    pub fn untagged(buf: &'a mut Vec<u8>) -> Self {
        let length_at = buf.len();
        buf.extend_from_slice(&[0; 4]);
        Self { buf, length_at }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn cstr(&mut self, text: &str) -> &mut Self {
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
        self
    }

    /// Write a length-prefixed value; `None` is written as length -1.
    pub fn value(&mut self, value: Option<&[u8]>) -> Result<&mut Self> {
        match value {
            Some(data) => {
                self.i32(length_of(data.len())?);
                self.bytes(data);
            }
            None => {
                self.i32(-1);
            }
        }
        Ok(self)
    }

    /// Fill in the length field.
    pub fn finish(self) -> Result<()> {
        let len = length_of(self.buf.len() - self.length_at)?;
        self.buf[self.length_at..self.length_at + 4].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

/// Convert a length to the protocol's `Int32`.
pub fn length_of(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|e| Error::InvalidUsage(format!("message too large: {len} bytes ({e})")))
}

/// Convert a count to the protocol's `Int16`.
pub fn count_of(count: usize) -> Result<i16> {
    i16::try_from(count).map_err(|e| {
        Error::InvalidUsage(format!("too many items in one message: {count} ({e})"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sequence() {
        let mut reader = Reader::new("Test", b"\x00\x02\xff\xff\xff\xffname\0tail");
        assert_eq!(reader.u16().unwrap(), 2);
        assert_eq!(reader.i32().unwrap(), -1);
        assert_eq!(reader.cstr().unwrap(), "name");
        assert_eq!(reader.rest(), b"tail");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_reader_truncated_names_message() {
        let mut reader = Reader::new("DataRow", &[0, 0, 1]);
        match reader.u32() {
            Err(Error::Protocol(message)) => assert_eq!(message, "DataRow: payload truncated"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(Reader::new("Test", b"no terminator").cstr().is_err());
        assert!(Reader::new("Test", &[1, 2]).bytes(3).is_err());
    }

    #[test]
    fn test_writer_frames_message() {
        let mut buf = Vec::new();
        let mut msg = MessageWriter::tagged(&mut buf, b'Q');
        msg.cstr("SELECT 1");
        msg.finish().unwrap();
        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[1..5], &13_i32.to_be_bytes());
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_writer_null_value() {
        let mut buf = Vec::new();
        let mut msg = MessageWriter::untagged(&mut buf);
        msg.value(None).unwrap().value(Some(&b"ab"[..])).unwrap();
        msg.finish().unwrap();
        assert_eq!(buf, b"\0\0\0\x0e\xff\xff\xff\xff\0\0\0\x02ab");
    }
}
