//! String and byte type implementations.

use chrono::FixedOffset;

use crate::error::{Error, Result};

use super::{FromText, ToParam};

impl ToParam for str {
    fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
        buf.push_str(self);
    }
}

impl ToParam for String {
    fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
        buf.push_str(self);
    }
}

impl<'a> FromText<'a> for &'a str {
    fn value_for_null() -> Self {
        ""
    }

    fn from_text(bytes: &'a [u8]) -> Result<Self> {
        simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
    }
}

impl FromText<'_> for String {
    fn value_for_null() -> Self {
        String::new()
    }

    fn from_text(bytes: &[u8]) -> Result<Self> {
        <&str>::from_text(bytes).map(str::to_owned)
    }
}

impl<'a> FromText<'a> for &'a [u8] {
    fn value_for_null() -> Self {
        &[]
    }

    fn from_text(bytes: &'a [u8]) -> Result<Self> {
        Ok(bytes)
    }
}

/// `bytea` columns arrive in hex format (`\x` followed by two hex digits per
/// byte). Text that is not in that form is returned as is.
impl FromText<'_> for Vec<u8> {
    fn value_for_null() -> Self {
        Vec::new()
    }

    fn from_text(bytes: &[u8]) -> Result<Self> {
        Ok(bytes
            .strip_prefix(b"\\x")
            .and_then(decode_hex)
            .unwrap_or_else(|| bytes.to_vec()))
    }
}

fn decode_hex(hex: &[u8]) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.chunks_exact(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
