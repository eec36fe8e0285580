//! Conversion between Rust values and PostgreSQL's text format.
//!
//! Parameters are sent to the server as text ([`ToParam`]) and result fields
//! come back as text ([`FromText`]). There is no binary format.

mod chrono;
mod primitives;
mod string;
mod uuid;

use ::chrono::FixedOffset;

use crate::error::Result;

/// Trait for encoding Rust values as textual statement parameters.
///
/// Implementations append the literal the server expects for the value's
/// type. Timestamps without a zone are written with `local_offset`, the
/// process's current UTC offset.
pub trait ToParam {
    fn to_param(&self, buf: &mut String, local_offset: FixedOffset);
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self, buf: &mut String, local_offset: FixedOffset) {
        (**self).to_param(buf, local_offset)
    }
}

/// Trait for decoding text result fields into Rust values.
///
/// Decoding is lenient the way the server's own clients are: numbers that do
/// not parse become [`FromText::value_for_null`], dates that do not parse
/// become the epoch. Only text and UUIDs report malformed input as
/// [`Error::Decode`](crate::Error::Decode).
pub trait FromText<'a>: Sized {
    /// Value reported for a NULL field, and for numbers that fail to parse.
    fn value_for_null() -> Self;

    /// Decode the text bytes of a non-NULL field.
    fn from_text(bytes: &'a [u8]) -> Result<Self>;
}

/// Render a value as a parameter string.
pub fn to_param_string<T: ToParam + ?Sized>(value: &T, local_offset: FixedOffset) -> String {
    let mut buf = String::new();
    value.to_param(&mut buf, local_offset);
    buf
}
