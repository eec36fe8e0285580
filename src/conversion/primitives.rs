//! Primitive type implementations (bool, integers, floats).

use std::fmt::Write as _;

use chrono::FixedOffset;

use crate::error::Result;

use super::{FromText, ToParam};

// === Boolean ===

impl ToParam for bool {
    fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
        buf.push_str(if *self { "TRUE" } else { "FALSE" });
    }
}

impl FromText<'_> for bool {
    fn value_for_null() -> Self {
        false
    }

    /// The server sends `t` or `f`. Only a leading `f` reads as false.
    fn from_text(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.first() != Some(&b'f'))
    }
}

// === Integer types ===

macro_rules! impl_integer {
    ($($ty:ty),*) => {
        $(
            impl ToParam for $ty {
                fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
                    let _ = write!(buf, "{}", self);
                }
            }

            impl FromText<'_> for $ty {
                fn value_for_null() -> Self {
                    <$ty>::MAX
                }

                fn from_text(bytes: &[u8]) -> Result<Self> {
                    Ok(simdutf8::basic::from_utf8(bytes)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(<$ty>::MAX))
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

// === Float types ===

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl ToParam for $ty {
                fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
                    if self.is_nan() {
                        buf.push_str("NaN");
                    } else if self.is_infinite() {
                        buf.push_str(if self.is_sign_positive() { "Infinity" } else { "-Infinity" });
                    } else {
                        // Display is the shortest text that reads back to the same value
                        let _ = write!(buf, "{}", self);
                    }
                }
            }

            impl FromText<'_> for $ty {
                fn value_for_null() -> Self {
                    <$ty>::NAN
                }

                fn from_text(bytes: &[u8]) -> Result<Self> {
                    let Ok(s) = simdutf8::basic::from_utf8(bytes) else {
                        return Ok(<$ty>::NAN);
                    };
                    Ok(match s {
                        "NaN" => <$ty>::NAN,
                        "Infinity" => <$ty>::INFINITY,
                        "-Infinity" => <$ty>::NEG_INFINITY,
                        s => s.parse().unwrap_or(<$ty>::NAN),
                    })
                }
            }
        )*
    };
}

impl_float!(f32, f64);
