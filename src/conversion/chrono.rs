//! chrono type implementations.
//!
//! Dates are written as `YYYY-MM-DD`. Timestamps are written as
//! `YYYY-MM-DD HH:MM:SS[.ffffff]±HH:MM[:SS]`, where a naive timestamp is taken to
//! be local time.

use std::fmt::Write as _;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike,
};

use crate::datetime::{epoch_date, epoch_date_time, parse_date, parse_timestamp};
use crate::error::Result;

use super::{FromText, ToParam};

fn write_date(buf: &mut String, date: NaiveDate) {
    let _ = write!(
        buf,
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month(),
        date.day()
    );
}

fn write_offset(buf: &mut String, offset: FixedOffset) {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.unsigned_abs();
    let minutes = seconds / 60;
    let _ = write!(buf, "{}{:02}:{:02}", sign, minutes / 60, minutes % 60);
    if seconds % 60 != 0 {
        let _ = write!(buf, ":{:02}", seconds % 60);
    }
}

/// Append `value` with `offset` in the format the server parses as a
/// timestamp with time zone.
pub(crate) fn write_timestamp(buf: &mut String, value: NaiveDateTime, offset: FixedOffset) {
    write_date(buf, value.date());
    let _ = write!(
        buf,
        " {:02}:{:02}:{:02}",
        value.hour(),
        value.minute(),
        value.second()
    );
    let micros = value.nanosecond() / 1000;
    if micros != 0 {
        let _ = write!(buf, ".{:06}", micros);
    }
    write_offset(buf, offset);
}

impl ToParam for NaiveDate {
    fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
        write_date(buf, *self);
    }
}

impl ToParam for NaiveDateTime {
    fn to_param(&self, buf: &mut String, local_offset: FixedOffset) {
        write_timestamp(buf, *self, local_offset);
    }
}

impl<Tz: TimeZone> ToParam for DateTime<Tz> {
    fn to_param(&self, buf: &mut String, _local_offset: FixedOffset) {
        write_timestamp(buf, self.naive_local(), self.offset().fix());
    }
}

impl FromText<'_> for NaiveDate {
    fn value_for_null() -> Self {
        epoch_date()
    }

    fn from_text(bytes: &[u8]) -> Result<Self> {
        Ok(parse_date(bytes))
    }
}

impl FromText<'_> for NaiveDateTime {
    fn value_for_null() -> Self {
        epoch_date_time()
    }

    fn from_text(bytes: &[u8]) -> Result<Self> {
        Ok(parse_timestamp(bytes))
    }
}
