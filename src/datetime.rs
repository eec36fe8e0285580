//! Textual date and timestamp scanning, and the local UTC offset used when
//! binding timestamps.
//!
//! The scanner accepts the ISO `DateStyle` output of the server:
//!
//! - `YYYY-MM-DD`
//! - `YYYY-MM-DD HH:MM:SS`
//! - `YYYY-MM-DD HH:MM:SS.f` with 1 to 6 fraction digits
//!
//! each optionally followed by `±HH` or `±HH:MM`. Parsing is positional and
//! never fails: malformed input yields the Unix epoch (dates) or whatever was
//! assembled before the first mismatch (timestamps).

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset as _, TimeDelta, Utc,
};

const DATE_LEN: usize = 10;
const TIME_END: usize = 19;

/// 1970-01-01, returned for unparseable dates.
pub fn epoch_date() -> NaiveDate {
    NaiveDate::default()
}

/// 1970-01-01 00:00:00, returned for unparseable timestamps.
pub fn epoch_date_time() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// Check `text[start..start + pattern.len()]` against a pattern where `D` is
/// a digit and any other byte stands for a non-digit separator.
fn matches_pattern(text: &[u8], start: usize, pattern: &[u8]) -> bool {
    let Some(window) = text.get(start..start + pattern.len()) else {
        return false;
    };
    window.iter().zip(pattern).all(|(&b, &p)| match p {
        b'D' => b.is_ascii_digit(),
        _ => !b.is_ascii_digit(),
    })
}

/// Decimal value of `text[start..start + len]`, which must be digits.
fn digits(text: &[u8], start: usize, len: usize) -> u32 {
    text[start..start + len]
        .iter()
        .fold(0, |acc, &b| acc * 10 + u32::from(b - b'0'))
}

fn scan_date(text: &[u8]) -> Option<NaiveDate> {
    if !matches_pattern(text, 0, b"DDDD-DD-DD") {
        return None;
    }
    let year = digits(text, 0, 4) as i32;
    NaiveDate::from_ymd_opt(year, digits(text, 5, 2), digits(text, 8, 2))
}

fn scan_time(text: &[u8]) -> Option<NaiveTime> {
    if !matches_pattern(text, DATE_LEN, b" DD:DD:DD") {
        return None;
    }
    NaiveTime::from_hms_opt(
        digits(text, 11, 2),
        digits(text, 14, 2),
        digits(text, 17, 2),
    )
}

/// Microseconds from a `.f{1,6}` fraction at `start`, and the index after it.
fn scan_fraction(text: &[u8], start: usize) -> Option<(u32, usize)> {
    if text.get(start) != Some(&b'.') {
        return None;
    }
    let mut micros = 0;
    let mut pos = start + 1;
    while pos < text.len() && text[pos].is_ascii_digit() && pos - start <= 6 {
        micros = micros * 10 + u32::from(text[pos] - b'0');
        pos += 1;
    }
    let scanned = pos - start - 1;
    if scanned == 0 {
        return None;
    }
    // Skip digits beyond microsecond precision
    while pos < text.len() && text[pos].is_ascii_digit() {
        pos += 1;
    }
    Some((micros * 10_u32.pow(6 - scanned as u32), pos))
}

/// Zone offset `±HH[:MM]` at `start`.
fn scan_offset(text: &[u8], start: usize) -> Option<FixedOffset> {
    let sign = match text.get(start)? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    if !matches_pattern(text, start + 1, b"DD") {
        return None;
    }
    let mut seconds = digits(text, start + 1, 2) as i32 * 3600;
    if matches_pattern(text, start + 3, b":DD") {
        seconds += digits(text, start + 4, 2) as i32 * 60;
    }
    FixedOffset::east_opt(sign * seconds)
}

/// Parse a date. Returns the epoch date when the text is not a valid date.
pub fn parse_date(text: &[u8]) -> NaiveDate {
    scan_date(text).unwrap_or_else(epoch_date)
}

/// Parse a timestamp and the zone offset that follows it, if any.
///
/// The offset is reported separately and is not applied to the returned
/// value, which is the clock reading as the server printed it.
pub fn parse_timestamp_with_offset(text: &[u8]) -> (NaiveDateTime, Option<FixedOffset>) {
    let Some(date) = scan_date(text) else {
        return (epoch_date_time(), None);
    };
    let midnight = date.and_time(NaiveTime::MIN);
    if text.len() == DATE_LEN {
        return (midnight, None);
    }

    let Some(time) = scan_time(text) else {
        return (midnight, None);
    };
    let mut value = date.and_time(time);

    let mut pos = TIME_END;
    if let Some((micros, end)) = scan_fraction(text, pos) {
        value += TimeDelta::microseconds(i64::from(micros));
        pos = end;
    }

    (value, scan_offset(text, pos))
}

/// Parse a timestamp.
///
/// A mismatch stops the scan and returns what was assembled so far: the
/// epoch, a date at midnight, or a date and time without fraction.
///
/// Any zone offset in the text is ignored: `"2024-01-01 10:00:00+05"` yields
/// 10:00:00, not 05:00:00 UTC.
pub fn parse_timestamp(text: &[u8]) -> NaiveDateTime {
    parse_timestamp_with_offset(text).0
}

/// Source of the current time and the local UTC offset.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Local offset in effect at `at`.
    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset;
}

/// The process clock and time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        at.with_timezone(&Local).offset().fix()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        (**self).local_offset(at)
    }
}

/// Local UTC offset, looked up at most once an hour.
pub struct LocalOffsetCache<C = SystemClock> {
    clock: C,
    cached: Option<(DateTime<Utc>, FixedOffset)>,
}

impl LocalOffsetCache {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for LocalOffsetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> LocalOffsetCache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            cached: None,
        }
    }

    /// Current local offset.
    pub fn offset(&mut self) -> FixedOffset {
        let now = self.clock.now();
        match self.cached {
            Some((fetched, offset)) if now >= fetched && now - fetched < TimeDelta::hours(1) => {
                offset
            }
            _ => {
                let offset = self.clock.local_offset(now);
                self.cached = Some((now, offset));
                offset
            }
        }
    }
}
