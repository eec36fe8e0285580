//! Row cursor over a statement result with typed field access.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::conversion::FromText;
use crate::datetime::{epoch_date, epoch_date_time, parse_date, parse_timestamp};
use crate::error::{Error, Result};
use crate::statement::{CursorState, StatementHandle};

/// Decoded field value and its NULL flag.
///
/// For NULL fields `value` holds the type's placeholder: the maximum for
/// integers, NaN for floats, empty text, the epoch for dates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldValue<T> {
    pub value: T,
    pub is_null: bool,
}

impl<T> FieldValue<T> {
    pub fn into_option(self) -> Option<T> {
        if self.is_null { None } else { Some(self.value) }
    }
}

enum Source<'a> {
    Owned(Box<StatementHandle>),
    Borrowed(&'a mut StatementHandle),
}

/// Cursor over the rows of an executed statement.
///
/// # Example
///
/// ```no_run
/// # fn run(conn: &mut sqlpp_postgres::Connection) -> sqlpp_postgres::Result<()> {
/// let mut rows = conn.select("SELECT id, name FROM users")?;
/// while rows.next() {
///     let id = rows.bind_integral_result(0)?.value;
///     let name = rows.bind_text_result(1)?;
///     println!("{}: {}", id, name.value);
/// }
/// # Ok(())
/// # }
/// ```
pub struct BindResult<'a> {
    source: Source<'a>,
}

impl<'a> BindResult<'a> {
    pub(crate) fn owned(handle: StatementHandle) -> Self {
        Self {
            source: Source::Owned(Box::new(handle)),
        }
    }

    pub(crate) fn borrowed(handle: &'a mut StatementHandle) -> Self {
        Self {
            source: Source::Borrowed(handle),
        }
    }

    fn handle(&self) -> &StatementHandle {
        match &self.source {
            Source::Owned(h) => h,
            Source::Borrowed(h) => h,
        }
    }

    fn handle_mut(&mut self) -> &mut StatementHandle {
        match &mut self.source {
            Source::Owned(h) => h,
            Source::Borrowed(h) => h,
        }
    }

    /// Advance to the next row. Returns false when there are no more rows.
    ///
    /// The first call positions the cursor on the first row. Once exhausted,
    /// further calls keep returning false.
    #[expect(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.handle_mut().advance()
    }

    /// Index of the current row.
    pub fn row_index(&self) -> usize {
        self.handle().count()
    }

    /// Number of rows; known after the first call to [`next`](Self::next).
    pub fn total_count(&self) -> usize {
        self.handle().total_count()
    }

    /// Number of columns; known after the first call to [`next`](Self::next).
    pub fn field_count(&self) -> usize {
        self.handle().fields()
    }

    pub fn cursor(&self) -> CursorState {
        self.handle().cursor()
    }

    pub fn is_valid(&self) -> bool {
        self.cursor() == CursorState::Positioned
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        self.handle().result().column_name(index)
    }

    /// Text bytes of column `index` in the current row; `None` for NULL.
    fn raw(&self, index: usize) -> Result<Option<&[u8]>> {
        let handle = self.handle();
        if handle.cursor() != CursorState::Positioned {
            return Err(Error::InvalidUsage(
                "result accessed while the cursor is not on a row".into(),
            ));
        }
        let result = handle.result();
        let row = handle.count();
        if result.is_null(row, index)? {
            return Ok(None);
        }
        result.get_bytes(row, index).map(Some)
    }

    fn field<'s, T: FromText<'s>>(&'s self, index: usize) -> Result<FieldValue<T>> {
        Ok(match self.raw(index)? {
            Some(bytes) => FieldValue {
                value: T::from_text(bytes)?,
                is_null: false,
            },
            None => FieldValue {
                value: T::value_for_null(),
                is_null: true,
            },
        })
    }

    /// Decode column `index` of the current row; `None` for NULL.
    pub fn get<'s, T: FromText<'s>>(&'s self, index: usize) -> Result<Option<T>> {
        self.field(index).map(FieldValue::into_option)
    }

    pub fn bind_boolean_result(&self, index: usize) -> Result<FieldValue<bool>> {
        self.field(index)
    }

    pub fn bind_integral_result(&self, index: usize) -> Result<FieldValue<i64>> {
        self.field(index)
    }

    pub fn bind_floating_point_result(&self, index: usize) -> Result<FieldValue<f64>> {
        self.field(index)
    }

    /// Text of column `index`, borrowed from the result; empty for NULL.
    pub fn bind_text_result(&self, index: usize) -> Result<FieldValue<&str>> {
        self.field(index)
    }

    /// Bytes of column `index`; `bytea` hex text is decoded.
    pub fn bind_blob_result(&self, index: usize) -> Result<FieldValue<Vec<u8>>> {
        self.field(index)
    }

    /// Date of column `index`. Unparseable text yields the epoch.
    pub fn bind_date_result(&self, index: usize) -> Result<FieldValue<NaiveDate>> {
        let Some(bytes) = self.raw(index)? else {
            return Ok(FieldValue {
                value: epoch_date(),
                is_null: true,
            });
        };
        let value = parse_date(bytes);
        if self.handle().debug() && value == epoch_date() {
            debug!(index, text = %String::from_utf8_lossy(bytes), "date field parsed as epoch");
        }
        Ok(FieldValue {
            value,
            is_null: false,
        })
    }

    /// Timestamp of column `index`. A zone offset in the text is not applied.
    pub fn bind_date_time_result(&self, index: usize) -> Result<FieldValue<NaiveDateTime>> {
        let Some(bytes) = self.raw(index)? else {
            return Ok(FieldValue {
                value: epoch_date_time(),
                is_null: true,
            });
        };
        let value = parse_timestamp(bytes);
        if self.handle().debug() && value == epoch_date_time() {
            debug!(index, text = %String::from_utf8_lossy(bytes), "timestamp field parsed as epoch");
        }
        Ok(FieldValue {
            value,
            is_null: false,
        })
    }

    pub fn bind_uuid_result(&self, index: usize) -> Result<FieldValue<Uuid>> {
        self.field(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;
    use crate::response::Response;

    fn handle(response: Response) -> StatementHandle {
        let mut handle = StatementHandle::new(false);
        handle.assign(response, "SELECT").unwrap();
        handle
    }

    #[test]
    fn test_cursor_walks_rows() {
        let response = Response::tuples(
            &[("n", oid::INT4)],
            &[&[Some("10")], &[Some("20")], &[None]],
        )
        .unwrap();
        let mut rows = BindResult::owned(handle(response));

        assert_eq!(rows.cursor(), CursorState::Unfetched);
        assert!(rows.next());
        assert_eq!(rows.total_count(), 3);
        assert_eq!(rows.field_count(), 1);
        assert_eq!(rows.bind_integral_result(0).unwrap().value, 10);
        assert!(rows.next());
        assert_eq!(rows.get::<i32>(0).unwrap(), Some(20));
        assert!(rows.next());
        let null = rows.bind_integral_result(0).unwrap();
        assert!(null.is_null);
        assert_eq!(null.value, i64::MAX);
        assert_eq!(rows.get::<i32>(0).unwrap(), None);

        assert!(!rows.next());
        assert!(!rows.next());
        assert_eq!(rows.row_index(), 2);
        assert_eq!(rows.cursor(), CursorState::Exhausted);
    }

    #[test]
    fn test_empty_result_is_exhausted() {
        let response = Response::tuples(&[("n", oid::INT4)], &[]).unwrap();
        let mut rows = BindResult::owned(handle(response));
        assert!(!rows.next());
        assert_eq!(rows.row_index(), 0);
        assert!(!rows.next());
    }

    #[test]
    fn test_getter_requires_row() {
        let response = Response::tuples(&[("n", oid::INT4)], &[&[Some("1")]]).unwrap();
        let mut rows = BindResult::owned(handle(response));
        assert!(matches!(
            rows.bind_integral_result(0),
            Err(Error::InvalidUsage(_))
        ));
        assert!(rows.next());
        assert!(!rows.next());
        assert!(matches!(
            rows.bind_text_result(0),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn test_typed_getters() {
        let response = Response::tuples(
            &[
                ("flag", oid::BOOL),
                ("ratio", oid::FLOAT8),
                ("name", oid::TEXT),
                ("blob", oid::BYTEA),
                ("day", oid::DATE),
                ("at", oid::TIMESTAMPTZ),
                ("id", oid::UUID),
            ],
            &[&[
                Some("t"),
                Some("0.25"),
                Some("bob"),
                Some("\\x0102"),
                Some("2016-11-21"),
                Some("2016-11-21 13:45:01.5+01"),
                Some("550e8400-e29b-41d4-a716-446655440000"),
            ]],
        )
        .unwrap();
        let mut rows = BindResult::owned(handle(response));
        assert!(rows.next());

        assert!(rows.bind_boolean_result(0).unwrap().value);
        assert_eq!(rows.bind_floating_point_result(1).unwrap().value, 0.25);
        assert_eq!(rows.bind_text_result(2).unwrap().value, "bob");
        assert_eq!(rows.bind_blob_result(3).unwrap().value, vec![1, 2]);
        assert_eq!(
            rows.bind_date_result(4).unwrap().value,
            NaiveDate::from_ymd_opt(2016, 11, 21).unwrap()
        );
        assert_eq!(
            rows.bind_date_time_result(5).unwrap().value,
            NaiveDate::from_ymd_opt(2016, 11, 21)
                .unwrap()
                .and_hms_micro_opt(13, 45, 1, 500_000)
                .unwrap()
        );
        assert_eq!(
            rows.bind_uuid_result(6).unwrap().value.as_u128(),
            0x550E8400_E29B_41D4_A716_446655440000
        );
        assert_eq!(rows.column_name(6).unwrap(), "id");
    }

    #[test]
    fn test_null_placeholders() {
        let response = Response::tuples(
            &[("a", oid::FLOAT8), ("b", oid::DATE), ("c", oid::TEXT)],
            &[&[None, None, None]],
        )
        .unwrap();
        let mut rows = BindResult::owned(handle(response));
        assert!(rows.next());

        let ratio = rows.bind_floating_point_result(0).unwrap();
        assert!(ratio.is_null && ratio.value.is_nan());
        let day = rows.bind_date_result(1).unwrap();
        assert!(day.is_null);
        assert_eq!(day.value, epoch_date());
        let text = rows.bind_text_result(2).unwrap();
        assert_eq!(text, FieldValue { value: "", is_null: true });
        assert_eq!(text.into_option(), None);
    }

    #[test]
    fn test_malformed_date_is_epoch() {
        let response = Response::tuples(&[("d", oid::DATE)], &[&[Some("infinity")]]).unwrap();
        let mut rows = BindResult::owned(handle(response));
        assert!(rows.next());
        let day = rows.bind_date_result(0).unwrap();
        assert!(!day.is_null);
        assert_eq!(day.value, epoch_date());
    }
}
