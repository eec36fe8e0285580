//! Result of an executed statement.

use crate::conversion::FromText;
use crate::error::{Error, ErrorFields, Result};
use crate::protocol::types::Oid;
use crate::response::{ExecStatus, Response};

/// Owns the [`Response`] of the most recent execution.
///
/// A `QueryResult` only ever holds a successful response: [`assign`](Self::assign)
/// turns an error status into an [`Error`] and keeps nothing.
#[derive(Debug, Default)]
pub struct QueryResult {
    response: Option<Response>,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `response`, releasing the previous one.
    ///
    /// Returns the classified server error when the response reports a
    /// failure. `query` is attached to that error.
    pub fn assign(&mut self, response: Response, query: &str) -> Result<()> {
        self.clear();
        let status = response.status();
        if !status.is_error() {
            self.response = Some(response);
            return Ok(());
        }

        let fields = response.into_error_fields().unwrap_or_else(|| ErrorFields {
            message: Some(format!("statement failed with status {}", status)),
            ..Default::default()
        });
        Err(Error::database(fields, Some(query)))
    }

    /// Release the response. Calling this on an empty result does nothing.
    pub fn clear(&mut self) {
        self.response = None;
    }

    pub fn is_empty(&self) -> bool {
        self.response.is_none()
    }

    /// Execution status; [`ExecStatus::EmptyQuery`] when nothing is held.
    pub fn status(&self) -> ExecStatus {
        self.response
            .as_ref()
            .map_or(ExecStatus::EmptyQuery, Response::status)
    }

    /// Number of rows.
    pub fn records_size(&self) -> usize {
        self.response.as_ref().map_or(0, Response::ntuples)
    }

    /// Number of columns.
    pub fn field_count(&self) -> usize {
        self.response.as_ref().map_or(0, Response::nfields)
    }

    fn cell(&self, row: usize, field: usize) -> Result<Option<&[u8]>> {
        self.response
            .as_ref()
            .and_then(|r| r.get(row, field))
            .ok_or(Error::OutOfRange {
                row,
                field,
                rows: self.records_size(),
                fields: self.field_count(),
            })
    }

    pub fn is_null(&self, row: usize, field: usize) -> Result<bool> {
        Ok(self.cell(row, field)?.is_none())
    }

    /// Length in bytes of the field's text; 0 for NULL.
    pub fn length(&self, row: usize, field: usize) -> Result<usize> {
        Ok(self.cell(row, field)?.map_or(0, <[u8]>::len))
    }

    /// Decode a field. NULL yields [`FromText::value_for_null`].
    pub fn get_value<'a, T: FromText<'a>>(&'a self, row: usize, field: usize) -> Result<T> {
        match self.cell(row, field)? {
            Some(bytes) => T::from_text(bytes),
            None => Ok(T::value_for_null()),
        }
    }

    /// Text of a field; empty for NULL.
    pub fn get_str(&self, row: usize, field: usize) -> Result<&str> {
        self.get_value(row, field)
    }

    /// Raw bytes of a field; empty for NULL.
    pub fn get_bytes(&self, row: usize, field: usize) -> Result<&[u8]> {
        Ok(self.cell(row, field)?.unwrap_or_default())
    }

    /// Row count text of the command tag, such as `"3"` for `INSERT 0 3`.
    pub fn cmd_tuples(&self) -> &str {
        self.response.as_ref().map_or("", Response::cmd_tuples)
    }

    /// Number of rows the command affected; 0 when it reports none.
    pub fn affected_rows(&self) -> u64 {
        parse_affected_rows(self.cmd_tuples())
    }

    pub fn command_tag(&self) -> &str {
        self.response.as_ref().map_or("", Response::command_tag)
    }

    pub fn column_name(&self, field: usize) -> Result<&str> {
        Ok(&self.column(field)?.name)
    }

    pub fn column_type(&self, field: usize) -> Result<Oid> {
        Ok(self.column(field)?.type_oid)
    }

    fn column(&self, field: usize) -> Result<&crate::response::Column> {
        self.response
            .as_ref()
            .and_then(|r| r.columns().get(field))
            .ok_or(Error::OutOfRange {
                row: 0,
                field,
                rows: self.records_size(),
                fields: self.field_count(),
            })
    }
}

/// Parse the row count text of a command tag. Empty or malformed text is 0.
pub fn parse_affected_rows(text: &str) -> u64 {
    text.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;
    use crate::sqlstate::ErrorKind;

    fn people() -> Response {
        Response::tuples(
            &[("id", oid::INT8), ("name", oid::TEXT), ("score", oid::FLOAT8)],
            &[
                &[Some("1"), Some("alice"), Some("9.5")],
                &[Some("2"), None, Some("oops")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_affected_rows() {
        assert_eq!(parse_affected_rows("0"), 0);
        assert_eq!(parse_affected_rows("42"), 42);
        assert_eq!(parse_affected_rows(""), 0);
        assert_eq!(parse_affected_rows("x"), 0);
    }

    #[test]
    fn test_empty_result() {
        let result = QueryResult::new();
        assert_eq!(result.status(), ExecStatus::EmptyQuery);
        assert_eq!(result.records_size(), 0);
        assert_eq!(result.field_count(), 0);
        assert_eq!(result.affected_rows(), 0);
        assert!(matches!(
            result.is_null(0, 0),
            Err(Error::OutOfRange { rows: 0, fields: 0, .. })
        ));
    }

    #[test]
    fn test_assign_rows() {
        let mut result = QueryResult::new();
        result.assign(people(), "SELECT * FROM people").unwrap();

        assert_eq!(result.status(), ExecStatus::TuplesOk);
        assert_eq!(result.records_size(), 2);
        assert_eq!(result.field_count(), 3);
        assert_eq!(result.column_name(1).unwrap(), "name");
        assert_eq!(result.column_type(2).unwrap(), oid::FLOAT8);

        assert_eq!(result.get_value::<i64>(1, 0).unwrap(), 2);
        assert_eq!(result.get_str(0, 1).unwrap(), "alice");
        assert_eq!(result.length(0, 1).unwrap(), 5);
        assert!(result.is_null(1, 1).unwrap());
        assert_eq!(result.get_str(1, 1).unwrap(), "");
        assert_eq!(result.length(1, 1).unwrap(), 0);
        assert_eq!(result.get_value::<f64>(0, 2).unwrap(), 9.5);
        assert!(result.get_value::<f64>(1, 2).unwrap().is_nan());
        assert_eq!(result.get_bytes(0, 0).unwrap(), b"1");
    }

    #[test]
    fn test_out_of_range() {
        let mut result = QueryResult::new();
        result.assign(people(), "SELECT * FROM people").unwrap();
        assert!(matches!(
            result.get_str(2, 0),
            Err(Error::OutOfRange {
                row: 2,
                field: 0,
                rows: 2,
                fields: 3
            })
        ));
        assert!(matches!(
            result.column_name(3),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_assign_command() {
        let mut result = QueryResult::new();
        result
            .assign(Response::command("INSERT 0 3"), "INSERT ...")
            .unwrap();
        assert_eq!(result.status(), ExecStatus::CommandOk);
        assert_eq!(result.cmd_tuples(), "3");
        assert_eq!(result.affected_rows(), 3);
        assert_eq!(result.records_size(), 0);
    }

    #[test]
    fn test_assign_error_releases_previous() {
        let mut result = QueryResult::new();
        result.assign(people(), "SELECT * FROM people").unwrap();

        let fields = ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("23505".into()),
            message: Some("duplicate key".into()),
            ..Default::default()
        };
        let err = result
            .assign(Response::fatal(fields), "INSERT INTO people VALUES (1)")
            .unwrap_err();

        assert!(err.is(ErrorKind::IntegrityConstraintViolation));
        assert_eq!(
            err.as_db_error().unwrap().query(),
            Some("INSERT INTO people VALUES (1)")
        );
        assert!(result.is_empty());
        assert_eq!(result.records_size(), 0);
    }

    #[test]
    fn test_error_status_without_fields() {
        let mut result = QueryResult::new();
        let err = result
            .assign(Response::new(ExecStatus::BadResponse), "SELECT 1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SqlError);
        assert!(err.to_string().contains("PGRES_BAD_RESPONSE"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut result = QueryResult::new();
        result.assign(people(), "SELECT 1").unwrap();
        result.clear();
        result.clear();
        assert_eq!(result.status(), ExecStatus::EmptyQuery);
    }
}
