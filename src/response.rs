//! Native response objects produced by a [`Driver`](crate::driver::Driver).
//!
//! A `Response` is the complete outcome of one driver call: an execution
//! status, column descriptions, the rows in text format, the command tag and,
//! for failed statements, the server's error fields.

use std::ops::Range;

use crate::error::{Error, ErrorFields, Result};
use crate::protocol::types::Oid;

/// Execution status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// The query string was empty
    EmptyQuery,
    /// A command that returns no rows completed
    CommandOk,
    /// A query that returns rows completed
    TuplesOk,
    /// Copy Out data transfer started
    CopyOut,
    /// Copy In data transfer started
    CopyIn,
    /// Copy In/Out data transfer started
    CopyBoth,
    /// The server's response was not understood
    BadResponse,
    /// A notice or warning occurred
    NonfatalError,
    /// The statement failed
    FatalError,
    /// A single row of a larger result
    SingleTuple,
}

impl ExecStatus {
    /// Returns true for statuses that are classified as failures.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ExecStatus::BadResponse | ExecStatus::NonfatalError | ExecStatus::FatalError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecStatus::EmptyQuery => "PGRES_EMPTY_QUERY",
            ExecStatus::CommandOk => "PGRES_COMMAND_OK",
            ExecStatus::TuplesOk => "PGRES_TUPLES_OK",
            ExecStatus::CopyOut => "PGRES_COPY_OUT",
            ExecStatus::CopyIn => "PGRES_COPY_IN",
            ExecStatus::CopyBoth => "PGRES_COPY_BOTH",
            ExecStatus::BadResponse => "PGRES_BAD_RESPONSE",
            ExecStatus::NonfatalError => "PGRES_NONFATAL_ERROR",
            ExecStatus::FatalError => "PGRES_FATAL_ERROR",
            ExecStatus::SingleTuple => "PGRES_SINGLE_TUPLE",
        }
    }
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type OID
    pub type_oid: Oid,
}

impl Column {
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
        }
    }
}

/// Outcome of a single statement.
///
/// Cell values are stored back to back in one buffer; `cells` holds a range
/// per cell in row-major order, `None` for NULL.
#[derive(Debug, Clone)]
pub struct Response {
    status: ExecStatus,
    columns: Vec<Column>,
    data: Vec<u8>,
    cells: Vec<Option<Range<usize>>>,
    rows: usize,
    command_tag: String,
    error: Option<ErrorFields>,
}

impl Response {
    /// Create an empty response with the given status.
    pub fn new(status: ExecStatus) -> Self {
        Self {
            status,
            columns: Vec::new(),
            data: Vec::new(),
            cells: Vec::new(),
            rows: 0,
            command_tag: String::new(),
            error: None,
        }
    }

    /// Completed command without rows, such as `"INSERT 0 1"`.
    pub fn command(tag: &str) -> Self {
        let mut response = Self::new(ExecStatus::CommandOk);
        response.command_tag = tag.to_string();
        response
    }

    /// Failed statement carrying the server's error fields.
    pub fn fatal(fields: ErrorFields) -> Self {
        let mut response = Self::new(ExecStatus::FatalError);
        response.error = Some(fields);
        response
    }

    /// Row-returning result built from text cells.
    ///
    /// The command tag is set to `SELECT <n>`.
    pub fn tuples(columns: &[(&str, Oid)], rows: &[&[Option<&str>]]) -> Result<Self> {
        let mut response = Self::new(ExecStatus::TuplesOk);
        response.set_columns(
            columns
                .iter()
                .map(|&(name, oid)| Column::new(name, oid))
                .collect(),
        );
        for row in rows {
            let cells: Vec<Option<&[u8]>> = row.iter().map(|c| c.map(str::as_bytes)).collect();
            response.push_row(&cells)?;
        }
        response.command_tag = format!("SELECT {}", response.rows);
        Ok(response)
    }

    pub fn status(&self) -> ExecStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ExecStatus) {
        self.status = status;
    }

    /// Replace the column descriptions, discarding any rows.
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns;
        self.data.clear();
        self.cells.clear();
        self.rows = 0;
    }

    /// Append a row of text cells.
    pub fn push_row(&mut self, values: &[Option<&[u8]>]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::Protocol(format!(
                "DataRow has {} columns, RowDescription has {}",
                values.len(),
                self.columns.len()
            )));
        }
        for value in values {
            let cell = value.map(|bytes| {
                let start = self.data.len();
                self.data.extend_from_slice(bytes);
                start..self.data.len()
            });
            self.cells.push(cell);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn set_command_tag(&mut self, tag: &str) {
        self.command_tag.clear();
        self.command_tag.push_str(tag);
    }

    pub fn set_error(&mut self, fields: ErrorFields) {
        self.error = Some(fields);
    }

    /// Number of rows.
    pub fn ntuples(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn nfields(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Cell at `(row, field)`.
    ///
    /// Returns `None` when out of bounds and `Some(None)` for NULL.
    pub fn get(&self, row: usize, field: usize) -> Option<Option<&[u8]>> {
        if row >= self.rows || field >= self.columns.len() {
            return None;
        }
        let cell = self.cells.get(row * self.columns.len() + field)?;
        Some(cell.as_ref().and_then(|range| self.data.get(range.clone())))
    }

    /// Command tag of the completed statement, such as `"UPDATE 3"`.
    pub fn command_tag(&self) -> &str {
        &self.command_tag
    }

    /// Row count text of the command tag, or `""` when the command reports none.
    pub fn cmd_tuples(&self) -> &str {
        let tag = self.command_tag.as_str();
        let mut words = tag.split(' ');
        let count = match words.next() {
            Some("INSERT") => words.nth(1),
            Some("SELECT" | "UPDATE" | "DELETE" | "MERGE" | "MOVE" | "FETCH" | "COPY") => {
                words.next()
            }
            _ => None,
        };
        match count {
            Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => n,
            _ => "",
        }
    }

    pub fn error_fields(&self) -> Option<&ErrorFields> {
        self.error.as_ref()
    }

    pub fn into_error_fields(self) -> Option<ErrorFields> {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_tuples_cells() {
        let response = Response::tuples(
            &[("id", oid::INT4), ("name", oid::TEXT)],
            &[&[Some("1"), Some("alice")], &[Some("2"), None]],
        )
        .unwrap();

        assert_eq!(response.status(), ExecStatus::TuplesOk);
        assert_eq!(response.ntuples(), 2);
        assert_eq!(response.nfields(), 2);
        assert_eq!(response.get(0, 1), Some(Some(&b"alice"[..])));
        assert_eq!(response.get(1, 1), Some(None));
        assert_eq!(response.get(2, 0), None);
        assert_eq!(response.get(0, 2), None);
        assert_eq!(response.cmd_tuples(), "2");
    }

    #[test]
    fn test_push_row_column_mismatch() {
        let mut response = Response::new(ExecStatus::TuplesOk);
        response.set_columns(vec![Column::new("a", oid::INT4)]);
        assert!(response.push_row(&[None, None]).is_err());
    }

    #[test]
    fn test_cmd_tuples() {
        assert_eq!(Response::command("INSERT 0 3").cmd_tuples(), "3");
        assert_eq!(Response::command("UPDATE 42").cmd_tuples(), "42");
        assert_eq!(Response::command("DELETE 0").cmd_tuples(), "0");
        assert_eq!(Response::command("MOVE 7").cmd_tuples(), "7");
        assert_eq!(Response::command("CREATE TABLE").cmd_tuples(), "");
        assert_eq!(Response::command("BEGIN").cmd_tuples(), "");
        assert_eq!(Response::command("").cmd_tuples(), "");
    }

    #[test]
    fn test_error_status() {
        assert!(ExecStatus::FatalError.is_error());
        assert!(ExecStatus::BadResponse.is_error());
        assert!(!ExecStatus::EmptyQuery.is_error());
        assert!(!ExecStatus::CopyIn.is_error());
        assert_eq!(ExecStatus::TuplesOk.to_string(), "PGRES_TUPLES_OK");
    }
}
