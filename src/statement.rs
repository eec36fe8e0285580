//! Statement handles: executed results, cursor position and prepared
//! statement parameters.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, error};
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::conversion::ToParam;
use crate::error::{Error, Result};
use crate::response::Response;
use crate::result::QueryResult;

/// Position of the row cursor over a statement's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorState {
    /// `next()` has not been called since the last execution
    #[default]
    Unfetched,
    /// On row `count`
    Positioned,
    /// Past the last row
    Exhausted,
}

/// Result of an executed statement and the cursor walking it.
#[derive(Debug, Default)]
pub struct StatementHandle {
    result: QueryResult,
    count: usize,
    total_count: usize,
    fields: usize,
    cursor: CursorState,
    valid: bool,
    debug: bool,
}

impl StatementHandle {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            ..Default::default()
        }
    }

    /// Store the response of an execution of `query` and rewind the cursor.
    pub(crate) fn assign(&mut self, response: Response, query: &str) -> Result<()> {
        self.reset();
        self.result.assign(response, query)?;
        self.valid = true;
        Ok(())
    }

    /// Release the result and rewind the cursor.
    pub(crate) fn reset(&mut self) {
        self.result.clear();
        self.count = 0;
        self.total_count = 0;
        self.fields = 0;
        self.cursor = CursorState::Unfetched;
    }

    /// Move to the next row. Returns false once the rows are exhausted.
    pub(crate) fn advance(&mut self) -> bool {
        match self.cursor {
            CursorState::Unfetched => {
                self.total_count = self.result.records_size();
                self.fields = self.result.field_count();
                if self.total_count == 0 {
                    self.cursor = CursorState::Exhausted;
                    return false;
                }
                self.count = 0;
                self.cursor = CursorState::Positioned;
            }
            CursorState::Positioned if self.count + 1 < self.total_count => {
                self.count += 1;
            }
            _ => {
                self.cursor = CursorState::Exhausted;
                return false;
            }
        }
        if self.debug {
            debug!(row = self.count, rows = self.total_count, "cursor moved");
        }
        true
    }

    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    /// Index of the current row.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of rows, known once the cursor has been advanced.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Number of columns, known once the cursor has been advanced.
    pub fn fields(&self) -> usize {
        self.fields
    }

    pub fn cursor(&self) -> CursorState {
        self.cursor
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn debug(&self) -> bool {
        self.debug
    }
}

/// A server-side prepared statement and its parameter buffer.
///
/// The statement is created with a unique generated name. Parameters are
/// kept as text with a parallel NULL flag per slot. Dropping the handle
/// deallocates the statement on the server.
pub struct PreparedStatementHandle {
    base: StatementHandle,
    connection: Weak<RefCell<ConnectionHandle>>,
    name: String,
    query: String,
    null_values: Vec<bool>,
    param_values: Vec<String>,
}

impl PreparedStatementHandle {
    /// Allocate a statement name on `connection` for a statement with
    /// `param_count` parameters. All parameters start out NULL.
    pub(crate) fn new(connection: &Rc<RefCell<ConnectionHandle>>, param_count: usize) -> Self {
        let mut handle = connection.borrow_mut();
        let name = handle.allocate_statement_name();
        let debug = handle.debug();
        Self {
            base: StatementHandle::new(debug),
            connection: Rc::downgrade(connection),
            name,
            query: String::new(),
            null_values: vec![true; param_count],
            param_values: vec![String::new(); param_count],
        }
    }

    fn connection(&self) -> Result<Rc<RefCell<ConnectionHandle>>> {
        self.connection
            .upgrade()
            .ok_or_else(|| Error::BrokenConnection("connection has been closed".into()))
    }

    /// Create the statement on the server.
    ///
    /// A failed prepare releases the statement name. A handle is prepared
    /// at most once.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        if self.base.valid {
            return Err(Error::InvalidUsage(format!(
                "statement {} is already prepared",
                self.name
            )));
        }
        if self.name.is_empty() {
            return Err(Error::InvalidUsage(
                "statement name was released by a failed prepare".into(),
            ));
        }
        let connection = self.connection()?;
        let mut handle = connection.borrow_mut();
        self.query.clear();
        self.query.push_str(sql);
        if self.base.debug {
            debug!(name = %self.name, sql, "preparing statement");
        }

        let response = handle.driver_mut().prepare(&self.name, sql, &[]);
        let outcome = response.and_then(|r| self.base.assign(r, sql));
        if outcome.is_err() {
            self.base.valid = false;
            handle.release_statement_name(&self.name);
            self.name.clear();
        }
        outcome
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.param_values.len() {
            return Err(Error::InvalidUsage(format!(
                "parameter index {} out of range for statement with {} parameters",
                index,
                self.param_values.len()
            )));
        }
        Ok(())
    }

    /// Bind `value` to parameter `index`; `None` binds NULL.
    pub fn bind_parameter<T: ToParam + ?Sized>(
        &mut self,
        index: usize,
        value: Option<&T>,
    ) -> Result<()> {
        self.check_index(index)?;
        let offset = match value {
            Some(_) => Some(self.connection()?.borrow_mut().local_offset()),
            None => None,
        };
        let slot = &mut self.param_values[index];
        slot.clear();
        match value.zip(offset) {
            Some((value, offset)) => {
                value.to_param(slot, offset);
                self.null_values[index] = false;
            }
            None => self.null_values[index] = true,
        }
        if self.base.debug {
            debug!(index, value = %slot, is_null = self.null_values[index], "bound parameter");
        }
        Ok(())
    }

    pub fn bind_boolean_parameter(
        &mut self,
        index: usize,
        value: bool,
        is_null: bool,
    ) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(&value))
    }

    pub fn bind_integral_parameter(
        &mut self,
        index: usize,
        value: i64,
        is_null: bool,
    ) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(&value))
    }

    pub fn bind_floating_point_parameter(
        &mut self,
        index: usize,
        value: f64,
        is_null: bool,
    ) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(&value))
    }

    pub fn bind_text_parameter(&mut self, index: usize, value: &str, is_null: bool) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(value))
    }

    pub fn bind_date_parameter(
        &mut self,
        index: usize,
        value: NaiveDate,
        is_null: bool,
    ) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(&value))
    }

    /// Bind a timestamp, interpreted as local time.
    pub fn bind_date_time_parameter(
        &mut self,
        index: usize,
        value: NaiveDateTime,
        is_null: bool,
    ) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(&value))
    }

    pub fn bind_uuid_parameter(&mut self, index: usize, value: Uuid, is_null: bool) -> Result<()> {
        self.bind_parameter(index, (!is_null).then_some(&value))
    }

    /// Parameter values as sent to the server; `None` is NULL.
    pub fn parameters(&self) -> Vec<Option<&str>> {
        self.param_values
            .iter()
            .zip(&self.null_values)
            .map(|(value, &is_null)| (!is_null).then_some(value.as_str()))
            .collect()
    }

    /// Execute the statement with the bound parameters.
    ///
    /// The previous result is released and the cursor rewound before the
    /// statement runs.
    pub fn execute(&mut self) -> Result<()> {
        let connection = self.connection()?;
        self.base.reset();
        if !self.base.valid {
            return Err(Error::InvalidUsage(
                "statement has not been prepared".into(),
            ));
        }
        if self.base.debug {
            debug!(name = %self.name, params = self.param_values.len(), "executing statement");
        }

        let params = self.parameters();
        let response = connection
            .borrow_mut()
            .driver_mut()
            .exec_prepared(&self.name, &params)?;
        self.base.assign(response, &self.query)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn param_count(&self) -> usize {
        self.param_values.len()
    }

    pub fn is_valid(&self) -> bool {
        self.base.valid
    }

    pub fn result(&self) -> &QueryResult {
        &self.base.result
    }

    /// Returns true if this statement was prepared on `connection`.
    pub(crate) fn belongs_to(&self, connection: &Rc<RefCell<ConnectionHandle>>) -> bool {
        std::ptr::eq(self.connection.as_ptr(), Rc::as_ptr(connection))
    }

    pub(crate) fn handle_mut(&mut self) -> &mut StatementHandle {
        &mut self.base
    }
}

impl Drop for PreparedStatementHandle {
    fn drop(&mut self) {
        if self.name.is_empty() {
            return;
        }
        // The server session died with the connection.
        let Some(connection) = self.connection.upgrade() else {
            return;
        };
        let Ok(mut handle) = connection.try_borrow_mut() else {
            error!(name = %self.name, "connection is busy, cannot deallocate statement");
            return;
        };
        handle.release_statement_name(&self.name);
        if !self.base.valid {
            return;
        }

        let sql = format!("DEALLOCATE \"{}\"", self.name);
        if self.base.debug {
            debug!(name = %self.name, "deallocating statement");
        }
        match handle.driver_mut().exec(&sql) {
            Ok(response) if response.status().is_error() => {
                let fields = response.into_error_fields().unwrap_or_default();
                error!(name = %self.name, error = %fields, "failed to deallocate statement");
            }
            Ok(_) => {}
            Err(e) => error!(name = %self.name, error = %e, "failed to deallocate statement"),
        }
    }
}
