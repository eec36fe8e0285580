//! The native client driver interface.
//!
//! The connector talks to the server only through [`Driver`]: simple query,
//! prepare, execute prepared with text parameters, server parameter lookup,
//! connection status and finish. [`wire::WireDriver`] is the bundled
//! implementation; anything else (test doubles, an externally loaded client
//! library) plugs in through [`Connection::with_driver`](crate::Connection::with_driver).

mod stream;
pub mod wire;

pub use wire::WireDriver;

use crate::error::{Error, Result};
use crate::protocol::types::Oid;
use crate::response::Response;

/// Health of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Ok,
    Bad,
}

/// Native client operations used by the connector.
///
/// Server-side failures of a statement are reported inside the returned
/// `Response` (status `FatalError` plus error fields). An `Err` means the
/// request could not be carried out at all, typically because the
/// connection is gone.
pub trait Driver {
    /// Current connection status.
    fn status(&self) -> ConnStatus;

    /// Run one or more SQL statements; the response of the last one is returned.
    fn exec(&mut self, sql: &str) -> Result<Response>;

    /// Create the prepared statement `name` for `sql`.
    ///
    /// An empty `param_types` lets the server infer every parameter type.
    fn prepare(&mut self, name: &str, sql: &str, param_types: &[Oid]) -> Result<Response>;

    /// Execute the prepared statement `name` with text parameters; `None` is NULL.
    fn exec_prepared(&mut self, name: &str, params: &[Option<&str>]) -> Result<Response>;

    /// Value of a server parameter reported with ParameterStatus.
    fn parameter_status(&self, name: &str) -> Option<&str>;

    /// Close the connection. Further calls fail.
    fn finish(&mut self);

    /// Escape `text` for inclusion in a single-quoted string literal.
    ///
    /// Single quotes are doubled. Backslashes are doubled too unless the
    /// server reports `standard_conforming_strings = on`.
    fn escape_string(&self, text: &str) -> Result<String> {
        if text.contains('\0') {
            return Err(Error::InvalidUsage(
                "string to escape contains a NUL byte".into(),
            ));
        }
        let double_backslash = self.parameter_status("standard_conforming_strings") != Some("on");

        let mut escaped = String::with_capacity(text.len() + 2);
        for c in text.chars() {
            match c {
                '\'' => escaped.push_str("''"),
                '\\' if double_backslash => escaped.push_str("\\\\"),
                c => escaped.push(c),
            }
        }
        Ok(escaped)
    }
}
