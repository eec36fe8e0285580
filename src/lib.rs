//! PostgreSQL connector for a type-safe SQL query builder.
//!
//! The query builder produces finished SQL text and a flat list of
//! parameters. This crate runs that SQL on a server:
//!
//! - **Prepared statements**: uniquely named per connection, deallocated on drop
//! - **Text parameters**: bool, integers, floats, text, dates, timestamps, UUIDs
//! - **Typed results**: a row cursor decoding text fields on demand
//! - **Error taxonomy**: server errors classified by SQLSTATE into a hierarchy
//!   that can be matched at any level
//!
//! The server is reached through the [`Driver`] trait. [`WireDriver`] is the
//! bundled blocking implementation of the PostgreSQL protocol.
//!
//! # Example
//!
//! ```no_run
//! use sqlpp_postgres::{Connection, ErrorKind, Opts};
//!
//! fn main() -> sqlpp_postgres::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         dbname: "mydb".into(),
//!         password: "secret".into(),
//!         ..Default::default()
//!     };
//!
//!     let mut conn = Connection::new(opts)?;
//!
//!     let mut insert = conn.prepare("INSERT INTO users (id, name) VALUES ($1, $2)", 2)?;
//!     insert.bind_integral_parameter(0, 1, false)?;
//!     insert.bind_text_parameter(1, "alice", false)?;
//!     match conn.run_prepared_insert(&mut insert) {
//!         Ok(n) => println!("inserted {} row(s)", n),
//!         Err(e) if e.is(ErrorKind::IntegrityConstraintViolation) => println!("exists"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     let mut rows = conn.select("SELECT id, name FROM users")?;
//!     while rows.next() {
//!         let id = rows.bind_integral_result(0)?.value;
//!         let name = rows.bind_text_result(1)?.value;
//!         println!("{}: {}", id, name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bind_result;
mod buffer_set;
pub mod connection;
pub mod conversion;
pub mod datetime;
pub mod driver;
pub mod error;
pub mod opts;
pub mod protocol;
pub mod response;
pub mod result;
pub mod sqlstate;
pub mod state;
pub mod statement;

pub use bind_result::{BindResult, FieldValue};
pub use buffer_set::BufferSet;
pub use connection::{Connection, IsolationLevel};
pub use conversion::{FromText, ToParam};
pub use driver::{ConnStatus, Driver, WireDriver};
pub use error::{DbError, Error, ErrorFields, Result};
pub use opts::{Opts, SslMode};
pub use protocol::types::{Oid, TransactionStatus};
pub use response::{Column, ExecStatus, Response};
pub use result::{QueryResult, parse_affected_rows};
pub use sqlstate::{ErrorKind, classify};
pub use statement::{CursorState, PreparedStatementHandle as PreparedStatement, StatementHandle};
