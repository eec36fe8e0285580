//! The part of the PostgreSQL protocol (version 3.0) the bundled driver speaks.
//!
//! - `frontend`: messages to the server, always with text parameters
//! - `backend`: messages from the server, decoded into `Response` pieces
//! - `codec`: payload reader and message framing
//! - `password`: MD5 and SCRAM-SHA-256 password exchange
//! - `types`: OIDs and the transaction status

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod password;
pub mod types;

pub use backend::{Authentication, BackendMessage};
pub use frontend::FrontendMessage;
pub use types::{Oid, TransactionStatus};
