//! Messages the driver sends to the server.
//!
//! Parameters are always sent in text format and every result column is
//! requested in text format, which is what [`Response`](crate::Response)
//! stores.

use crate::error::Result;

use super::codec::{MessageWriter, count_of, length_of};
use super::types::Oid;

/// Protocol version 3.0
const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// Request code of SSLRequest
const SSL_REQUEST_CODE: i32 = 80_877_103;

/// Format code for text
const TEXT_FORMAT: i16 = 0;

/// A frontend message.
#[derive(Debug, Clone, Copy)]
pub enum FrontendMessage<'a> {
    /// Asks the server to switch the socket to TLS before startup.
    SslRequest,
    /// Opens the session with `(name, value)` settings.
    Startup { params: &'a [(&'a str, &'a str)] },
    /// Cleartext or MD5-hashed password.
    Password(&'a str),
    /// First SASL message naming the chosen mechanism.
    SaslInitialResponse { mechanism: &'a str, data: &'a [u8] },
    /// Further SASL data.
    SaslResponse(&'a [u8]),
    /// One or more statements through the simple query protocol.
    Query(&'a str),
    /// Creates the prepared statement `name`. Empty `param_types` lets the
    /// server infer every parameter type.
    Parse {
        name: &'a str,
        sql: &'a str,
        param_types: &'a [Oid],
    },
    /// Binds text parameters of `statement` to the unnamed portal.
    Bind {
        statement: &'a str,
        params: &'a [Option<&'a str>],
    },
    /// Asks for the row description of the unnamed portal.
    DescribePortal,
    /// Runs the unnamed portal to completion.
    Execute,
    /// Ends an extended query cycle.
    Sync,
    /// Aborts a COPY FROM STDIN.
    CopyFail(&'a str),
    /// Closes the session.
    Terminate,
}

impl FrontendMessage<'_> {
    /// Append the framed message to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut msg = match self {
            FrontendMessage::SslRequest | FrontendMessage::Startup { .. } => {
                MessageWriter::untagged(buf)
            }
            other => MessageWriter::tagged(buf, other.tag()),
        };
        match *self {
            FrontendMessage::SslRequest => {
                msg.i32(SSL_REQUEST_CODE);
            }
            FrontendMessage::Startup { params } => {
                msg.i32(PROTOCOL_VERSION);
                for (name, value) in params {
                    msg.cstr(name).cstr(value);
                }
                msg.u8(0);
            }
            FrontendMessage::Password(password) => {
                msg.cstr(password);
            }
            FrontendMessage::SaslInitialResponse { mechanism, data } => {
                msg.cstr(mechanism).i32(length_of(data.len())?).bytes(data);
            }
            FrontendMessage::SaslResponse(data) => {
                msg.bytes(data);
            }
            FrontendMessage::Query(sql) | FrontendMessage::CopyFail(sql) => {
                msg.cstr(sql);
            }
            FrontendMessage::Parse {
                name,
                sql,
                param_types,
            } => {
                msg.cstr(name).cstr(sql).i16(count_of(param_types.len())?);
                for &oid in param_types {
                    msg.bytes(&oid.to_be_bytes());
                }
            }
            FrontendMessage::Bind { statement, params } => {
                // Unnamed portal, one format code for all parameters
                msg.cstr("").cstr(statement).i16(1).i16(TEXT_FORMAT);
                msg.i16(count_of(params.len())?);
                for param in params {
                    msg.value(param.map(str::as_bytes))?;
                }
                // No result format codes: every column in text
                msg.i16(0);
            }
            FrontendMessage::DescribePortal => {
                msg.u8(b'P').cstr("");
            }
            FrontendMessage::Execute => {
                msg.cstr("").i32(0);
            }
            FrontendMessage::Sync | FrontendMessage::Terminate => {}
        }
        msg.finish()
    }

    fn tag(&self) -> u8 {
        match self {
            FrontendMessage::Password(_)
            | FrontendMessage::SaslInitialResponse { .. }
            | FrontendMessage::SaslResponse(_) => b'p',
            FrontendMessage::Query(_) => b'Q',
            FrontendMessage::Parse { .. } => b'P',
            FrontendMessage::Bind { .. } => b'B',
            FrontendMessage::DescribePortal => b'D',
            FrontendMessage::Execute => b'E',
            FrontendMessage::Sync => b'S',
            FrontendMessage::CopyFail(_) => b'f',
            FrontendMessage::Terminate => b'X',
            FrontendMessage::SslRequest | FrontendMessage::Startup { .. } => 0,
        }
    }
}

/// Encode `messages` into `buf`, replacing its contents.
pub fn encode_all(buf: &mut Vec<u8>, messages: &[FrontendMessage<'_>]) -> Result<()> {
    buf.clear();
    for message in messages {
        message.encode(buf)?;
    }
    Ok(())
}
