//! Messages the server sends to the driver.
//!
//! [`BackendMessage::parse`] turns a type byte and payload into a typed
//! message borrowing from the payload. Result columns come out as
//! [`Column`]s and row values as text slices, ready for [`Response`].
//!
//! [`Response`]: crate::Response

use tracing::debug;

use crate::error::{Error, ErrorFields, Result};
use crate::response::Column;

use super::codec::Reader;
use super::types::TransactionStatus;

/// Authentication request from the server.
#[derive(Debug, PartialEq, Eq)]
pub enum Authentication<'a> {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    /// SASL mechanisms offered by the server
    Sasl(Vec<&'a str>),
    SaslContinue(&'a [u8]),
    SaslFinal(&'a [u8]),
    /// Kerberos, GSSAPI, SSPI and other methods the driver cannot answer
    Unsupported(i32),
}

impl<'a> Authentication<'a> {
    fn parse(mut reader: Reader<'a>) -> Result<Self> {
        Ok(match reader.i32()? {
            0 => Authentication::Ok,
            3 => Authentication::CleartextPassword,
            5 => {
                let mut salt = [0u8; 4];
                salt.copy_from_slice(reader.bytes(4)?);
                Authentication::Md5Password { salt }
            }
            10 => {
                let mut mechanisms = Vec::new();
                loop {
                    let mechanism = reader.cstr()?;
                    if mechanism.is_empty() {
                        break;
                    }
                    mechanisms.push(mechanism);
                }
                Authentication::Sasl(mechanisms)
            }
            11 => Authentication::SaslContinue(reader.rest()),
            12 => Authentication::SaslFinal(reader.rest()),
            other => Authentication::Unsupported(other),
        })
    }
}

/// A backend message.
#[derive(Debug)]
pub enum BackendMessage<'a> {
    Authentication(Authentication<'a>),
    BackendKeyData { pid: u32, secret: u32 },
    ParameterStatus { name: &'a str, value: &'a str },
    ReadyForQuery(TransactionStatus),
    RowDescription(Vec<Column>),
    /// Values of one row; `None` is NULL
    DataRow(Vec<Option<&'a [u8]>>),
    CommandComplete(&'a str),
    EmptyQueryResponse,
    ErrorResponse(ErrorFields),
    NoticeResponse(ErrorFields),
    NotificationResponse {
        pid: u32,
        channel: &'a str,
        payload: &'a str,
    },
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    ParameterDescription,
    PortalSuspended,
    CopyInResponse,
    CopyOutResponse,
    CopyBothResponse,
    CopyData,
    CopyDone,
    /// The server only speaks an older minor protocol version
    NegotiateProtocolVersion { minor: i32 },
}

impl<'a> BackendMessage<'a> {
    /// Decode the message with type byte `tag`.
    pub fn parse(tag: u8, payload: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(message_name(tag), payload);
        let message = match tag {
            b'R' => BackendMessage::Authentication(Authentication::parse(reader)?),
            b'K' => BackendMessage::BackendKeyData {
                pid: reader.u32()?,
                secret: reader.u32()?,
            },
            b'S' => BackendMessage::ParameterStatus {
                name: reader.cstr()?,
                value: reader.cstr()?,
            },
            b'Z' => {
                let byte = reader.u8()?;
                let status = TransactionStatus::from_byte(byte).ok_or_else(|| {
                    Error::Protocol(format!(
                        "ReadyForQuery: unknown transaction status {:?}",
                        char::from(byte)
                    ))
                })?;
                BackendMessage::ReadyForQuery(status)
            }
            b'T' => BackendMessage::RowDescription(columns(reader)?),
            b'D' => BackendMessage::DataRow(values(reader)?),
            b'C' => BackendMessage::CommandComplete(reader.cstr()?),
            b'I' => BackendMessage::EmptyQueryResponse,
            b'E' => BackendMessage::ErrorResponse(error_fields(reader)?),
            b'N' => BackendMessage::NoticeResponse(error_fields(reader)?),
            b'A' => BackendMessage::NotificationResponse {
                pid: reader.u32()?,
                channel: reader.cstr()?,
                payload: reader.cstr()?,
            },
            b'1' => BackendMessage::ParseComplete,
            b'2' => BackendMessage::BindComplete,
            b'3' => BackendMessage::CloseComplete,
            b'n' => BackendMessage::NoData,
            b't' => BackendMessage::ParameterDescription,
            b's' => BackendMessage::PortalSuspended,
            b'G' => BackendMessage::CopyInResponse,
            b'H' => BackendMessage::CopyOutResponse,
            b'W' => BackendMessage::CopyBothResponse,
            b'd' => BackendMessage::CopyData,
            b'c' => BackendMessage::CopyDone,
            b'v' => BackendMessage::NegotiateProtocolVersion {
                minor: reader.i32()?,
            },
            other => {
                return Err(Error::Protocol(format!(
                    "unknown message type {:?}",
                    char::from(other)
                )));
            }
        };
        Ok(message)
    }

    /// Name of the message as the protocol documentation spells it.
    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::Authentication(_) => "Authentication",
            BackendMessage::BackendKeyData { .. } => "BackendKeyData",
            BackendMessage::ParameterStatus { .. } => "ParameterStatus",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::NotificationResponse { .. } => "NotificationResponse",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CloseComplete => "CloseComplete",
            BackendMessage::NoData => "NoData",
            BackendMessage::ParameterDescription => "ParameterDescription",
            BackendMessage::PortalSuspended => "PortalSuspended",
            BackendMessage::CopyInResponse => "CopyInResponse",
            BackendMessage::CopyOutResponse => "CopyOutResponse",
            BackendMessage::CopyBothResponse => "CopyBothResponse",
            BackendMessage::CopyData => "CopyData",
            BackendMessage::CopyDone => "CopyDone",
            BackendMessage::NegotiateProtocolVersion { .. } => "NegotiateProtocolVersion",
        }
    }
}

fn message_name(tag: u8) -> &'static str {
    match tag {
        b'R' => "Authentication",
        b'K' => "BackendKeyData",
        b'S' => "ParameterStatus",
        b'Z' => "ReadyForQuery",
        b'T' => "RowDescription",
        b'D' => "DataRow",
        b'C' => "CommandComplete",
        b'E' => "ErrorResponse",
        b'N' => "NoticeResponse",
        b'A' => "NotificationResponse",
        b'v' => "NegotiateProtocolVersion",
        _ => "message",
    }
}

fn columns(mut reader: Reader<'_>) -> Result<Vec<Column>> {
    let count = reader.u16()?;
    let mut columns = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = reader.cstr()?;
        // table oid, attribute number
        reader.bytes(6)?;
        let type_oid = reader.u32()?;
        // type size, type modifier
        reader.bytes(6)?;
        if reader.u16()? != 0 {
            return Err(Error::Protocol(format!(
                "RowDescription: column {name} is not in text format"
            )));
        }
        columns.push(Column::new(name, type_oid));
    }
    Ok(columns)
}

fn values<'a>(mut reader: Reader<'a>) -> Result<Vec<Option<&'a [u8]>>> {
    let count = reader.u16()?;
    (0..count)
        .map(|_| {
            let len = reader.i32()?;
            // A negative length is NULL
            match usize::try_from(len) {
                Ok(len) => reader.bytes(len).map(Some),
                Err(_) => Ok(None),
            }
        })
        .collect()
}

fn error_fields(mut reader: Reader<'_>) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    loop {
        let code = reader.u8()?;
        if code == 0 {
            return Ok(fields);
        }
        let value = reader.cstr()?;
        let number = || value.parse::<u32>().ok();
        let text = match code {
            b'P' => {
                fields.position = number();
                continue;
            }
            b'p' => {
                fields.internal_position = number();
                continue;
            }
            b'L' => {
                fields.line = number();
                continue;
            }
            b'S' => &mut fields.severity,
            b'V' => &mut fields.severity_non_localized,
            b'C' => &mut fields.code,
            b'M' => &mut fields.message,
            b'D' => &mut fields.detail,
            b'H' => &mut fields.hint,
            b'q' => &mut fields.internal_query,
            b'W' => &mut fields.where_,
            b's' => &mut fields.schema,
            b't' => &mut fields.table,
            b'c' => &mut fields.column,
            b'd' => &mut fields.data_type,
            b'n' => &mut fields.constraint,
            b'F' => &mut fields.file,
            b'R' => &mut fields.routine,
            other => {
                debug!(field = %char::from(other), "skipping unknown error field");
                continue;
            }
        };
        *text = Some(value.to_string());
    }
}
