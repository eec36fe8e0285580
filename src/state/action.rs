//! Action types for state machine I/O requests.

use crate::error::ErrorFields;
use crate::protocol::BackendMessage;

/// Action requested by a state machine.
///
/// The caller performs the requested I/O on the connection's `BufferSet` and
/// then calls `step()` again.
#[derive(Debug)]
pub enum Action {
    /// Write `buffer_set.write_buffer` to the server, then read a single byte
    /// into `buffer_set.type_byte`.
    ///
    /// Used for SSL negotiation: write SSL request, then read response ('S' or 'N').
    WriteAndReadByte,

    /// Read a PostgreSQL message from the server.
    ///
    /// The caller should:
    /// 1. Read the message type byte (1 byte)
    /// 2. Read the length (4 bytes, big-endian i32)
    /// 3. Read (length - 4) bytes of payload into the buffer set
    /// 4. Call the state machine's `step()` method again
    ReadMessage,

    /// Write `buffer_set.write_buffer` to the server, then read a message.
    WriteAndReadMessage,

    /// Perform TLS handshake.
    ///
    /// After successful handshake, call `step()` again.
    TlsHandshake,

    /// An asynchronous message was received.
    ///
    /// The caller should handle the message, read the next message,
    /// then call `step()` again.
    HandleAsyncMessageAndReadMessage(AsyncMessage),

    /// The state machine has finished successfully.
    Finished,
}

/// Asynchronous message from the server.
///
/// These can arrive at any time during query execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ErrorFields),

    /// Server parameter value changed.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}

impl<'a> TryFrom<BackendMessage<'a>> for AsyncMessage {
    type Error = BackendMessage<'a>;

    /// Split off the messages that may arrive at any time; any other
    /// message is handed back.
    fn try_from(message: BackendMessage<'a>) -> Result<Self, Self::Error> {
        match message {
            BackendMessage::NoticeResponse(fields) => Ok(AsyncMessage::Notice(fields)),
            BackendMessage::ParameterStatus { name, value } => Ok(AsyncMessage::ParameterChanged {
                name: name.to_string(),
                value: value.to_string(),
            }),
            BackendMessage::NotificationResponse {
                pid,
                channel,
                payload,
            } => Ok(AsyncMessage::Notification {
                pid,
                channel: channel.to_string(),
                payload: payload.to_string(),
            }),
            other => Err(other),
        }
    }
}
