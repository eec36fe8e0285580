//! Simple query protocol state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::frontend::encode_all;
use crate::protocol::{BackendMessage, FrontendMessage, TransactionStatus};
use crate::response::{ExecStatus, Response};

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// What the collector did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collected {
    /// Message consumed, read the next one
    Read,
    /// A reply was queued in the write buffer
    WriteAndRead,
    /// ReadyForQuery received
    Ready,
    /// Not a result message; carries the message name
    Unhandled(&'static str),
}

/// Builds `Response`s from the result messages of one query cycle.
///
/// When several statements produce results, the last one wins. After an
/// ErrorResponse everything up to ReadyForQuery is discarded.
#[derive(Debug, Default)]
pub(crate) struct ResponseCollector {
    pending: Option<Response>,
    last: Option<Response>,
    failed: bool,
    transaction_status: TransactionStatus,
}

impl ResponseCollector {
    pub(crate) fn collect(
        &mut self,
        message: BackendMessage<'_>,
        write_buffer: &mut Vec<u8>,
    ) -> Result<Collected> {
        match message {
            BackendMessage::ReadyForQuery(status) => {
                self.transaction_status = status;
                return Ok(Collected::Ready);
            }
            BackendMessage::ErrorResponse(fields) => {
                self.pending = None;
                self.last = Some(Response::fatal(fields));
                self.failed = true;
                return Ok(Collected::Read);
            }
            _ if self.failed => return Ok(Collected::Read),
            BackendMessage::RowDescription(columns) => {
                let mut response = Response::new(ExecStatus::TuplesOk);
                response.set_columns(columns);
                self.pending = Some(response);
            }
            BackendMessage::DataRow(values) => {
                let response = self.pending.as_mut().ok_or_else(|| {
                    Error::Protocol("DataRow received without RowDescription".into())
                })?;
                response.push_row(&values)?;
            }
            BackendMessage::CommandComplete(tag) => {
                let response = match self.pending.take() {
                    Some(mut response) => {
                        response.set_command_tag(tag);
                        response
                    }
                    None => Response::command(tag),
                };
                self.last = Some(response);
            }
            BackendMessage::EmptyQueryResponse => {
                self.pending = None;
                self.last = Some(Response::new(ExecStatus::EmptyQuery));
            }
            BackendMessage::CopyInResponse | BackendMessage::CopyBothResponse => {
                encode_all(
                    write_buffer,
                    &[FrontendMessage::CopyFail("COPY FROM STDIN is not supported")],
                )?;
                return Ok(Collected::WriteAndRead);
            }
            BackendMessage::CopyOutResponse => {
                self.pending = Some(Response::new(ExecStatus::CopyOut));
            }
            BackendMessage::CopyData | BackendMessage::CopyDone => {}
            other => return Ok(Collected::Unhandled(other.name())),
        }
        Ok(Collected::Read)
    }

    /// Mark the cycle as failed with a result of its own.
    pub(crate) fn set_last(&mut self, response: Response) {
        self.last = Some(response);
    }

    pub(crate) fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Take the final response of the cycle.
    pub(crate) fn finish(&mut self) -> Response {
        self.last
            .take()
            .unwrap_or_else(|| Response::new(ExecStatus::EmptyQuery))
    }
}

/// Simple query state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingResponse,
    Finished,
}

/// Simple query protocol state machine.
///
/// Runs one Query message, possibly containing several statements, and
/// produces the `Response` of the last one.
pub struct SimpleQueryStateMachine {
    state: State,
    collector: ResponseCollector,
}

impl SimpleQueryStateMachine {
    /// Create a new simple query state machine.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            collector: ResponseCollector::default(),
        }
    }

    /// Start the query.
    pub fn start(&mut self, buffer_set: &mut BufferSet, query: &str) -> Result<Action> {
        encode_all(&mut buffer_set.write_buffer, &[FrontendMessage::Query(query)])?;
        self.state = State::WaitingResponse;
        Ok(Action::WriteAndReadMessage)
    }

    /// Take the response once the machine has finished.
    pub fn take_response(&mut self) -> Response {
        self.collector.finish()
    }
}

impl Default for SimpleQueryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for SimpleQueryStateMachine {
    /// Process a message from the server.
    ///
    /// The caller should:
    /// 1. Read the message type byte and payload into buffer_set.read_buffer
    /// 2. Set buffer_set.type_byte to the message type
    /// 3. Call this method
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if self.state != State::WaitingResponse {
            return Err(Error::Protocol(format!(
                "Unexpected state {:?}",
                self.state
            )));
        }

        let message = BackendMessage::parse(buffer_set.type_byte, &buffer_set.read_buffer)?;
        let message = match AsyncMessage::try_from(message) {
            Ok(msg) => return Ok(Action::HandleAsyncMessageAndReadMessage(msg)),
            Err(message) => message,
        };

        match self.collector.collect(message, &mut buffer_set.write_buffer)? {
            Collected::Read => Ok(Action::ReadMessage),
            Collected::WriteAndRead => Ok(Action::WriteAndReadMessage),
            Collected::Ready => {
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            Collected::Unhandled(name) => Err(Error::Protocol(format!(
                "unexpected {name} in query response"
            ))),
        }
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.collector.transaction_status()
    }
}
