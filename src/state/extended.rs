//! Extended query protocol state machine.
//!
//! Two exchanges are supported:
//! - prepare: `Parse` + `Sync`
//! - execute prepared: `Bind` + `Describe` + `Execute` + `Sync` on the unnamed portal

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::frontend::encode_all;
use crate::protocol::{BackendMessage, FrontendMessage, Oid, TransactionStatus};
use crate::response::{ExecStatus, Response};

use super::StateMachine;
use super::action::{Action, AsyncMessage};
use super::simple_query::{Collected, ResponseCollector};

/// Extended query state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingParse,
    WaitingBind,
    WaitingResults,
    Finished,
}

/// Extended query protocol state machine.
pub struct ExtendedQueryStateMachine {
    state: State,
    collector: ResponseCollector,
}

impl ExtendedQueryStateMachine {
    /// Create a new extended query state machine.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            collector: ResponseCollector::default(),
        }
    }

    /// Start preparing `query` as the statement `name`.
    ///
    /// An empty `param_oids` lets the server infer every parameter type.
    pub fn prepare(
        &mut self,
        buffer_set: &mut BufferSet,
        name: &str,
        query: &str,
        param_oids: &[Oid],
    ) -> Result<Action> {
        encode_all(
            &mut buffer_set.write_buffer,
            &[
                FrontendMessage::Parse {
                    name,
                    sql: query,
                    param_types: param_oids,
                },
                FrontendMessage::Sync,
            ],
        )?;
        self.state = State::WaitingParse;
        Ok(Action::WriteAndReadMessage)
    }

    /// Start executing the prepared statement `name` with text parameters.
    pub fn execute(
        &mut self,
        buffer_set: &mut BufferSet,
        name: &str,
        params: &[Option<&str>],
    ) -> Result<Action> {
        encode_all(
            &mut buffer_set.write_buffer,
            &[
                FrontendMessage::Bind {
                    statement: name,
                    params,
                },
                FrontendMessage::DescribePortal,
                FrontendMessage::Execute,
                FrontendMessage::Sync,
            ],
        )?;
        self.state = State::WaitingBind;
        Ok(Action::WriteAndReadMessage)
    }

    /// Take the response once the machine has finished.
    pub fn take_response(&mut self) -> Response {
        self.collector.finish()
    }

    fn unexpected(&self, name: &str) -> Error {
        Error::Protocol(format!("unexpected {name} in state {:?}", self.state))
    }
}

impl Default for ExtendedQueryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for ExtendedQueryStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let message = BackendMessage::parse(buffer_set.type_byte, &buffer_set.read_buffer)?;

        if matches!(self.state, State::Initial | State::Finished) {
            return Err(self.unexpected(message.name()));
        }

        let message = match AsyncMessage::try_from(message) {
            Ok(msg) => return Ok(Action::HandleAsyncMessageAndReadMessage(msg)),
            Err(message) => message,
        };

        match (self.state, &message) {
            (State::WaitingParse, BackendMessage::ParseComplete) => {
                self.collector.set_last(Response::new(ExecStatus::CommandOk));
                return Ok(Action::ReadMessage);
            }
            (State::WaitingBind, BackendMessage::BindComplete) => {
                self.state = State::WaitingResults;
                return Ok(Action::ReadMessage);
            }
            (State::WaitingResults, BackendMessage::NoData) => return Ok(Action::ReadMessage),
            _ => {}
        }

        match self.collector.collect(message, &mut buffer_set.write_buffer)? {
            Collected::Read => Ok(Action::ReadMessage),
            Collected::WriteAndRead => Ok(Action::WriteAndReadMessage),
            Collected::Ready => {
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            Collected::Unhandled(name) => Err(self.unexpected(name)),
        }
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.collector.transaction_status()
    }
}
