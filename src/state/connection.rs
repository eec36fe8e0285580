//! Connection startup and authentication state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::frontend::encode_all;
use crate::protocol::password::{SCRAM_SHA_256, ScramClient, md5_password};
use crate::protocol::{Authentication, BackendMessage, FrontendMessage, TransactionStatus};

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// Connection state during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    WaitingSslResponse,
    SslHandshake,
    WaitingAuth,
    SaslInProgress,
    WaitingAuthResult,
    WaitingReady,
    Ready,
    Failed,
}

/// Connection startup state machine.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    options: Opts,
    user: String,
    backend_key: Option<(u32, u32)>,
    transaction_status: TransactionStatus,
    scram_client: Option<ScramClient>,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(options: Opts) -> Self {
        let user = if options.user.is_empty() {
            std::env::var("USER").unwrap_or_else(|_| "postgres".to_string())
        } else {
            options.user.clone()
        };
        Self {
            state: ConnectionState::Initial,
            options,
            user,
            backend_key: None,
            transaction_status: TransactionStatus::Idle,
            scram_client: None,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Process id and secret key of the backend, once known.
    pub fn backend_key(&self) -> Option<(u32, u32)> {
        self.backend_key
    }

    /// User name sent in the startup packet.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Start the connection process.
    ///
    /// Returns the initial action to perform.
    pub fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let encoding = self.options.client_encoding.as_str();
        if !encoding.is_empty()
            && !encoding.eq_ignore_ascii_case("UTF8")
            && !encoding.eq_ignore_ascii_case("UTF-8")
        {
            self.state = ConnectionState::Failed;
            return Err(Error::Unsupported(format!(
                "client_encoding {encoding} is not supported, only UTF8"
            )));
        }

        if self.options.ssl_mode.should_try_ssl() {
            encode_all(&mut buffer_set.write_buffer, &[FrontendMessage::SslRequest])?;
            self.state = ConnectionState::WaitingSslResponse;
            Ok(Action::WriteAndReadByte)
        } else {
            self.write_startup_message(buffer_set)?;
            Ok(Action::WriteAndReadMessage)
        }
    }

    fn write_startup_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let opts = &self.options;
        let mut params: Vec<(&str, &str)> = vec![
            ("user", self.user.as_str()),
            ("client_encoding", "UTF8"),
            ("DateStyle", "ISO"),
        ];
        if !opts.dbname.is_empty() {
            params.push(("database", opts.dbname.as_str()));
        }
        if !opts.options.is_empty() {
            params.push(("options", opts.options.as_str()));
        }
        let application_name = if opts.application_name.is_empty() {
            opts.fallback_application_name.as_str()
        } else {
            opts.application_name.as_str()
        };
        if !application_name.is_empty() {
            params.push(("application_name", application_name));
        }

        encode_all(
            &mut buffer_set.write_buffer,
            &[FrontendMessage::Startup { params: &params }],
        )?;
        self.state = ConnectionState::WaitingAuth;
        Ok(())
    }

    fn password(&self) -> Result<&str> {
        if self.options.password.is_empty() {
            return Err(Error::Auth(
                "Password required but not provided".into(),
            ));
        }
        Ok(&self.options.password)
    }

    fn handle_ssl_response(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match buffer_set.type_byte {
            b'S' => {
                self.state = ConnectionState::SslHandshake;
                Ok(Action::TlsHandshake)
            }
            b'N' => {
                if self.options.ssl_mode.is_required() {
                    self.state = ConnectionState::Failed;
                    return Err(Error::BrokenConnection(
                        "server does not support SSL, but SSL was required".into(),
                    ));
                }
                self.write_startup_message(buffer_set)?;
                Ok(Action::WriteAndReadMessage)
            }
            other => {
                self.state = ConnectionState::Failed;
                Err(Error::Protocol(format!(
                    "Unexpected SSL response: {}",
                    other
                )))
            }
        }
    }

    fn send(
        &mut self,
        write_buffer: &mut Vec<u8>,
        message: FrontendMessage<'_>,
        next: ConnectionState,
    ) -> Result<Action> {
        encode_all(write_buffer, &[message])?;
        self.state = next;
        Ok(Action::WriteAndReadMessage)
    }

    fn handle_auth_message(
        &mut self,
        auth: Authentication<'_>,
        write_buffer: &mut Vec<u8>,
    ) -> Result<Action> {
        match auth {
            Authentication::Ok => {
                self.state = ConnectionState::WaitingReady;
                Ok(Action::ReadMessage)
            }
            Authentication::CleartextPassword => {
                let password = self.password()?.to_string();
                self.send(
                    write_buffer,
                    FrontendMessage::Password(&password),
                    ConnectionState::WaitingAuthResult,
                )
            }
            Authentication::Md5Password { salt } => {
                let hashed = md5_password(&self.user, self.password()?, &salt);
                self.send(
                    write_buffer,
                    FrontendMessage::Password(&hashed),
                    ConnectionState::WaitingAuthResult,
                )
            }
            Authentication::Sasl(mechanisms) => {
                if !mechanisms.contains(&SCRAM_SHA_256) {
                    return Err(Error::Auth(format!(
                        "no supported SASL mechanism, server offers {mechanisms:?}"
                    )));
                }
                let scram = ScramClient::new(self.password()?);
                let first = scram.client_first_message();
                self.scram_client = Some(scram);
                self.send(
                    write_buffer,
                    FrontendMessage::SaslInitialResponse {
                        mechanism: SCRAM_SHA_256,
                        data: first.as_bytes(),
                    },
                    ConnectionState::SaslInProgress,
                )
            }
            Authentication::Unsupported(code) => Err(Error::Unsupported(format!(
                "authentication method {code} is not supported"
            ))),
            other => Err(Error::Protocol(format!(
                "unexpected {other:?} before authentication started"
            ))),
        }
    }

    fn handle_sasl_message(
        &mut self,
        auth: Authentication<'_>,
        write_buffer: &mut Vec<u8>,
    ) -> Result<Action> {
        let scram = self
            .scram_client
            .as_mut()
            .ok_or_else(|| Error::Protocol("SCRAM exchange was not started".into()))?;
        match auth {
            Authentication::SaslContinue(data) => {
                let client_final = scram.client_final_message(scram_text(data)?)?;
                self.send(
                    write_buffer,
                    FrontendMessage::SaslResponse(client_final.as_bytes()),
                    ConnectionState::SaslInProgress,
                )
            }
            Authentication::SaslFinal(data) => {
                scram.verify_server_final(scram_text(data)?)?;
                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Protocol(format!(
                "unexpected {other:?} during SASL exchange"
            ))),
        }
    }

    fn handle_auth_result(&mut self, auth: Authentication<'_>) -> Result<Action> {
        match auth {
            Authentication::Ok => {
                self.state = ConnectionState::WaitingReady;
                Ok(Action::ReadMessage)
            }
            other => Err(Error::Auth(format!("unexpected auth result: {other:?}"))),
        }
    }

    fn handle_ready_message(&mut self, message: BackendMessage<'_>) -> Result<Action> {
        match message {
            BackendMessage::BackendKeyData { pid, secret } => {
                self.backend_key = Some((pid, secret));
                Ok(Action::ReadMessage)
            }
            BackendMessage::ReadyForQuery(status) => {
                self.transaction_status = status;
                self.state = ConnectionState::Ready;
                Ok(Action::Finished)
            }
            other => Err(Error::Protocol(format!(
                "unexpected {} during startup",
                other.name()
            ))),
        }
    }
}

fn scram_text(data: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(data)
        .map_err(|e| Error::Auth(format!("SCRAM message is not UTF-8: {e}")))
}

impl StateMachine for ConnectionStateMachine {
    /// Process the server's reply.
    ///
    /// After `Action::WriteAndReadByte` the caller stores the SSL response
    /// byte in `buffer_set.type_byte`; after `Action::TlsHandshake` it calls
    /// this method again without reading anything.
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            ConnectionState::WaitingSslResponse => return self.handle_ssl_response(buffer_set),
            ConnectionState::SslHandshake => {
                self.write_startup_message(buffer_set)?;
                return Ok(Action::WriteAndReadMessage);
            }
            _ => {}
        }

        let message = BackendMessage::parse(buffer_set.type_byte, &buffer_set.read_buffer)?;
        let message = match AsyncMessage::try_from(message) {
            Ok(msg) => return Ok(Action::HandleAsyncMessageAndReadMessage(msg)),
            Err(message) => message,
        };

        let result = match (self.state, message) {
            (_, BackendMessage::ErrorResponse(fields)) => Err(Error::database(fields, None)),
            (_, BackendMessage::NegotiateProtocolVersion { minor }) => Err(Error::Unsupported(
                format!("server only supports protocol 3.{minor}"),
            )),
            (ConnectionState::WaitingAuth, BackendMessage::Authentication(auth)) => {
                self.handle_auth_message(auth, &mut buffer_set.write_buffer)
            }
            (ConnectionState::SaslInProgress, BackendMessage::Authentication(auth)) => {
                self.handle_sasl_message(auth, &mut buffer_set.write_buffer)
            }
            (ConnectionState::WaitingAuthResult, BackendMessage::Authentication(auth)) => {
                self.handle_auth_result(auth)
            }
            (ConnectionState::WaitingReady, message) => self.handle_ready_message(message),
            (state, message) => Err(Error::Protocol(format!(
                "unexpected {} in state {state:?}",
                message.name()
            ))),
        };
        if result.is_err() {
            self.state = ConnectionState::Failed;
        }
        result
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }
}
