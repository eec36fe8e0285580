//! Blocking driver speaking the PostgreSQL frontend/backend protocol.

use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::{Opts, SslMode};
use crate::protocol::frontend::encode_all;
use crate::protocol::{FrontendMessage, Oid, TransactionStatus};
use crate::response::Response;
use crate::state::{
    Action, AsyncMessage, ConnectionStateMachine, ExtendedQueryStateMachine,
    SimpleQueryStateMachine, StateMachine,
};

use super::stream::Stream;
use super::{ConnStatus, Driver};

/// Open the TCP connection, trying every resolved address in turn.
fn connect_tcp(host: &str, port: u16, timeout: u32) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = if timeout > 0 {
            TcpStream::connect_timeout(&addr, Duration::from_secs(u64::from(timeout)))
        } else {
            TcpStream::connect(addr)
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => Error::BrokenConnection(format!("could not connect to {host}:{port}: {e}")),
        None => Error::BrokenConnection(format!("could not resolve host {host}")),
    })
}

/// Connect to the socket `.s.PGSQL.<port>` in directory `dir`.
#[cfg(unix)]
fn connect_unix(dir: &str, port: u16) -> Result<Stream> {
    let path = format!("{dir}/.s.PGSQL.{port}");
    let socket = UnixStream::connect(&path)
        .map_err(|e| Error::BrokenConnection(format!("could not connect to {path}: {e}")))?;
    Ok(Stream::unix(socket))
}

#[cfg(not(unix))]
fn connect_unix(dir: &str, _port: u16) -> Result<Stream> {
    Err(Error::Unsupported(format!(
        "Unix-domain sockets are not available: {dir}"
    )))
}

#[cfg(feature = "tls")]
fn tls_connector(opts: &Opts) -> Result<native_tls::TlsConnector> {
    use native_tls::{Certificate, Identity, TlsConnector};

    let mut builder = TlsConnector::builder();
    match opts.ssl_mode {
        SslMode::VerifyFull => {}
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        _ => {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
    }
    if !opts.ssl_root_cert.is_empty() {
        let pem = std::fs::read(&opts.ssl_root_cert)?;
        builder.add_root_certificate(Certificate::from_pem(&pem)?);
    }
    if !opts.ssl_cert.is_empty() && !opts.ssl_key.is_empty() {
        let cert = std::fs::read(&opts.ssl_cert)?;
        let key = std::fs::read(&opts.ssl_key)?;
        builder.identity(Identity::from_pkcs8(&cert, &key)?);
    }
    Ok(builder.build()?)
}

/// Warn about settings that are accepted but have no effect here.
fn warn_ignored_settings(opts: &Opts) {
    let ignored = [
        ("keepalives", !opts.keepalives),
        ("keepalives_idle", opts.keepalives_idle != 0),
        ("keepalives_interval", opts.keepalives_interval != 0),
        ("keepalives_count", opts.keepalives_count != 0),
        ("sslcompression", !opts.ssl_compression),
        ("sslcrl", !opts.ssl_crl.is_empty()),
        ("requirepeer", !opts.require_peer.is_empty()),
        ("krbsrvname", !opts.krb_srv_name.is_empty()),
        ("service", !opts.service.is_empty()),
    ];
    for (name, set) in ignored {
        if set {
            warn!(setting = name, "connection setting is not supported and is ignored");
        }
    }
}

/// Carry out one I/O action. Returns true once the machine has finished.
fn perform(
    stream: &mut Stream,
    buffer_set: &mut BufferSet,
    server_params: &mut Vec<(String, String)>,
    action: Action,
) -> Result<bool> {
    match action {
        Action::WriteAndReadByte => {
            stream.send(&buffer_set.write_buffer)?;
            buffer_set.type_byte = stream.read_byte()?;
        }
        Action::ReadMessage => stream.read_message(buffer_set)?,
        Action::WriteAndReadMessage => {
            stream.send(&buffer_set.write_buffer)?;
            stream.read_message(buffer_set)?;
        }
        Action::TlsHandshake => {
            return Err(Error::Protocol(
                "TLS handshake requested after startup".into(),
            ));
        }
        Action::HandleAsyncMessageAndReadMessage(msg) => {
            handle_async_message(server_params, msg);
            stream.read_message(buffer_set)?;
        }
        Action::Finished => return Ok(true),
    }
    Ok(false)
}

fn handle_async_message(server_params: &mut Vec<(String, String)>, msg: AsyncMessage) {
    match msg {
        AsyncMessage::Notice(fields) => info!("{}", fields),
        AsyncMessage::ParameterChanged { name, value } => {
            if let Some(entry) = server_params.iter_mut().find(|(n, _)| *n == name) {
                entry.1 = value;
            } else {
                server_params.push((name, value));
            }
        }
        AsyncMessage::Notification { pid, channel, .. } => {
            debug!(pid, channel, "ignoring notification");
        }
    }
}

/// Synchronous PostgreSQL connection used as the native client.
pub struct WireDriver {
    stream: Stream,
    buffer_set: BufferSet,
    backend_key: Option<(u32, u32)>,
    server_params: Vec<(String, String)>,
    transaction_status: TransactionStatus,
    is_broken: bool,
    debug: bool,
}

impl WireDriver {
    /// Connect to a PostgreSQL server and complete startup.
    pub fn connect(opts: &Opts) -> Result<Self> {
        warn_ignored_settings(opts);

        let mut startup_opts = opts.clone();
        if cfg!(not(feature = "tls")) {
            if opts.ssl_mode.is_required() {
                return Err(Error::Unsupported(format!(
                    "sslmode={} needs the tls feature",
                    opts.ssl_mode.as_str()
                )));
            }
            startup_opts.ssl_mode = SslMode::Disable;
        }

        let host = if !opts.hostaddr.is_empty() {
            opts.hostaddr.as_str()
        } else if opts.host.is_empty() {
            "localhost"
        } else {
            opts.host.as_str()
        };

        let stream = if host.starts_with('/') {
            startup_opts.ssl_mode = SslMode::Disable;
            connect_unix(host, opts.port)?
        } else {
            Stream::tcp(connect_tcp(host, opts.port, opts.connect_timeout)?)?
        };

        Self::startup(stream, startup_opts)
    }

    fn startup(mut stream: Stream, opts: Opts) -> Result<Self> {
        let mut buffer_set = BufferSet::new();
        let mut server_params = Vec::new();
        let debug = opts.debug;

        let mut machine = ConnectionStateMachine::new(opts.clone());
        let mut action = machine.start(&mut buffer_set)?;
        loop {
            match action {
                Action::TlsHandshake => {
                    #[cfg(feature = "tls")]
                    {
                        let domain = if opts.host.is_empty() {
                            "localhost"
                        } else {
                            opts.host.as_str()
                        };
                        stream = stream.upgrade_to_tls(&tls_connector(&opts)?, domain)?;
                    }
                    #[cfg(not(feature = "tls"))]
                    {
                        return Err(Error::Unsupported(
                            "TLS requested but the tls feature is not enabled".into(),
                        ));
                    }
                }
                action => {
                    if perform(&mut stream, &mut buffer_set, &mut server_params, action)? {
                        break;
                    }
                }
            }
            action = machine.step(&mut buffer_set)?;
        }

        let backend_key = machine.backend_key();
        if debug {
            debug!(user = machine.user(), ?backend_key, "connected");
        }

        Ok(Self {
            stream,
            buffer_set,
            backend_key,
            server_params,
            transaction_status: machine.transaction_status(),
            is_broken: false,
            debug,
        })
    }

    /// Process id of the backend serving this connection.
    pub fn backend_pid(&self) -> Option<u32> {
        self.backend_key.map(|(pid, _)| pid)
    }

    /// Transaction status reported by the last ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Run a state machine to completion, marking the connection broken on
    /// transport or protocol failures.
    fn drive(&mut self, machine: &mut impl StateMachine, first: Action) -> Result<()> {
        if self.is_broken {
            return Err(Error::BrokenConnection("connection is closed".into()));
        }
        let result = self.drive_inner(machine, first);
        match &result {
            Ok(()) => self.transaction_status = machine.transaction_status(),
            Err(_) => self.is_broken = true,
        }
        result
    }

    fn drive_inner(&mut self, machine: &mut impl StateMachine, first: Action) -> Result<()> {
        let mut action = first;
        while !perform(
            &mut self.stream,
            &mut self.buffer_set,
            &mut self.server_params,
            action,
        )? {
            action = machine.step(&mut self.buffer_set)?;
        }
        Ok(())
    }

    /// A FATAL server error ends the session.
    fn check_fatal(&mut self, response: &Response) {
        if let Some(fields) = response.error_fields() {
            if matches!(fields.severity(), Some("FATAL") | Some("PANIC")) {
                self.is_broken = true;
            }
        }
    }
}

impl Driver for WireDriver {
    fn status(&self) -> ConnStatus {
        if self.is_broken {
            ConnStatus::Bad
        } else {
            ConnStatus::Ok
        }
    }

    fn exec(&mut self, sql: &str) -> Result<Response> {
        if self.debug {
            debug!(sql, "simple query");
        }
        let mut machine = SimpleQueryStateMachine::new();
        let first = machine.start(&mut self.buffer_set, sql)?;
        self.drive(&mut machine, first)?;
        let response = machine.take_response();
        self.check_fatal(&response);
        Ok(response)
    }

    fn prepare(&mut self, name: &str, sql: &str, param_types: &[Oid]) -> Result<Response> {
        if self.debug {
            debug!(name, sql, "parse");
        }
        let mut machine = ExtendedQueryStateMachine::new();
        let first = machine.prepare(&mut self.buffer_set, name, sql, param_types)?;
        self.drive(&mut machine, first)?;
        let response = machine.take_response();
        self.check_fatal(&response);
        Ok(response)
    }

    fn exec_prepared(&mut self, name: &str, params: &[Option<&str>]) -> Result<Response> {
        if self.debug {
            debug!(name, params = params.len(), "bind and execute");
        }
        let mut machine = ExtendedQueryStateMachine::new();
        let first = machine.execute(&mut self.buffer_set, name, params)?;
        self.drive(&mut machine, first)?;
        let response = machine.take_response();
        self.check_fatal(&response);
        Ok(response)
    }

    fn parameter_status(&self, name: &str) -> Option<&str> {
        self.server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn finish(&mut self) {
        if self.is_broken {
            return;
        }
        self.is_broken = true;
        let sent = encode_all(
            &mut self.buffer_set.write_buffer,
            &[FrontendMessage::Terminate],
        )
        .and_then(|()| self.stream.send(&self.buffer_set.write_buffer));
        if let Err(e) = sent {
            debug!(error = %e, "failed to send Terminate");
        }
    }
}

impl Drop for WireDriver {
    fn drop(&mut self) {
        self.finish();
    }
}
