//! Buffered socket carrying framed protocol messages.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::codec::Reader;

/// Any byte transport: TCP, TLS over TCP or a Unix-domain socket.
trait Socket: Read + Write {}

impl<T: Read + Write> Socket for T {}

fn buffered(socket: impl Socket + 'static) -> BufReader<Box<dyn Socket>> {
    let socket: Box<dyn Socket> = Box::new(socket);
    BufReader::new(socket)
}

pub struct Stream {
    reader: BufReader<Box<dyn Socket>>,
    /// Handle to the TCP socket while TLS can still be negotiated on it
    #[cfg(feature = "tls")]
    tcp: Option<TcpStream>,
}

impl Stream {
    pub fn tcp(socket: TcpStream) -> Result<Self> {
        #[cfg(feature = "tls")]
        let tcp = Some(socket.try_clone()?);
        Ok(Self {
            reader: buffered(socket),
            #[cfg(feature = "tls")]
            tcp,
        })
    }

    #[cfg(unix)]
    pub fn unix(socket: std::os::unix::net::UnixStream) -> Self {
        Self {
            reader: buffered(socket),
            #[cfg(feature = "tls")]
            tcp: None,
        }
    }

    /// Continue over TLS. Only valid right after the server accepted an
    /// SSLRequest, when nothing is buffered.
    #[cfg(feature = "tls")]
    pub fn upgrade_to_tls(self, connector: &native_tls::TlsConnector, domain: &str) -> Result<Self> {
        if !self.reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "server sent data before the TLS handshake".into(),
            ));
        }
        let tcp = self.tcp.ok_or_else(|| {
            Error::Protocol("TLS can only be negotiated on a TCP connection".into())
        })?;
        let tls = connector
            .connect(domain, tcp)
            .map_err(|e| Error::BrokenConnection(format!("TLS handshake failed: {e}")))?;
        Ok(Self {
            reader: buffered(tls),
            tcp: None,
        })
    }

    /// Read the one-byte answer to an SSLRequest.
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Read one message into `buffer_set.type_byte` and `read_buffer`.
    pub fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let mut header = [0u8; 5];
        self.reader.read_exact(&mut header)?;
        let length = Reader::new("message header", &header[1..]).u32()?;
        let payload_len = length
            .checked_sub(4)
            .ok_or_else(|| Error::Protocol(format!("invalid message length {length}")))?;

        buffer_set.type_byte = header[0];
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize(payload_len as usize, 0);
        self.reader.read_exact(&mut buffer_set.read_buffer)?;
        Ok(())
    }

    /// Write and flush `data`.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.reader.get_mut();
        socket.write_all(data)?;
        socket.flush()?;
        Ok(())
    }
}
