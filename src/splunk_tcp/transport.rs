//! Connection management for the indexer socket.
//!
//! [`ConnectionManager`] owns at most one [`ActiveConnection`]. It dials
//! lazily, keeps healthy connections open between chunks, and discards a
//! connection as soon as a write fails or the peer is seen to have gone away.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;
use native_tls::{Certificate, HandshakeError, TlsConnector, TlsStream};
use thiserror::Error;

use super::{
    config::{Endpoint, SplunkTcpConfig, TlsSettings},
    trust::{TrustMaterialError, split_pem_certificates},
};

/// Failure to establish a usable connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

/// Lifecycle of the managed connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl TlsSettings {
    /// Build a connector from the configured trust material.
    pub(crate) fn connector(&self) -> Result<TlsConnector, TrustMaterialError> {
        let mut builder = TlsConnector::builder();
        if let Some(bundle) = self.trust.ca_certificates()? {
            for pem in split_pem_certificates(&bundle)? {
                let anchor = Certificate::from_pem(&pem)
                    .map_err(|err| TrustMaterialError::invalid("ca_file", err))?;
                builder.add_root_certificate(anchor);
            }
            builder.disable_built_in_roots(true);
        }
        if let Some(identity) = self.trust.client_identity()? {
            builder.identity(identity.to_native()?);
        }
        if !self.verify_peer {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder
            .build()
            .map_err(|err| TrustMaterialError::invalid("tls", err))
    }
}

/// Active socket connection.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveConnection {
    fn tcp(&self) -> &TcpStream {
        match self {
            ActiveConnection::PlainTcp(stream) => stream,
            ActiveConnection::Tls(stream) => stream.get_ref(),
        }
    }

    /// Update the write timeout for the underlying socket.
    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.tcp().set_write_timeout(Some(timeout))
    }

    /// Write a full buffer to the socket.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.write_all(buf),
            ActiveConnection::Tls(stream) => stream.write_all(buf),
        }
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
        }
    }

    /// Report whether the peer closed or otherwise spoiled an idle connection.
    ///
    /// The indexer never writes on this protocol, so EOF, application data, or
    /// a socket error all mean the connection must not carry another chunk.
    /// TLS session tickets are consumed by the read without counting as data.
    pub fn is_stale(&mut self) -> bool {
        if self.tcp().set_nonblocking(true).is_err() {
            return true;
        }
        let mut byte = [0u8; 1];
        let outcome = match self {
            ActiveConnection::PlainTcp(stream) => stream.peek(&mut byte),
            ActiveConnection::Tls(stream) => stream.read(&mut byte),
        };
        let stale = match outcome {
            Ok(_) => true,
            Err(err) => err.kind() != io::ErrorKind::WouldBlock,
        };
        self.tcp().set_nonblocking(false).is_err() || stale
    }

    /// Close the connection, sending a TLS close_notify where applicable.
    pub fn shutdown(&mut self) -> io::Result<()> {
        if let ActiveConnection::Tls(stream) = self {
            stream.shutdown()?;
        }
        self.tcp().shutdown(Shutdown::Both)
    }
}

fn connect_tcp(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|source| ConnectionError::Resolve {
            endpoint: endpoint.to_string(),
            source,
        })?
        .collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!("splunk_tcp: dial {addr} failed: {err}");
                last_err = Some(err);
            }
        }
    }
    Err(ConnectionError::Connect {
        endpoint: endpoint.to_string(),
        source: last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            )
        }),
    })
}

fn handshake(
    connector: &TlsConnector,
    server_name: &str,
    endpoint: &Endpoint,
    stream: TcpStream,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>, ConnectionError> {
    let handshake_err = |source: io::Error| ConnectionError::Handshake {
        endpoint: endpoint.to_string(),
        source,
    };
    stream.set_read_timeout(Some(timeout)).map_err(handshake_err)?;
    stream.set_write_timeout(Some(timeout)).map_err(handshake_err)?;
    let stream = connector
        .connect(server_name, stream)
        .map_err(|err| match err {
            HandshakeError::Failure(err) => handshake_err(io::Error::other(err)),
            HandshakeError::WouldBlock(_) => handshake_err(io::Error::new(
                io::ErrorKind::TimedOut,
                "handshake did not complete within the connect timeout",
            )),
        })?;
    stream.get_ref().set_read_timeout(None).map_err(handshake_err)?;
    Ok(stream)
}

/// TLS connector paired with the name the server certificate must match.
pub struct TlsClient {
    connector: TlsConnector,
    server_name: String,
}

impl TlsClient {
    pub(crate) fn new(settings: &TlsSettings) -> Result<Self, TrustMaterialError> {
        Ok(Self {
            connector: settings.connector()?,
            server_name: settings.server_name.clone(),
        })
    }
}

/// Establish a connection to `endpoint`, performing a TLS handshake when a
/// TLS client is supplied.
pub fn connect_transport(
    endpoint: &Endpoint,
    tls: Option<&TlsClient>,
    connect_timeout: Duration,
) -> Result<ActiveConnection, ConnectionError> {
    let stream = connect_tcp(endpoint, connect_timeout)?;
    match tls {
        Some(client) => {
            let stream = handshake(
                &client.connector,
                &client.server_name,
                endpoint,
                stream,
                connect_timeout,
            )?;
            Ok(ActiveConnection::Tls(Box::new(stream)))
        }
        None => Ok(ActiveConnection::PlainTcp(stream)),
    }
}

/// Owns the lifecycle of the single connection used by a sender.
pub struct ConnectionManager {
    endpoint: Endpoint,
    tls: Option<TlsClient>,
    connect_timeout: Duration,
    write_timeout: Duration,
    active: Option<ActiveConnection>,
    state: ConnectionState,
}

impl ConnectionManager {
    /// Prepare a manager for `config`. The TLS connector is built here so bad
    /// trust material is reported before the first send.
    pub fn new(config: &SplunkTcpConfig) -> Result<Self, TrustMaterialError> {
        let tls = config.tls.as_ref().map(TlsClient::new).transpose()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            tls,
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
            active: None,
            state: ConnectionState::Disconnected,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Make sure a usable connection exists, dialling if necessary.
    pub fn ensure_connected(&mut self) -> Result<(), ConnectionError> {
        if let Some(conn) = self.active.as_mut() {
            if !conn.is_stale() {
                return Ok(());
            }
            debug!(
                "splunk_tcp: idle connection to {} went stale; reconnecting",
                self.endpoint
            );
            self.discard();
        }
        self.state = ConnectionState::Connecting;
        let conn = connect_transport(&self.endpoint, self.tls.as_ref(), self.connect_timeout)
            .and_then(|conn| {
                conn.set_write_timeout(self.write_timeout)
                    .map_err(|source| ConnectionError::Connect {
                        endpoint: self.endpoint.to_string(),
                        source,
                    })?;
                Ok(conn)
            });
        match conn {
            Ok(conn) => {
                debug!(
                    "splunk_tcp: connected to {} ({})",
                    self.endpoint,
                    if self.tls.is_some() { "tls" } else { "tcp" }
                );
                self.active = Some(conn);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Write `buf` in full. Any failure discards the connection.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let Some(conn) = self.active.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no active connection to the indexer",
            ));
        };
        let result = conn.write_all(buf).and_then(|()| conn.flush());
        if result.is_err() {
            self.discard();
        }
        result
    }

    /// Drop the connection without an orderly shutdown.
    pub fn discard(&mut self) {
        self.active = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Shut the connection down cleanly.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.active.take() {
            self.state = ConnectionState::Closing;
            if let Err(err) = conn.shutdown() {
                debug!("splunk_tcp: shutdown of {} failed: {err}", self.endpoint);
            }
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("tls", &self.tls.is_some())
            .field("state", &self.state)
            .finish()
    }
}
