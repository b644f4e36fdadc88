//! Loopback indexer stand-ins for integration tests.
//!
//! Each server accepts a single connection, reads the expected number of
//! newline-terminated lines, and reports them (or the handshake failure)
//! over a channel.

#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader, Read},
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use rustls::{
    RootCertStore, ServerConfig, ServerConnection, StreamOwned,
    pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject},
    server::WebPkiClientVerifier,
};

pub const CA_PEM: &[u8] = include_bytes!("../fixtures/certs/ca.pem");
pub const SERVER_PEM: &[u8] = include_bytes!("../fixtures/certs/server.pem");
pub const SERVER_KEY: &[u8] = include_bytes!("../fixtures/certs/server.key");
pub const CLIENT_PEM: &[u8] = include_bytes!("../fixtures/certs/client.pem");
pub const CLIENT_KEY: &[u8] = include_bytes!("../fixtures/certs/client.key");
pub const CLIENT_P12: &[u8] = include_bytes!("../fixtures/certs/client.p12");
pub const CLIENT_ENC_KEY: &[u8] = include_bytes!("../fixtures/certs/client_enc.key");
/// Protects both `client.p12` and `client_enc.key`.
pub const CLIENT_P12_PASSPHRASE: &str = "splunk-test";
pub const CLIENT_KEY_PASSPHRASE: &str = CLIENT_P12_PASSPHRASE;
pub const ROGUE_CA_PEM: &[u8] = include_bytes!("../fixtures/certs/rogue_ca.pem");
pub const ROGUE_SERVER_PEM: &[u8] = include_bytes!("../fixtures/certs/rogue_server.pem");
pub const ROGUE_SERVER_KEY: &[u8] = include_bytes!("../fixtures/certs/rogue_server.key");

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Lines received by a server, or the reason the connection failed.
pub type ServerOutcome = Result<Vec<String>, String>;

/// Absolute path of a certificate fixture.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/certs")
        .join(name)
}

fn bind() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn read_lines<R: Read>(reader: R, expected: usize) -> ServerOutcome {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::with_capacity(expected);
    for _ in 0..expected {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => lines.push(line.trim_end_matches('\n').to_owned()),
            Err(err) => return Err(err.to_string()),
        }
    }
    Ok(lines)
}

/// Plain TCP raw input.
pub fn spawn_tcp_server(expected: usize) -> (SocketAddr, mpsc::Receiver<ServerOutcome>) {
    let listener = bind();
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let _ = stream.set_read_timeout(Some(RECV_TIMEOUT));
        let _ = tx.send(read_lines(stream, expected));
    });
    (addr, rx)
}

/// TLS raw input presenting `cert`/`key`, without client authentication.
pub fn spawn_tls_server(
    cert: &[u8],
    key: &[u8],
    expected: usize,
) -> (SocketAddr, mpsc::Receiver<ServerOutcome>) {
    let identity = native_tls::Identity::from_pkcs8(cert, key).expect("server identity");
    let acceptor = native_tls::TlsAcceptor::new(identity).expect("tls acceptor");
    let listener = bind();
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let _ = stream.set_read_timeout(Some(RECV_TIMEOUT));
        let outcome = match acceptor.accept(stream) {
            Ok(tls) => read_lines(tls, expected),
            Err(err) => Err(err.to_string()),
        };
        let _ = tx.send(outcome);
    });
    (addr, rx)
}

fn pem_certs(pem: &[u8]) -> Vec<CertificateDer<'static>> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .expect("parse certificate fixture")
}

/// TLS 1.2 raw input that requires a client certificate issued by the test CA.
///
/// TLS 1.2 makes the client observe a rejected certificate during the
/// handshake itself rather than on a later read.
pub fn spawn_mtls_server(expected: usize) -> (SocketAddr, mpsc::Receiver<ServerOutcome>) {
    let mut roots = RootCertStore::empty();
    for cert in pem_certs(CA_PEM) {
        roots.add(cert).expect("add test CA");
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .expect("client verifier");
    let key = PrivateKeyDer::from_pem_slice(SERVER_KEY).expect("parse server key");
    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
        .with_client_cert_verifier(verifier)
        .with_single_cert(pem_certs(SERVER_PEM), key)
        .expect("server config");
    let config = Arc::new(config);

    let listener = bind();
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let _ = stream.set_read_timeout(Some(RECV_TIMEOUT));
        let conn = ServerConnection::new(config).expect("server connection");
        let _ = tx.send(read_lines(StreamOwned::new(conn, stream), expected));
    });
    (addr, rx)
}

/// Wait for the server outcome.
pub fn recv_outcome(rx: &mpsc::Receiver<ServerOutcome>) -> ServerOutcome {
    rx.recv_timeout(RECV_TIMEOUT)
        .unwrap_or_else(|_| Err("server reported nothing".into()))
}
