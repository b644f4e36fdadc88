//! Trust material used to authenticate the indexer and, optionally, ourselves.
//!
//! The connection manager never touches the filesystem directly. It asks a
//! [`TrustMaterialProvider`] for a CA bundle and a client identity, which lets
//! tests feed certificates from memory via [`InMemoryTrustMaterial`] while
//! deployments use [`FileTrustMaterial`].

use std::{fmt, fs, io, path::PathBuf};

use log::debug;
use openssl::pkey::PKey;
use serde::Deserialize;
use thiserror::Error;

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";
const PEM_BEGIN: &[u8] = b"-----BEGIN ";

/// Errors raised while loading or parsing trust material.
#[derive(Debug, Error)]
pub enum TrustMaterialError {
    /// The backing file could not be read.
    #[error("failed to read {field} from `{}`: {source}", .path.display())]
    Read {
        field: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The material was read but is unusable.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl TrustMaterialError {
    pub(crate) fn invalid(field: &'static str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Passphrase protecting an encrypted client key. Redacted from debug output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity presented to servers that require mutual TLS.
#[derive(Clone)]
pub enum ClientIdentity {
    /// PEM certificate chain plus an unencrypted PKCS#8 PEM key.
    Pem { certificate: Vec<u8>, key: Vec<u8> },
    /// PEM certificate chain plus a passphrase-protected PEM key, either
    /// `ENCRYPTED PRIVATE KEY` (PKCS#8) or a traditional encrypted key.
    EncryptedPem {
        certificate: Vec<u8>,
        key: Vec<u8>,
        passphrase: Passphrase,
    },
    /// DER-encoded PKCS#12 archive holding an encrypted key and its certificate.
    Pkcs12 {
        archive: Vec<u8>,
        passphrase: Passphrase,
    },
}

impl ClientIdentity {
    pub(crate) fn to_native(&self) -> Result<native_tls::Identity, TrustMaterialError> {
        match self {
            ClientIdentity::Pem { certificate, key } => {
                native_tls::Identity::from_pkcs8(certificate, key)
                    .map_err(|err| TrustMaterialError::invalid("client_key", err))
            }
            ClientIdentity::EncryptedPem {
                certificate,
                key,
                passphrase,
            } => {
                let key = decrypt_pem_key(key, passphrase)?;
                native_tls::Identity::from_pkcs8(certificate, &key)
                    .map_err(|err| TrustMaterialError::invalid("client_key", err))
            }
            ClientIdentity::Pkcs12 {
                archive,
                passphrase,
            } => native_tls::Identity::from_pkcs12(archive, passphrase.expose()).map_err(|err| {
                TrustMaterialError::invalid(
                    "client_key",
                    format!(
                        "expected a PKCS#12 archive decryptable with client_key_pass: {err}"
                    ),
                )
            }),
        }
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::Pem { certificate, .. } => f
                .debug_struct("Pem")
                .field("certificate_len", &certificate.len())
                .finish_non_exhaustive(),
            ClientIdentity::EncryptedPem { certificate, .. } => f
                .debug_struct("EncryptedPem")
                .field("certificate_len", &certificate.len())
                .finish_non_exhaustive(),
            ClientIdentity::Pkcs12 { archive, .. } => f
                .debug_struct("Pkcs12")
                .field("archive_len", &archive.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Decrypt a PEM private key and re-encode it as unencrypted PKCS#8 PEM,
/// the only key form `native_tls::Identity::from_pkcs8` accepts.
fn decrypt_pem_key(key: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, TrustMaterialError> {
    PKey::private_key_from_pem_passphrase(key, passphrase.expose().as_bytes())
        .and_then(|pkey| pkey.private_key_to_pem_pkcs8())
        .map_err(|err| {
            TrustMaterialError::invalid(
                "client_key",
                format!("PEM key could not be decrypted with client_key_pass: {err}"),
            )
        })
}

/// Whether `bytes` hold PEM text rather than a DER archive.
pub(crate) fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes.windows(PEM_BEGIN.len()).any(|window| window == PEM_BEGIN)
}

/// Capability supplying certificates to the TLS connector.
pub trait TrustMaterialProvider: Send + Sync + fmt::Debug {
    /// PEM bundle of trust anchors used to verify the server, if any.
    fn ca_certificates(&self) -> Result<Option<Vec<u8>>, TrustMaterialError>;

    /// Identity presented to the server, if any.
    fn client_identity(&self) -> Result<Option<ClientIdentity>, TrustMaterialError>;
}

/// Trust material read from paths named in the configuration.
#[derive(Clone, Debug, Default)]
pub struct FileTrustMaterial {
    pub ca_file: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub client_key_passphrase: Option<Passphrase>,
}

fn read_file(field: &'static str, path: &PathBuf) -> Result<Vec<u8>, TrustMaterialError> {
    fs::read(path).map_err(|source| TrustMaterialError::Read {
        field,
        path: path.clone(),
        source,
    })
}

impl TrustMaterialProvider for FileTrustMaterial {
    fn ca_certificates(&self) -> Result<Option<Vec<u8>>, TrustMaterialError> {
        self.ca_file
            .as_ref()
            .map(|path| read_file("ca_file", path))
            .transpose()
    }

    fn client_identity(&self) -> Result<Option<ClientIdentity>, TrustMaterialError> {
        if let Some(passphrase) = &self.client_key_passphrase {
            let path = self.client_key.as_ref().ok_or_else(|| {
                TrustMaterialError::invalid("client_key", "client_key_pass requires client_key")
            })?;
            let key = read_file("client_key", path)?;
            if looks_like_pem(&key) {
                let cert = self.client_cert.as_ref().ok_or_else(|| {
                    TrustMaterialError::invalid(
                        "client_cert",
                        "an encrypted PEM client_key requires client_cert",
                    )
                })?;
                return Ok(Some(ClientIdentity::EncryptedPem {
                    certificate: read_file("client_cert", cert)?,
                    key,
                    passphrase: passphrase.clone(),
                }));
            }
            if self.client_cert.is_some() {
                debug!(
                    "splunk_tcp: client_cert ignored; the PKCS#12 client_key carries the certificate"
                );
            }
            return Ok(Some(ClientIdentity::Pkcs12 {
                archive: key,
                passphrase: passphrase.clone(),
            }));
        }
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Ok(Some(ClientIdentity::Pem {
                certificate: read_file("client_cert", cert)?,
                key: read_file("client_key", key)?,
            })),
            (None, None) => Ok(None),
            _ => Err(TrustMaterialError::invalid(
                "client_cert",
                "client_cert and client_key must be configured together",
            )),
        }
    }
}

/// Trust material held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTrustMaterial {
    ca_pem: Option<Vec<u8>>,
    identity: Option<ClientIdentity>,
}

impl InMemoryTrustMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust the certificates in the given PEM bundle.
    pub fn with_ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem = Some(pem.into());
        self
    }

    /// Present a PEM certificate chain and PKCS#8 key.
    pub fn with_client_pem(
        mut self,
        certificate: impl Into<Vec<u8>>,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        self.identity = Some(ClientIdentity::Pem {
            certificate: certificate.into(),
            key: key.into(),
        });
        self
    }

    /// Present a PEM certificate chain and a passphrase-protected PEM key.
    pub fn with_client_encrypted_pem(
        mut self,
        certificate: impl Into<Vec<u8>>,
        key: impl Into<Vec<u8>>,
        passphrase: impl Into<Passphrase>,
    ) -> Self {
        self.identity = Some(ClientIdentity::EncryptedPem {
            certificate: certificate.into(),
            key: key.into(),
            passphrase: passphrase.into(),
        });
        self
    }

    /// Present the identity stored in a PKCS#12 archive.
    pub fn with_client_pkcs12(
        mut self,
        archive: impl Into<Vec<u8>>,
        passphrase: impl Into<Passphrase>,
    ) -> Self {
        self.identity = Some(ClientIdentity::Pkcs12 {
            archive: archive.into(),
            passphrase: passphrase.into(),
        });
        self
    }
}

impl TrustMaterialProvider for InMemoryTrustMaterial {
    fn ca_certificates(&self) -> Result<Option<Vec<u8>>, TrustMaterialError> {
        Ok(self.ca_pem.clone())
    }

    fn client_identity(&self) -> Result<Option<ClientIdentity>, TrustMaterialError> {
        Ok(self.identity.clone())
    }
}

/// Split a PEM bundle into individual certificate blocks.
///
/// `native_tls::Certificate::from_pem` only consumes the first block, so
/// bundles must be split before each anchor is added.
pub(crate) fn split_pem_certificates(bundle: &[u8]) -> Result<Vec<Vec<u8>>, TrustMaterialError> {
    let text = std::str::from_utf8(bundle)
        .map_err(|err| TrustMaterialError::invalid("ca_file", format!("not PEM text: {err}")))?;
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(PEM_CERT_BEGIN) {
        let tail = &rest[start..];
        let Some(end) = tail.find(PEM_CERT_END) else {
            return Err(TrustMaterialError::invalid(
                "ca_file",
                "unterminated certificate block",
            ));
        };
        let block_len = end + PEM_CERT_END.len();
        let mut block = tail[..block_len].as_bytes().to_vec();
        block.push(b'\n');
        blocks.push(block);
        rest = &tail[block_len..];
    }
    if blocks.is_empty() {
        return Err(TrustMaterialError::invalid(
            "ca_file",
            "no PEM certificates found",
        ));
    }
    Ok(blocks)
}
