//! Configuration structures consumed by the sender lifecycle.
//!
//! [`SplunkTcpSenderBuilder`](crate::builder::SplunkTcpSenderBuilder) validates
//! and constructs these values before passing them to
//! [`SplunkTcpSender`](super::SplunkTcpSender). They are immutable once built.

use std::{fmt, sync::Arc, time::Duration};

use crate::builder::ConfigurationError;

use super::{encoder::EncodingFailurePolicy, trust::TrustMaterialProvider};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigurationError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

fn ensure_not_blank(value: &str, field: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::InvalidConfig(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

/// Host used when the configuration does not name one.
pub const DEFAULT_HOST: &str = "localhost";
/// Field holding the pre-serialised payload.
pub const DEFAULT_EVENT_KEY: &str = "event";
/// Default connection timeout applied when dialling and handshaking.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default write timeout applied to socket writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// How often repeated connection failures are summarised in the log.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Indexer endpoint addressed by the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TLS options applied to the connection.
#[derive(Clone, Debug)]
pub struct TlsSettings {
    /// Enforce certificate chain and hostname validation.
    pub verify_peer: bool,
    /// Name checked against the server certificate; usually the host.
    pub server_name: String,
    /// Source of CA bundle and client identity.
    pub trust: Arc<dyn TrustMaterialProvider>,
}

/// Validated sender configuration.
#[derive(Clone, Debug)]
pub struct SplunkTcpConfig {
    pub endpoint: Endpoint,
    pub event_key: String,
    pub tls: Option<TlsSettings>,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub warn_interval: Duration,
    pub encoding_policy: EncodingFailurePolicy,
}

impl SplunkTcpConfig {
    /// Plain TCP configuration targeting `host:port` with default tuning.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint {
                host: host.into(),
                port,
            },
            event_key: DEFAULT_EVENT_KEY.into(),
            tls: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            warn_interval: DEFAULT_WARN_INTERVAL,
            encoding_policy: EncodingFailurePolicy::default(),
        }
    }

    /// Override the TLS configuration.
    pub fn with_tls(mut self, tls: Option<TlsSettings>) -> Self {
        self.tls = tls;
        self
    }

    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Check the invariants every sender relies on. Senders refuse to
    /// construct from a configuration that fails here.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure_not_blank(&self.endpoint.host, "host")?;
        ensure_positive!(self.endpoint.port, "port")?;
        ensure_not_blank(&self.event_key, "event_key")?;
        ensure_positive!(self.connect_timeout.as_millis(), "connect_timeout")?;
        ensure_positive!(self.write_timeout.as_millis(), "write_timeout")?;
        ensure_positive!(self.warn_interval.as_millis(), "warn_interval")?;
        if let Some(tls) = &self.tls {
            ensure_not_blank(&tls.server_name, "tls_server_name")?;
        }
        Ok(())
    }
}
