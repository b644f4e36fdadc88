//! Builder for [`SplunkTcpSender`](crate::splunk_tcp::SplunkTcpSender).
//!
//! Exposes endpoint selection, event key, timeouts, and TLS configuration.
//! [`SplunkTcpSenderBuilder::build_config`] checks the options that only make
//! sense together (TLS material, file paths) and then runs
//! [`SplunkTcpConfig::validate`], which the sender repeats on construction.

use std::{path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;

use crate::splunk_tcp::{
    DEFAULT_HOST, EncodingFailurePolicy, FileTrustMaterial, Passphrase, SplunkTcpConfig,
    SplunkTcpSender, TlsSettings, TrustMaterialError, TrustMaterialProvider,
};

/// Errors that may occur while configuring a sender.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Invalid user supplied configuration.
    #[error("invalid sender configuration: {0}")]
    InvalidConfig(String),
    /// A certificate or key path does not name a readable file.
    #[error("{field} `{}` does not exist or is not a file", .path.display())]
    MissingFile { field: &'static str, path: PathBuf },
    /// Trust material could not be loaded or parsed.
    #[error(transparent)]
    TrustMaterial(#[from] TrustMaterialError),
    /// Settings could not be deserialised.
    #[error("malformed sender settings: {0}")]
    Settings(#[from] serde_json::Error),
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`SplunkTcpSender`] instances.
#[derive(Clone, Debug, Default)]
pub struct SplunkTcpSenderBuilder {
    host: Option<String>,
    port: Option<u16>,
    event_key: Option<String>,
    use_tls: Option<bool>,
    ssl_verify_peer: Option<bool>,
    tls_server_name: Option<String>,
    ca_file: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
    client_key_passphrase: Option<Passphrase>,
    trust_material: Option<Arc<dyn TrustMaterialProvider>>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    warn_interval: Option<Duration>,
    encoding_policy: Option<EncodingFailurePolicy>,
}

impl SplunkTcpSenderBuilder {
    /// Create a new builder with default settings and no port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target `host` (hostname or IP address).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Name of the record field holding the payload.
    pub fn with_event_key(mut self, key: impl Into<String>) -> Self {
        self.event_key = Some(key.into());
        self
    }

    /// Override the name checked against the server certificate.
    pub fn with_tls_server_name(mut self, name: impl Into<String>) -> Self {
        self.tls_server_name = Some(name.into());
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    pub fn with_client_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(path.into());
        self
    }

    pub fn with_client_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_key = Some(path.into());
        self
    }

    /// Passphrase for an encrypted client key: a PEM key paired with
    /// `client_cert`, or a PKCS#12 archive carrying its own certificate.
    pub fn with_client_key_passphrase(mut self, passphrase: impl Into<Passphrase>) -> Self {
        self.client_key_passphrase = Some(passphrase.into());
        self
    }

    /// Supply certificates from a custom provider instead of file paths.
    pub fn with_trust_material(mut self, provider: Arc<dyn TrustMaterialProvider>) -> Self {
        self.trust_material = Some(provider);
        self
    }

    option_setter!(
        #[doc = "Set the indexer TCP port."]
        with_port,
        port,
        u16
    );
    option_setter!(
        #[doc = "Force TLS on or off. TLS is implied by any certificate option."]
        with_tls,
        use_tls,
        bool
    );
    option_setter!(
        #[doc = "Require a valid server certificate chain and hostname."]
        with_ssl_verify_peer,
        ssl_verify_peer,
        bool
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_warn_interval, warn_interval, Duration);
    option_setter!(with_encoding_policy, encoding_policy, EncodingFailurePolicy);

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.port.is_none() {
            return Err(ConfigurationError::InvalidConfig(
                "sender requires a port".into(),
            ));
        }
        self.validate_tls()
    }

    fn has_file_material(&self) -> bool {
        self.ca_file.is_some()
            || self.client_cert.is_some()
            || self.client_key.is_some()
            || self.client_key_passphrase.is_some()
    }

    fn tls_implied(&self) -> bool {
        self.ssl_verify_peer.unwrap_or(false)
            || self.has_file_material()
            || self.trust_material.is_some()
    }

    fn tls_enabled(&self) -> bool {
        self.use_tls.unwrap_or_else(|| self.tls_implied())
    }

    fn validate_tls(&self) -> Result<(), ConfigurationError> {
        if self.use_tls == Some(false) && self.tls_implied() {
            return Err(ConfigurationError::InvalidConfig(
                "ssl_verify_peer and certificate options require tls".into(),
            ));
        }
        if self.trust_material.is_some() && self.has_file_material() {
            return Err(ConfigurationError::InvalidConfig(
                "trust material provider cannot be combined with certificate paths".into(),
            ));
        }
        self.validate_client_identity()?;
        for (field, path) in [
            ("ca_file", &self.ca_file),
            ("client_cert", &self.client_cert),
            ("client_key", &self.client_key),
        ] {
            if let Some(path) = path
                && !path.is_file()
            {
                return Err(ConfigurationError::MissingFile {
                    field,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_client_identity(&self) -> Result<(), ConfigurationError> {
        if self.client_key_passphrase.is_some() {
            // Whether client_cert is needed depends on the key's format,
            // which is only known once the file is read.
            if self.client_key.is_none() {
                return Err(ConfigurationError::InvalidConfig(
                    "client_key_pass requires client_key".into(),
                ));
            }
            return Ok(());
        }
        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(ConfigurationError::InvalidConfig(
                "client_cert and client_key must be configured together".into(),
            ));
        }
        Ok(())
    }

    fn build_tls_settings(&self, host: &str) -> Option<TlsSettings> {
        if !self.tls_enabled() {
            return None;
        }
        let trust: Arc<dyn TrustMaterialProvider> = match &self.trust_material {
            Some(provider) => Arc::clone(provider),
            None => Arc::new(FileTrustMaterial {
                ca_file: self.ca_file.clone(),
                client_cert: self.client_cert.clone(),
                client_key: self.client_key.clone(),
                client_key_passphrase: self.client_key_passphrase.clone(),
            }),
        };
        Some(TlsSettings {
            verify_peer: self.ssl_verify_peer.unwrap_or(false),
            server_name: self
                .tls_server_name
                .clone()
                .unwrap_or_else(|| host.to_owned()),
            trust,
        })
    }

    fn apply_optional_fields(&self, config: &mut SplunkTcpConfig) {
        if let Some(key) = &self.event_key {
            config.event_key = key.clone();
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(timeout);
        }
        if let Some(interval) = self.warn_interval {
            config.warn_interval = interval;
        }
        if let Some(policy) = self.encoding_policy {
            config.encoding_policy = policy;
        }
    }

    /// Validate the builder and produce an immutable configuration.
    pub fn build_config(&self) -> Result<SplunkTcpConfig, ConfigurationError> {
        self.validate()?;
        let host = self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = self.port.unwrap_or_default();
        let mut config = SplunkTcpConfig::new(host.as_str(), port);
        self.apply_optional_fields(&mut config);
        config.tls = self.build_tls_settings(&host);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, load trust material, and construct the sender.
    pub fn build(&self) -> Result<SplunkTcpSender, ConfigurationError> {
        SplunkTcpSender::new(self.build_config()?)
    }
}
