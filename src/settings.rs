//! Source-agnostic sender settings.
//!
//! Hosts that read configuration from files, environment, or their own plugin
//! frameworks deserialise it into [`SenderSettings`] and convert that into a
//! [`SplunkTcpSenderBuilder`]. Keys use the snake_case names operators already
//! know from the indexer input configuration.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    builder::{ConfigurationError, SplunkTcpSenderBuilder},
    splunk_tcp::{EncodingFailurePolicy, Passphrase},
};

/// Raw key/value settings prior to validation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SenderSettings {
    pub host: Option<String>,
    /// Kept wide so out-of-range values are reported rather than truncated.
    pub port: Option<i64>,
    pub event_key: Option<String>,
    pub use_ssl: Option<bool>,
    pub ssl_verify_peer: Option<bool>,
    pub ssl_server_name: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub client_key_pass: Option<Passphrase>,
    pub connect_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub encoding_policy: Option<EncodingFailurePolicy>,
}

impl SenderSettings {
    /// Deserialise settings from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Deserialise settings from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Convert into a builder, checking the port range on the way.
    pub fn into_builder(self) -> Result<SplunkTcpSenderBuilder, ConfigurationError> {
        let mut builder = SplunkTcpSenderBuilder::new();
        if let Some(port) = self.port {
            let port = u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| {
                    ConfigurationError::InvalidConfig(format!(
                        "port must be between 1 and 65535, got {port}"
                    ))
                })?;
            builder = builder.with_port(port);
        }
        if let Some(host) = self.host {
            builder = builder.with_host(host);
        }
        if let Some(key) = self.event_key {
            builder = builder.with_event_key(key);
        }
        if let Some(use_ssl) = self.use_ssl {
            builder = builder.with_tls(use_ssl);
        }
        if let Some(verify) = self.ssl_verify_peer {
            builder = builder.with_ssl_verify_peer(verify);
        }
        if let Some(name) = self.ssl_server_name {
            builder = builder.with_tls_server_name(name);
        }
        if let Some(path) = self.ca_file {
            builder = builder.with_ca_file(path);
        }
        if let Some(path) = self.client_cert {
            builder = builder.with_client_cert(path);
        }
        if let Some(path) = self.client_key {
            builder = builder.with_client_key(path);
        }
        if let Some(passphrase) = self.client_key_pass {
            builder = builder.with_client_key_passphrase(passphrase);
        }
        if let Some(timeout) = self.connect_timeout_ms {
            builder = builder.with_connect_timeout_ms(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            builder = builder.with_write_timeout_ms(timeout);
        }
        if let Some(policy) = self.encoding_policy {
            builder = builder.with_encoding_policy(policy);
        }
        Ok(builder)
    }
}
