//! Builder and settings validation.

mod test_utils;

use std::{io::Write, sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use serde_json::json;
use splunk_tcp_rs::{
    ConfigurationError, ConnectionState, EncodingFailurePolicy, InMemoryTrustMaterial,
    SenderSettings, SplunkTcpSenderBuilder,
    splunk_tcp::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_KEY, DEFAULT_HOST, DEFAULT_WRITE_TIMEOUT},
};
use tempfile::NamedTempFile;
use test_utils::{CA_PEM, CLIENT_KEY_PASSPHRASE, fixture_path};

#[fixture]
fn builder() -> SplunkTcpSenderBuilder {
    SplunkTcpSenderBuilder::new().with_port(8089)
}

fn invalid_message(result: Result<impl std::fmt::Debug, ConfigurationError>) -> String {
    match result {
        Err(ConfigurationError::InvalidConfig(message)) => message,
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

fn temp_file_with(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents).expect("write temp file");
    file
}

#[rstest]
fn defaults_apply_when_only_port_is_set(builder: SplunkTcpSenderBuilder) {
    let config = builder.build_config().expect("valid config");
    assert_eq!(config.endpoint.host, DEFAULT_HOST);
    assert_eq!(config.endpoint.port, 8089);
    assert_eq!(config.event_key, DEFAULT_EVENT_KEY);
    assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    assert_eq!(config.encoding_policy, EncodingFailurePolicy::SkipInvalid);
    assert!(!config.uses_tls());
}

#[rstest]
fn building_does_not_connect(builder: SplunkTcpSenderBuilder) {
    let sender = builder.build().expect("build sender");
    assert_eq!(sender.connection_state(), ConnectionState::Disconnected);
}

#[rstest]
fn explicit_values_override_defaults(builder: SplunkTcpSenderBuilder) {
    let config = builder
        .with_host("splunk.internal")
        .with_event_key("message")
        .with_connect_timeout_ms(250)
        .with_write_timeout_ms(750)
        .with_encoding_policy(EncodingFailurePolicy::RejectChunk)
        .build_config()
        .expect("valid config");
    assert_eq!(config.endpoint.to_string(), "splunk.internal:8089");
    assert_eq!(config.event_key, "message");
    assert_eq!(config.connect_timeout, Duration::from_millis(250));
    assert_eq!(config.write_timeout, Duration::from_millis(750));
    assert_eq!(config.encoding_policy, EncodingFailurePolicy::RejectChunk);
}

#[rstest]
fn missing_port_is_rejected() {
    let message = invalid_message(SplunkTcpSenderBuilder::new().build_config());
    assert!(message.contains("port"), "{message}");
}

#[rstest]
#[case::zero_port(SplunkTcpSenderBuilder::new().with_port(0), "port")]
#[case::blank_host(SplunkTcpSenderBuilder::new().with_port(1).with_host("  "), "host")]
#[case::empty_event_key(SplunkTcpSenderBuilder::new().with_port(1).with_event_key(""), "event_key")]
#[case::blank_event_key(SplunkTcpSenderBuilder::new().with_port(1).with_event_key(" "), "event_key")]
#[case::zero_connect_timeout(
    SplunkTcpSenderBuilder::new().with_port(1).with_connect_timeout_ms(0),
    "connect_timeout"
)]
#[case::zero_write_timeout(
    SplunkTcpSenderBuilder::new().with_port(1).with_write_timeout_ms(0),
    "write_timeout"
)]
#[case::zero_warn_interval(
    SplunkTcpSenderBuilder::new().with_port(1).with_warn_interval(Duration::ZERO),
    "warn_interval"
)]
#[case::blank_server_name(
    SplunkTcpSenderBuilder::new().with_port(1).with_tls(true).with_tls_server_name(""),
    "tls_server_name"
)]
fn invalid_values_are_rejected(#[case] builder: SplunkTcpSenderBuilder, #[case] field: &str) {
    let message = invalid_message(builder.build_config());
    assert!(message.contains(field), "{message}");
}

#[rstest]
#[case::verify_peer(SplunkTcpSenderBuilder::new().with_ssl_verify_peer(true))]
#[case::ca_file(SplunkTcpSenderBuilder::new().with_ca_file(fixture_path("ca.pem")))]
#[case::client_pair(
    SplunkTcpSenderBuilder::new()
        .with_client_cert(fixture_path("client.pem"))
        .with_client_key(fixture_path("client.key"))
)]
#[case::provider(
    SplunkTcpSenderBuilder::new()
        .with_trust_material(Arc::new(InMemoryTrustMaterial::new().with_ca_pem(CA_PEM)))
)]
fn certificate_options_imply_tls(#[case] builder: SplunkTcpSenderBuilder) {
    let config = builder.with_port(8089).build_config().expect("valid config");
    let tls = config.tls.as_ref().expect("tls enabled");
    assert_eq!(tls.server_name, DEFAULT_HOST);
}

#[rstest]
fn verify_peer_is_off_unless_requested(builder: SplunkTcpSenderBuilder) {
    let config = builder.with_tls(true).build_config().expect("valid config");
    assert!(!config.tls.expect("tls enabled").verify_peer);
}

#[rstest]
fn server_name_defaults_to_host_and_can_be_overridden(builder: SplunkTcpSenderBuilder) {
    let builder = builder.with_host("10.0.0.5").with_tls(true);
    let default_name = builder.build_config().expect("valid config");
    assert_eq!(default_name.tls.expect("tls enabled").server_name, "10.0.0.5");

    let overridden = builder
        .with_tls_server_name("indexer.example.com")
        .build_config()
        .expect("valid config");
    assert_eq!(
        overridden.tls.expect("tls enabled").server_name,
        "indexer.example.com"
    );
}

#[rstest]
fn disabling_tls_with_certificate_options_is_rejected(builder: SplunkTcpSenderBuilder) {
    let message = invalid_message(
        builder
            .with_tls(false)
            .with_ca_file(fixture_path("ca.pem"))
            .build_config(),
    );
    assert!(message.contains("require tls"), "{message}");
}

#[rstest]
fn provider_and_paths_are_mutually_exclusive(builder: SplunkTcpSenderBuilder) {
    let message = invalid_message(
        builder
            .with_ca_file(fixture_path("ca.pem"))
            .with_trust_material(Arc::new(InMemoryTrustMaterial::new()))
            .build_config(),
    );
    assert!(message.contains("cannot be combined"), "{message}");
}

#[rstest]
#[case::cert_only(SplunkTcpSenderBuilder::new().with_client_cert(fixture_path("client.pem")))]
#[case::key_only(SplunkTcpSenderBuilder::new().with_client_key(fixture_path("client.key")))]
fn unpaired_client_pem_is_rejected(#[case] builder: SplunkTcpSenderBuilder) {
    let message = invalid_message(builder.with_port(8089).build_config());
    assert!(message.contains("together"), "{message}");
}

#[rstest]
fn passphrase_requires_client_key(builder: SplunkTcpSenderBuilder) {
    let message = invalid_message(
        builder
            .with_client_key_passphrase("secret")
            .build_config(),
    );
    assert!(message.contains("client_key"), "{message}");
}

#[rstest]
fn missing_certificate_file_names_the_field(builder: SplunkTcpSenderBuilder) {
    let err = builder
        .with_ca_file("/nonexistent/splunk/ca.pem")
        .build_config()
        .expect_err("path does not exist");
    match &err {
        ConfigurationError::MissingFile { field, path } => {
            assert_eq!(*field, "ca_file");
            assert!(path.ends_with("ca.pem"));
        }
        other => panic!("expected MissingFile, got {other:?}"),
    }
    assert!(err.to_string().contains("/nonexistent/splunk/ca.pem"));
}

#[rstest]
fn directory_is_not_a_certificate_file(builder: SplunkTcpSenderBuilder) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = builder
        .with_ca_file(dir.path())
        .build_config()
        .expect_err("directory is not a file");
    assert!(matches!(err, ConfigurationError::MissingFile { field: "ca_file", .. }));
}

#[rstest]
fn malformed_ca_bundle_fails_at_build(builder: SplunkTcpSenderBuilder) {
    let bogus = temp_file_with(b"this is not a certificate\n");
    let builder = builder.with_ca_file(bogus.path());

    builder.build_config().expect("paths are valid");
    let err = builder.build().expect_err("bundle cannot be parsed");

    assert!(matches!(err, ConfigurationError::TrustMaterial(_)), "{err:?}");
    assert!(err.to_string().contains("ca_file"), "{err}");
}

#[rstest]
fn wrong_pkcs12_passphrase_fails_at_build(builder: SplunkTcpSenderBuilder) {
    let err = builder
        .with_client_key(fixture_path("client.p12"))
        .with_client_key_passphrase("not-the-passphrase")
        .build()
        .expect_err("archive cannot be decrypted");
    assert!(matches!(err, ConfigurationError::TrustMaterial(_)), "{err:?}");
    assert!(err.to_string().contains("client_key"), "{err}");
}

#[rstest]
fn pem_key_given_a_passphrase_requires_client_cert(builder: SplunkTcpSenderBuilder) {
    let err = builder
        .with_client_key(fixture_path("client_enc.key"))
        .with_client_key_passphrase(CLIENT_KEY_PASSPHRASE)
        .build()
        .expect_err("a PEM key carries no certificate");
    assert!(matches!(err, ConfigurationError::TrustMaterial(_)), "{err:?}");
    assert!(err.to_string().contains("client_cert"), "{err}");
}

#[rstest]
fn wrong_pem_key_passphrase_fails_at_build(builder: SplunkTcpSenderBuilder) {
    let err = builder
        .with_client_cert(fixture_path("client.pem"))
        .with_client_key(fixture_path("client_enc.key"))
        .with_client_key_passphrase("not-the-passphrase")
        .build()
        .expect_err("key cannot be decrypted");
    assert!(matches!(err, ConfigurationError::TrustMaterial(_)), "{err:?}");
    assert!(err.to_string().contains("client_key_pass"), "{err}");
}

#[rstest]
fn sub_second_warn_interval_is_kept(builder: SplunkTcpSenderBuilder) {
    let config = builder
        .with_warn_interval(Duration::from_millis(250))
        .build_config()
        .expect("valid config");
    assert_eq!(config.warn_interval, Duration::from_millis(250));
}

#[rstest]
fn valid_file_material_builds(builder: SplunkTcpSenderBuilder) {
    let sender = builder
        .with_ssl_verify_peer(true)
        .with_ca_file(fixture_path("ca.pem"))
        .with_client_cert(fixture_path("client.pem"))
        .with_client_key(fixture_path("client.key"))
        .build()
        .expect("build sender");
    assert!(sender.config().uses_tls());
}

#[rstest]
fn settings_convert_into_a_working_builder() {
    let ca = fixture_path("ca.pem");
    let settings = SenderSettings::from_value(json!({
        "host": "127.0.0.1",
        "port": 12500,
        "event_key": "payload",
        "ssl_verify_peer": true,
        "ssl_server_name": "localhost",
        "ca_file": ca,
        "connect_timeout_ms": 1000,
    }))
    .expect("parse settings");

    let config = settings
        .into_builder()
        .expect("port in range")
        .build_config()
        .expect("valid config");

    assert_eq!(config.endpoint.to_string(), "127.0.0.1:12500");
    assert_eq!(config.event_key, "payload");
    assert_eq!(config.connect_timeout, Duration::from_secs(1));
    let tls = config.tls.expect("tls implied by ssl_verify_peer");
    assert!(tls.verify_peer);
    assert_eq!(tls.server_name, "localhost");
}

#[rstest]
fn settings_with_use_ssl_false_and_ca_file_are_rejected() {
    let settings = SenderSettings::from_value(json!({
        "port": 12500,
        "use_ssl": false,
        "ca_file": fixture_path("ca.pem"),
    }))
    .expect("parse settings");
    let message = invalid_message(settings.into_builder().expect("port ok").build_config());
    assert!(message.contains("require tls"), "{message}");
}
