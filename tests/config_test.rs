//! Configuration file loading tests

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use wsrelay::config::{AnnounceAddress, ConfigManager, DeliveryMode, DropPolicy};
use wsrelay::relay::DeliveryPolicy;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"
[server]
bind_addr = "127.0.0.1:9000"
ws_path = "/relay"
health_path = "/live"
shutdown_timeout = "3s"

[relay]
announce_address = "local"
strict_decoding = true

[relay.delivery]
mode = "bounded_drop"
capacity = 64
drop = "newest"

[monitoring]
log_level = "debug"
metrics_enabled = false
stats_path = "/status"
"#,
    );

    let config = ConfigManager::load_from_file(file.path()).unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:9000".parse().unwrap());
    assert_eq!(config.server.ws_path, "/relay");
    assert_eq!(config.server.health_path, "/live");
    assert_eq!(config.server.shutdown_timeout, Duration::from_secs(3));
    assert_eq!(config.relay.announce_address, AnnounceAddress::Local);
    assert!(config.relay.strict_decoding);
    assert_eq!(config.relay.delivery.mode, DeliveryMode::BoundedDrop);
    assert_eq!(config.relay.delivery.capacity, 64);
    assert_eq!(config.relay.delivery.drop, DropPolicy::Newest);
    assert_eq!(config.monitoring.log_level, "debug");
    assert!(!config.monitoring.metrics_enabled);
    assert_eq!(config.monitoring.stats_path, "/status");

    assert!(matches!(
        DeliveryPolicy::from(&config.relay.delivery),
        DeliveryPolicy::DropNewest { capacity: 64 }
    ));
}

#[test]
fn test_empty_file_uses_defaults() {
    let file = write_config("");
    let config = ConfigManager::load_from_file(file.path()).unwrap();
    assert_eq!(config.server.ws_path, "/ws");
    assert_eq!(config.relay.delivery.mode, DeliveryMode::Unbounded);
    assert!(config.monitoring.metrics_enabled);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.server.bind_addr.port(), 8080);
    assert_eq!(config.server.health_path, "/health");
}

#[test]
fn test_malformed_toml_is_rejected() {
    let file = write_config("[server\nbind_addr = ");
    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_unknown_enum_value_is_rejected() {
    let file = write_config("[relay.delivery]\nmode = \"lossy\"\n");
    assert!(ConfigManager::load_from_file(file.path()).is_err());
}

#[test]
fn test_invalid_values_fail_validation() {
    let file = write_config("[server]\nws_path = \"/health\"\n");
    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("must not share the route"));

    let file = write_config("[relay.delivery]\nmode = \"bounded_drop\"\ncapacity = 0\n");
    assert!(ConfigManager::load_from_file(file.path()).is_err());
}
