use hostplane::config::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_minimal_config_applies_defaults() {
    let file = write_config(
        r#"
plugin_endpoint = "controller:9901"
acl_endpoint = "controller:9905"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.resync_interval, Duration::from_secs(30 * 60));
    assert_eq!(config.request_timeout, Duration::from_secs(10));
    assert_eq!(config.liveness_timeout, Duration::from_secs(30));
    assert_eq!(config.queue_capacity, 1024);
    assert!(!config.dry_run);
    assert_eq!(config.log_level, "info");
    assert!(config.log_file.is_none());
    assert!(!config.hostname.is_empty());
}

#[test]
fn test_full_config_round_trip() {
    let file = write_config(
        r#"
hostname = "compute-7"
plugin_endpoint = "controller:9901"
acl_endpoint = "aclmgr:9905"
resync_interval = "45m"
request_timeout = "5s"
liveness_timeout = "1m"
queue_capacity = 64
dry_run = true
log_level = "debug"
log_file = "/var/log/hostplane.log"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.hostname, "compute-7");
    assert_eq!(config.resync_interval, Duration::from_secs(45 * 60));
    assert_eq!(config.request_timeout, Duration::from_secs(5));
    assert_eq!(config.liveness_timeout, Duration::from_secs(60));
    assert_eq!(config.queue_capacity, 64);
    assert!(config.dry_run);
}

#[test]
fn test_companion_port_derivation() {
    let file = write_config(
        r#"
plugin_endpoint = "controller:9901"
acl_endpoint = "aclmgr:9905"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    let (req, rep) = config.plugin_addrs().unwrap();
    assert_eq!(req, "controller:9901");
    assert_eq!(rep, "controller:9902");
    let (req, sub) = config.acl_addrs().unwrap();
    assert_eq!(req, "aclmgr:9905");
    assert_eq!(sub, "aclmgr:9906");
}

#[test]
fn test_missing_upstream_is_an_error() {
    let file = write_config(r#"acl_endpoint = "aclmgr:9905""#);
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_endpoint_without_port_is_an_error() {
    let file = write_config(
        r#"
plugin_endpoint = "controller"
acl_endpoint = "aclmgr:9905"
"#,
    );
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_endpoint_on_last_port_is_an_error() {
    // The companion socket needs port + 1.
    let file = write_config(
        r#"
plugin_endpoint = "controller:65535"
acl_endpoint = "aclmgr:9905"
"#,
    );
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}
