// src/config.rs

//! Manages agent configuration: loading, defaults, and validation.

use crate::core::errors::AgentError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::System;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Identity announced to the upstreams. Defaults to the machine's
    /// hostname.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// `host:port` of the endpoint plugin's request socket. The reply
    /// socket lives on the next port up.
    pub plugin_endpoint: String,

    /// `host:port` of the ACL manager's request socket. The subscription
    /// socket lives on the next port up.
    pub acl_endpoint: String,

    /// Interval between periodic total resyncs, measured from the last
    /// completion.
    #[serde(with = "humantime_serde", default = "default_resync_interval")]
    pub resync_interval: Duration,

    /// How long a REQ socket may hold an unanswered request before it is
    /// considered dead.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// How long the reply and subscription sockets may go without inbound
    /// traffic (upstreams heartbeat well inside this window).
    #[serde(with = "humantime_serde", default = "default_liveness_timeout")]
    pub liveness_timeout: Duration,

    /// Bound on each request backlog; the oldest entry is dropped on
    /// overflow.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Record packet-filter programming in memory instead of applying it.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file, written in addition to the console.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_hostname() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

fn default_resync_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_liveness_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            plugin_endpoint: "127.0.0.1:9901".to_string(),
            acl_endpoint: "127.0.0.1:9905".to_string(),
            resync_interval: default_resync_interval(),
            request_timeout: default_request_timeout(),
            liveness_timeout: default_liveness_timeout(),
            queue_capacity: default_queue_capacity(),
            dry_run: false,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {path}"))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AgentError> {
        self.plugin_addrs()?;
        self.acl_addrs()?;
        Ok(())
    }

    /// The request and reply addresses of the endpoint plugin.
    pub fn plugin_addrs(&self) -> Result<(String, String), AgentError> {
        split_endpoint(&self.plugin_endpoint)
    }

    /// The request and subscription addresses of the ACL manager.
    pub fn acl_addrs(&self) -> Result<(String, String), AgentError> {
        split_endpoint(&self.acl_endpoint)
    }
}

/// Splits a `host:port` endpoint into the configured address and its
/// companion on the next port up.
fn split_endpoint(endpoint: &str) -> Result<(String, String), AgentError> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| AgentError::Config(format!("endpoint '{endpoint}' must be host:port")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| AgentError::Config(format!("invalid port in endpoint '{endpoint}'")))?;
    let companion = port.checked_add(1).ok_or_else(|| {
        AgentError::Config(format!("endpoint '{endpoint}' leaves no room for a companion port"))
    })?;
    Ok((format!("{host}:{port}"), format!("{host}:{companion}")))
}
