// src/core/errors.rs

//! Defines the primary error type for the entire agent.

use crate::core::transport::SocketRole;
use thiserror::Error;

/// The main error enum, representing all possible failures within the agent.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Socket {0} is not connected")]
    NotConnected(SocketRole),

    #[error("Unexpected {kind} message on socket {role}")]
    UnexpectedMessage { role: SocketRole, kind: &'static str },

    #[error("Operation not supported on socket {0}")]
    Unsupported(SocketRole),

    #[error("Unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("Invalid MAC address '{0}'")]
    InvalidMac(String),

    #[error("Rule programming failed: {0}")]
    RuleShim(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
