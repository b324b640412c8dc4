// src/core/protocol/mod.rs

//! The control-plane wire protocol.
//!
//! Every message kind exchanged with the endpoint plugin and the ACL manager
//! is a concrete record with typed fields; [`Message`] is the tagged union
//! over all of them, so the set of supported messages is a compile-time
//! contract and validation happens in the deserializer.

pub mod codec;
pub use codec::MessageCodec;

use crate::core::acl::AclSet;
use crate::core::endpoint::{AdminState, MacAddr};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as milliseconds since the epoch, the
/// unit used by every `issued` field on the wire.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The result code carried by replies. Anything other than the literal
/// `"SUCCESS"` is an upstream-supplied error string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReturnCode {
    Success,
    Error(String),
}

impl ReturnCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ReturnCode::Success)
    }
}

impl From<String> for ReturnCode {
    fn from(s: String) -> Self {
        if s == "SUCCESS" {
            ReturnCode::Success
        } else {
            ReturnCode::Error(s)
        }
    }
}

impl From<ReturnCode> for String {
    fn from(rc: ReturnCode) -> Self {
        match rc {
            ReturnCode::Success => "SUCCESS".to_string(),
            ReturnCode::Error(s) => s,
        }
    }
}

/// Outbound request for a total endpoint resynchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncStateRequest {
    pub resync_id: String,
    pub issued: u64,
    pub hostname: String,
}

/// Reply to a [`ResyncStateRequest`], promising a number of ENDPOINTCREATED
/// messages under the same resync token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncStateReply {
    pub rc: ReturnCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub endpoint_count: u32,
}

/// Declares an endpoint this host should manage. Sent both during a resync
/// (with the resync token set) and when a new endpoint appears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCreated {
    pub endpoint_id: String,
    #[serde(default)]
    pub resync_id: Option<String>,
    pub issued: u64,
    pub mac: MacAddr,
    pub state: AdminState,
    #[serde(default)]
    pub addrs: Vec<IpAddr>,
}

/// Refreshes the declared state of an endpoint already known to this host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointUpdated {
    pub endpoint_id: String,
    pub issued: u64,
    pub mac: MacAddr,
    pub state: AdminState,
    #[serde(default)]
    pub addrs: Vec<IpAddr>,
}

/// Active notification that an endpoint is going away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDestroyed {
    pub endpoint_id: String,
    pub issued: u64,
}

/// The acknowledgement this agent sends back on the reply socket after
/// processing an endpoint notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReply {
    pub rc: ReturnCode,
    #[serde(default)]
    pub message: String,
}

/// Outbound request for the ACL state of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAclState {
    pub endpoint_id: String,
    pub issued: u64,
}

/// Reply to a [`GetAclState`] request. The ACLs themselves arrive separately
/// as an [`AclUpdate`] publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAclReply {
    pub rc: ReturnCode,
    #[serde(default)]
    pub message: String,
}

/// Publication of the full ACL set for one endpoint, filtered on the
/// subscription socket by the endpoint id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclUpdate {
    pub endpoint_id: String,
    pub acls: AclSet,
}

/// The tagged union over every message kind the agent sends or receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    #[serde(rename = "RESYNCSTATE")]
    ResyncState(ResyncStateRequest),
    #[serde(rename = "RESYNCREPLY")]
    ResyncReply(ResyncStateReply),
    #[serde(rename = "ENDPOINTCREATED")]
    EndpointCreated(EndpointCreated),
    #[serde(rename = "ENDPOINTUPDATED")]
    EndpointUpdated(EndpointUpdated),
    #[serde(rename = "ENDPOINTDESTROYED")]
    EndpointDestroyed(EndpointDestroyed),
    #[serde(rename = "ENDPOINTREPLY")]
    EndpointReply(EndpointReply),
    #[serde(rename = "GETACLSTATE")]
    GetAclState(GetAclState),
    #[serde(rename = "GETACLREPLY")]
    GetAclReply(GetAclReply),
    #[serde(rename = "ACLUPDATE")]
    AclUpdate(AclUpdate),
}

impl Message {
    /// The wire tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Heartbeat => "HEARTBEAT",
            Message::ResyncState(_) => "RESYNCSTATE",
            Message::ResyncReply(_) => "RESYNCREPLY",
            Message::EndpointCreated(_) => "ENDPOINTCREATED",
            Message::EndpointUpdated(_) => "ENDPOINTUPDATED",
            Message::EndpointDestroyed(_) => "ENDPOINTDESTROYED",
            Message::EndpointReply(_) => "ENDPOINTREPLY",
            Message::GetAclState(_) => "GETACLSTATE",
            Message::GetAclReply(_) => "GETACLREPLY",
            Message::AclUpdate(_) => "ACLUPDATE",
        }
    }
}
