// src/core/endpoint.rs

//! The endpoint record: one virtual NIC on this host, as declared by the
//! control plane.

use crate::core::acl::AclSet;
use crate::core::errors::AgentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Length of the rule-chain suffix derived from an endpoint id.
pub const SUFFIX_LEN: usize = 11;

/// Derives the short handle used to name this endpoint's packet-filter rule
/// chains: the trailing characters of the id, which for UUID-shaped ids is
/// the unique tail.
pub fn suffix_for(id: &str) -> String {
    let skip = id.chars().count().saturating_sub(SUFFIX_LEN);
    id.chars().skip(skip).collect()
}

/// A validated, normalized (lowercase) Ethernet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(String);

impl MacAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MacAddr {
    type Error = AgentError;

    fn try_from(s: String) -> Result<Self, AgentError> {
        let groups: Vec<&str> = s.split(':').collect();
        let valid = groups.len() == 6
            && groups
                .iter()
                .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()));
        if valid {
            Ok(MacAddr(s.to_ascii_lowercase()))
        } else {
            Err(AgentError::InvalidMac(s))
        }
    }
}

impl FromStr for MacAddr {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, AgentError> {
        MacAddr::try_from(s.to_string())
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.0
    }
}

/// The admin state declared for an endpoint by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    Enabled,
    Disabled,
}

/// One endpoint managed by this host.
///
/// Owned exclusively by the registry; all interaction with the packet-filter
/// shim takes the endpoint as a plain input, so there are no back-references.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Opaque unique identifier, stable across the endpoint's lifetime.
    pub id: String,
    /// Short handle naming this endpoint's rule chains.
    pub suffix: String,
    pub mac: MacAddr,
    pub addresses: BTreeSet<IpAddr>,
    pub state: AdminState,
    /// True while a resync is outstanding and the control plane has not yet
    /// re-declared this endpoint under the active resync token.
    pub pending_resync: bool,
    /// True while an ACL fetch for this endpoint is outstanding or required.
    pub need_acls: bool,
    /// The last ACL set applied to this endpoint, if any.
    pub acls: Option<AclSet>,
}

impl Endpoint {
    pub fn new(id: String, mac: MacAddr) -> Self {
        let suffix = suffix_for(&id);
        Self {
            id,
            suffix,
            mac,
            addresses: BTreeSet::new(),
            state: AdminState::Disabled,
            pending_resync: false,
            need_acls: true,
            acls: None,
        }
    }

    /// Applies the declared state from an endpoint notification, replacing
    /// the address set wholesale.
    pub fn apply(&mut self, mac: MacAddr, state: AdminState, addrs: &[IpAddr]) {
        self.mac = mac;
        self.state = state;
        self.addresses = addrs.iter().copied().collect();
    }

    /// Records a freshly published ACL set and clears the fetch-outstanding
    /// marker.
    pub fn apply_acls(&mut self, acls: AclSet) {
        self.acls = Some(acls);
        self.need_acls = false;
    }
}
