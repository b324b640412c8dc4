// src/core/acl.rs

//! Per-endpoint access-control lists as published by the ACL manager.

use serde::{Deserialize, Serialize};

/// What happens to traffic that matches no rule in a [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    #[default]
    Deny,
    Allow,
}

/// One allow rule. Fields are optional match criteria; a rule with only a
/// `cidr` matches all traffic to or from that prefix, a rule with `group`
/// matches traffic from members of that security group, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AclRule {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// The inbound and outbound rules for one address family.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub inbound: Vec<AclRule>,
    #[serde(default)]
    pub outbound: Vec<AclRule>,
    #[serde(default)]
    pub inbound_default: DefaultPolicy,
    #[serde(default)]
    pub outbound_default: DefaultPolicy,
}

/// The complete ACL state for one endpoint, split by address family.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AclSet {
    #[serde(default)]
    pub v4: RuleSet,
    #[serde(default)]
    pub v6: RuleSet,
}
