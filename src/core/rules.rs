// src/core/rules.rs

//! The packet-filter shim: the seam between the agent core and the host
//! firewall.
//!
//! [`RuleShim`] is the interface the event loop programs against.
//! [`IptablesRules`] shells out to `iptables`/`ip6tables`, owning only the
//! chains whose names carry the agent's prefix. [`MemoryRules`] records the
//! programmed state in memory and backs both dry-run mode and the test
//! suite. Shim failures are logged and never retried from the core; the
//! next resync reconciles.

use crate::core::acl::{AclRule, AclSet, DefaultPolicy, RuleSet};
use crate::core::endpoint::{AdminState, Endpoint};
use crate::core::errors::AgentError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use tokio::process::Command;
use tracing::{debug, warn};

/// Prefix on every chain this agent owns in the host firewall.
pub const CHAIN_PREFIX: &str = "hpn-";

fn from_chain(suffix: &str) -> String {
    format!("{CHAIN_PREFIX}from-{suffix}")
}

fn to_chain(suffix: &str) -> String {
    format!("{CHAIN_PREFIX}to-{suffix}")
}

/// The host-global dispatch chain all per-endpoint chains hang off.
fn forward_chain() -> String {
    format!("{CHAIN_PREFIX}forward")
}

#[async_trait]
pub trait RuleShim: Send + Sync {
    /// Idempotent install of the host-global baseline rules. Called once at
    /// startup.
    async fn set_global_rules(&self) -> Result<(), AgentError>;

    /// Installs (or rebuilds) the per-endpoint rules reflecting the
    /// endpoint's MAC, addresses, admin state and last applied ACLs.
    async fn program_endpoint(&self, ep: &Endpoint) -> Result<(), AgentError>;

    /// Removes the rules for an endpoint this agent still holds a record of.
    async fn remove_endpoint(&self, ep: &Endpoint) -> Result<(), AgentError>;

    /// Enumerates the rule-chain suffixes the firewall currently holds.
    async fn list_eps_with_rules(&self) -> Result<BTreeSet<String>, AgentError>;

    /// Removes the rule chains for an endpoint suffix, whether or not a
    /// matching endpoint record exists.
    async fn del_rules(&self, suffix: &str) -> Result<(), AgentError>;

    /// Applies a freshly published ACL set to an endpoint.
    async fn update_acls(&self, ep: &Endpoint, acls: &AclSet) -> Result<(), AgentError>;
}

// ---------------------------------------------------------------------------
// iptables implementation
// ---------------------------------------------------------------------------

const IPTABLES: &str = "iptables";
const IP6TABLES: &str = "ip6tables";

#[derive(Debug, Default)]
pub struct IptablesRules;

impl IptablesRules {
    pub fn new() -> Self {
        Self
    }

    async fn run(tool: &str, args: &[&str]) -> Result<String, AgentError> {
        debug!("{} {}", tool, args.join(" "));
        let output = Command::new(tool).args(args).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(AgentError::RuleShim(format!(
                "{} {}: {}",
                tool,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    /// Creates a chain if absent. `-N` fails when the chain exists, which
    /// is the common case after the first run.
    async fn ensure_chain(tool: &str, chain: &str) {
        if let Err(e) = Self::run(tool, &["-N", chain]).await {
            debug!("Chain {} already present: {}", chain, e);
        }
    }

    /// Appends a rule unless an identical one is already installed.
    async fn ensure_rule(tool: &str, args: &[&str]) -> Result<(), AgentError> {
        let mut check = vec!["-C"];
        check.extend_from_slice(args);
        if Self::run(tool, &check).await.is_ok() {
            return Ok(());
        }
        let mut append = vec!["-A"];
        append.extend_from_slice(args);
        Self::run(tool, &append).await?;
        Ok(())
    }

    async fn rebuild_family(
        tool: &str,
        ep: &Endpoint,
        addrs: &[IpAddr],
        acls: &RuleSet,
    ) -> Result<(), AgentError> {
        let from = from_chain(&ep.suffix);
        let to = to_chain(&ep.suffix);
        let forward = forward_chain();

        Self::ensure_chain(tool, &from).await;
        Self::ensure_chain(tool, &to).await;
        Self::run(tool, &["-F", &from]).await?;
        Self::run(tool, &["-F", &to]).await?;
        Self::ensure_rule(tool, &[&forward, "-j", &from]).await?;
        Self::ensure_rule(tool, &[&forward, "-j", &to]).await?;

        if ep.state == AdminState::Disabled {
            Self::run(tool, &["-A", &from, "-j", "DROP"]).await?;
            Self::run(tool, &["-A", &to, "-j", "DROP"]).await?;
            return Ok(());
        }

        // Anti-spoof: traffic from the endpoint must carry its declared MAC
        // and one of its declared addresses.
        for addr in addrs {
            let src = addr.to_string();
            Self::run(
                tool,
                &[
                    "-A", &from, "-s", &src, "-m", "mac", "--mac-source",
                    ep.mac.as_str(), "-j", "RETURN",
                ],
            )
            .await?;
        }
        Self::append_acl_rules(tool, &from, "-d", &acls.outbound).await?;
        Self::append_policy(tool, &from, acls.outbound_default).await?;

        for addr in addrs {
            let dst = addr.to_string();
            Self::run(tool, &["-A", &to, "-d", &dst, "-j", "RETURN"]).await?;
        }
        Self::append_acl_rules(tool, &to, "-s", &acls.inbound).await?;
        Self::append_policy(tool, &to, acls.inbound_default).await?;

        Ok(())
    }

    async fn append_acl_rules(
        tool: &str,
        chain: &str,
        direction_flag: &str,
        rules: &[AclRule],
    ) -> Result<(), AgentError> {
        for rule in rules {
            if rule.group.is_some() {
                // TODO: group rules need member resolution from the ACL
                // manager before they can be rendered.
                warn!("Skipping group-based ACL rule on chain {}", chain);
                continue;
            }
            let port = rule.port.map(|p| p.to_string());
            let mut args: Vec<&str> = vec!["-A", chain];
            if let Some(cidr) = &rule.cidr {
                args.extend_from_slice(&[direction_flag, cidr]);
            }
            if let Some(protocol) = &rule.protocol {
                args.extend_from_slice(&["-p", protocol]);
                if let Some(port) = port.as_deref() {
                    args.extend_from_slice(&["--dport", port]);
                }
            }
            args.extend_from_slice(&["-j", "ACCEPT"]);
            Self::run(tool, &args).await?;
        }
        Ok(())
    }

    async fn append_policy(
        tool: &str,
        chain: &str,
        policy: DefaultPolicy,
    ) -> Result<(), AgentError> {
        let target = match policy {
            DefaultPolicy::Allow => "ACCEPT",
            DefaultPolicy::Deny => "DROP",
        };
        Self::run(tool, &["-A", chain, "-j", target]).await?;
        Ok(())
    }

    fn split_addrs(ep: &Endpoint) -> (Vec<IpAddr>, Vec<IpAddr>) {
        ep.addresses.iter().copied().partition(|addr| addr.is_ipv4())
    }
}

#[async_trait]
impl RuleShim for IptablesRules {
    async fn set_global_rules(&self) -> Result<(), AgentError> {
        let forward = forward_chain();
        for tool in [IPTABLES, IP6TABLES] {
            Self::ensure_chain(tool, &forward).await;
            Self::ensure_rule(tool, &["FORWARD", "-j", &forward]).await?;
        }
        Ok(())
    }

    async fn program_endpoint(&self, ep: &Endpoint) -> Result<(), AgentError> {
        let acls = ep.acls.clone().unwrap_or_default();
        let (v4, v6) = Self::split_addrs(ep);
        Self::rebuild_family(IPTABLES, ep, &v4, &acls.v4).await?;
        Self::rebuild_family(IP6TABLES, ep, &v6, &acls.v6).await?;
        Ok(())
    }

    async fn remove_endpoint(&self, ep: &Endpoint) -> Result<(), AgentError> {
        self.del_rules(&ep.suffix).await
    }

    async fn list_eps_with_rules(&self) -> Result<BTreeSet<String>, AgentError> {
        let mut suffixes = BTreeSet::new();
        for tool in [IPTABLES, IP6TABLES] {
            let listing = Self::run(tool, &["-S"]).await?;
            let marker = format!("-N {}", to_chain(""));
            for line in listing.lines() {
                if let Some(suffix) = line.strip_prefix(&marker) {
                    suffixes.insert(suffix.trim().to_string());
                }
            }
        }
        Ok(suffixes)
    }

    async fn del_rules(&self, suffix: &str) -> Result<(), AgentError> {
        let forward = forward_chain();
        for tool in [IPTABLES, IP6TABLES] {
            for chain in [from_chain(suffix), to_chain(suffix)] {
                // The dispatch jump may already be gone; that is fine.
                if let Err(e) = Self::run(tool, &["-D", &forward, "-j", &chain]).await {
                    debug!("No dispatch jump to {}: {}", chain, e);
                }
                Self::run(tool, &["-F", &chain]).await?;
                Self::run(tool, &["-X", &chain]).await?;
            }
        }
        Ok(())
    }

    async fn update_acls(&self, ep: &Endpoint, _acls: &AclSet) -> Result<(), AgentError> {
        // The endpoint record already carries the new ACL set; a rebuild
        // renders it.
        self.program_endpoint(ep).await
    }
}

// ---------------------------------------------------------------------------
// in-memory implementation (dry-run mode and tests)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    global_installed: bool,
    /// Suffixes with chains installed, mapped to the endpoint id that
    /// programmed them (empty for seeded strays).
    installed: BTreeMap<String, String>,
    acls: BTreeMap<String, AclSet>,
    deleted: Vec<String>,
    list_queries: u32,
}

#[derive(Debug, Default)]
pub struct MemoryRules {
    state: Mutex<MemoryState>,
}

impl MemoryRules {
    pub fn new() -> Self {
        Default::default()
    }

    /// Pre-installs a stray rule chain, as a crashed previous agent run
    /// would leave behind.
    pub fn seed_suffix(&self, suffix: &str) {
        self.state
            .lock()
            .installed
            .insert(suffix.to_string(), String::new());
    }

    pub fn installed_suffixes(&self) -> BTreeSet<String> {
        self.state.lock().installed.keys().cloned().collect()
    }

    pub fn acls_for(&self, suffix: &str) -> Option<AclSet> {
        self.state.lock().acls.get(suffix).cloned()
    }

    /// Suffixes removed via `remove_endpoint` or `del_rules`, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub fn list_queries(&self) -> u32 {
        self.state.lock().list_queries
    }

    pub fn global_installed(&self) -> bool {
        self.state.lock().global_installed
    }
}

#[async_trait]
impl RuleShim for MemoryRules {
    async fn set_global_rules(&self) -> Result<(), AgentError> {
        self.state.lock().global_installed = true;
        Ok(())
    }

    async fn program_endpoint(&self, ep: &Endpoint) -> Result<(), AgentError> {
        debug!("Programming rules for endpoint {} ({})", ep.id, ep.suffix);
        self.state
            .lock()
            .installed
            .insert(ep.suffix.clone(), ep.id.clone());
        Ok(())
    }

    async fn remove_endpoint(&self, ep: &Endpoint) -> Result<(), AgentError> {
        let mut state = self.state.lock();
        state.installed.remove(&ep.suffix);
        state.acls.remove(&ep.suffix);
        state.deleted.push(ep.suffix.clone());
        Ok(())
    }

    async fn list_eps_with_rules(&self) -> Result<BTreeSet<String>, AgentError> {
        let mut state = self.state.lock();
        state.list_queries += 1;
        Ok(state.installed.keys().cloned().collect())
    }

    async fn del_rules(&self, suffix: &str) -> Result<(), AgentError> {
        let mut state = self.state.lock();
        state.installed.remove(suffix);
        state.acls.remove(suffix);
        state.deleted.push(suffix.to_string());
        Ok(())
    }

    async fn update_acls(&self, ep: &Endpoint, acls: &AclSet) -> Result<(), AgentError> {
        self.state
            .lock()
            .acls
            .insert(ep.suffix.clone(), acls.clone());
        Ok(())
    }
}
