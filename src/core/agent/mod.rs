// src/core/agent/mod.rs

//! The agent: event loop, message dispatch and the state it serializes.
//!
//! The whole core runs as one logical actor. The [`Agent`] value owns the
//! socket set, the endpoint registry, the request queues and the resync
//! context; every mutation happens inside [`Agent::iterate`], and the only
//! suspension point is the multiplexed poll. No locks, no handler threads.

pub mod handlers;
pub mod resync;

use crate::config::Config;
use crate::core::errors::AgentError;
use crate::core::protocol::Message;
use crate::core::queue::RequestQueue;
use crate::core::registry::EndpointRegistry;
use crate::core::resync::ResyncContext;
use crate::core::rules::{IptablesRules, MemoryRules, RuleShim};
use crate::core::transport::tcp::TcpChannel;
use crate::core::transport::{SocketRole, SocketSet};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Deadline for one multiplexed poll over the four sockets.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct Agent {
    config: Config,
    hostname: String,
    sockets: SocketSet,
    registry: EndpointRegistry,
    endpoint_queue: RequestQueue,
    acl_queue: RequestQueue,
    resync: Option<ResyncContext>,
    last_resync: Instant,
    rules: Arc<dyn RuleShim>,
}

/// Builds an agent wired to its upstreams over TCP and runs it forever.
pub async fn run(config: Config) -> Result<()> {
    let rules: Arc<dyn RuleShim> = if config.dry_run {
        info!("Dry-run mode: packet-filter programming is recorded, not applied");
        Arc::new(MemoryRules::new())
    } else {
        Arc::new(IptablesRules::new())
    };

    let (plugin_req, plugin_rep) = config.plugin_addrs()?;
    let (acl_req, acl_sub) = config.acl_addrs()?;
    let channel = |role, addr| {
        Box::new(TcpChannel::new(
            role,
            addr,
            config.request_timeout,
            config.liveness_timeout,
        ))
    };
    let sockets = SocketSet::new(
        channel(SocketRole::EpReq, plugin_req),
        channel(SocketRole::EpRep, plugin_rep),
        channel(SocketRole::AclReq, acl_req),
        channel(SocketRole::AclSub, acl_sub),
    );

    let mut agent = Agent::new(config, sockets, rules);
    agent.start().await?;
    loop {
        agent.iterate().await;
    }
}

impl Agent {
    pub fn new(config: Config, sockets: SocketSet, rules: Arc<dyn RuleShim>) -> Self {
        let hostname = config.hostname.clone();
        let capacity = config.queue_capacity;
        Self {
            config,
            hostname,
            sockets,
            registry: EndpointRegistry::new(),
            endpoint_queue: RequestQueue::new(capacity),
            acl_queue: RequestQueue::new(capacity),
            resync: None,
            last_resync: Instant::now(),
            rules,
        }
    }

    /// Startup: install the host-global baseline rules, connect the four
    /// sockets, and begin a full endpoint resync. The agent is stateless
    /// across restarts; the resync is how it re-learns the world.
    ///
    /// No ACL resync here: the endpoint resync triggers a per-endpoint ACL
    /// fetch as each ENDPOINTCREATED arrives.
    pub async fn start(&mut self) -> Result<(), AgentError> {
        self.rules.set_global_rules().await?;
        self.sockets.connect_all(&self.hostname).await;
        self.resync_endpoints().await;
        Ok(())
    }

    /// One turn of the event loop.
    pub async fn iterate(&mut self) {
        let mut endpoint_resync_needed = false;
        let mut acl_resync_needed = false;

        // Pull one message off each readable socket and dispatch it.
        let readable = self.sockets.poll(POLL_TIMEOUT).await;
        for role in readable {
            if let Some(message) = self.sockets.receive(role) {
                let kind = message.kind();
                if let Err(e) = self.dispatch(role, message).await {
                    error!("Error handling {} on socket {}: {}", kind, role, e);
                }
            }
        }

        // A timed-out socket is reconnected, and whichever API it belongs
        // to needs a resync. Queued requests for that socket are stale.
        let now = Instant::now();
        for role in SocketRole::ALL {
            if self.sockets.timed_out(role, now) {
                warn!("Socket {} timed out", role);
                self.sockets.reconnect(role, &self.hostname).await;

                if role.is_endpoint_api() {
                    endpoint_resync_needed = true;
                } else {
                    acl_resync_needed = true;
                }

                match role {
                    SocketRole::EpReq => self.endpoint_queue.clear(),
                    SocketRole::AclReq => self.acl_queue.clear(),
                    _ => {}
                }
            }
        }

        // Drain one queued request per idle REQ socket.
        drain(&mut self.sockets, &mut self.endpoint_queue, SocketRole::EpReq).await;
        drain(&mut self.sockets, &mut self.acl_queue, SocketRole::AclReq).await;

        // Periodic total resync, measured from the last completion.
        if self.resync.is_none() && self.last_resync.elapsed() > self.config.resync_interval {
            endpoint_resync_needed = true;
        }

        // An endpoint resync subsumes an ACL resync: every ENDPOINTCREATED
        // it triggers fetches that endpoint's ACLs.
        if endpoint_resync_needed {
            self.resync_endpoints().await;
        } else if acl_resync_needed {
            self.resync_acls().await;
        }
    }

    /// Sends a request on a REQ socket, or queues it while one is already
    /// outstanding.
    pub(crate) async fn send_request(&mut self, message: Message, role: SocketRole) {
        debug_assert!(role.is_request());
        if self.sockets.request_outstanding(role) {
            let queue = if role == SocketRole::EpReq {
                &mut self.endpoint_queue
            } else {
                &mut self.acl_queue
            };
            queue.push(message);
        } else if let Err(e) = self.sockets.send(role, message).await {
            error!("Failed to send request on {}: {}", role, e);
        }
    }

    // --- introspection, used by the test suite and operational tooling ---

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// The active resync token, if a resync is in flight.
    pub fn resync_id(&self) -> Option<&str> {
        self.resync.as_ref().map(|ctx| ctx.id())
    }

    /// Depths of the endpoint and ACL request queues.
    pub fn queue_depths(&self) -> (usize, usize) {
        (self.endpoint_queue.len(), self.acl_queue.len())
    }

    pub fn sockets(&self) -> &SocketSet {
        &self.sockets
    }
}

async fn drain(sockets: &mut SocketSet, queue: &mut RequestQueue, role: SocketRole) {
    if !sockets.request_outstanding(role) {
        if let Some(message) = queue.pop() {
            if let Err(e) = sockets.send(role, message).await {
                error!("Failed to send queued request on {}: {}", role, e);
            }
        }
    }
}
