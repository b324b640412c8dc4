// src/core/transport/mod.rs

//! The transport socket set: four logical sockets to the two upstream
//! services, multiplexed by a single poll.
//!
//! The [`Channel`] trait abstracts one logical socket; [`SocketSet`] owns
//! the four channels and is the only surface the agent talks to. The
//! default implementation speaks length-delimited JSON over TCP
//! ([`tcp::TcpChannel`]); [`mock::MockChannel`] is the in-memory
//! implementation the test suite drives.

pub mod mock;
pub mod tcp;

use crate::core::errors::AgentError;
use crate::core::protocol::Message;
use async_trait::async_trait;
use futures::future;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tokio::time;
use tracing::error;

/// The four socket roles the agent maintains.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SocketRole {
    EpReq,
    EpRep,
    AclReq,
    AclSub,
}

impl SocketRole {
    pub const ALL: [SocketRole; 4] = [
        SocketRole::EpReq,
        SocketRole::EpRep,
        SocketRole::AclReq,
        SocketRole::AclSub,
    ];

    /// Whether this role is a strict request/reply socket with at most one
    /// request outstanding.
    pub fn is_request(&self) -> bool {
        matches!(self, SocketRole::EpReq | SocketRole::AclReq)
    }

    /// Whether this role belongs to the endpoint plugin API (as opposed to
    /// the ACL manager API).
    pub fn is_endpoint_api(&self) -> bool {
        matches!(self, SocketRole::EpReq | SocketRole::EpRep)
    }
}

/// One logical socket to an upstream service.
#[async_trait]
pub trait Channel: Send {
    fn role(&self) -> SocketRole;

    /// Tears down and (re)establishes the underlying connection.
    async fn communicate(&mut self, hostname: &str) -> Result<(), AgentError>;

    async fn close(&mut self);

    /// Transmits one message. For REQ roles this marks the request
    /// outstanding.
    async fn send(&mut self, message: Message) -> Result<(), AgentError>;

    /// Non-blocking read of at most one message. For REQ roles a received
    /// message clears the outstanding request.
    fn receive(&mut self) -> Option<Message>;

    /// Resolves once a message is available to [`Channel::receive`]. Pends
    /// forever while the channel is disconnected or idle; the multiplexed
    /// poll bounds the wait.
    async fn wait_readable(&mut self);

    /// Whether a message is already buffered.
    fn has_pending(&self) -> bool;

    /// Meaningful for REQ roles only.
    fn request_outstanding(&self) -> bool;

    /// Whether the liveness window for this role has elapsed.
    fn timed_out(&self, now: Instant) -> bool;

    /// SUB role only: start receiving publications for this topic.
    async fn subscribe(&mut self, _topic: &str) -> Result<(), AgentError> {
        Err(AgentError::Unsupported(self.role()))
    }

    /// SUB role only: stop receiving publications for this topic.
    async fn unsubscribe(&mut self, _topic: &str) -> Result<(), AgentError> {
        Err(AgentError::Unsupported(self.role()))
    }

    /// SUB role only: the currently subscribed topics.
    fn subscriptions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// The four channels, in [`SocketRole::ALL`] order.
pub struct SocketSet {
    channels: Vec<Box<dyn Channel>>,
}

impl SocketSet {
    pub fn new(
        ep_req: Box<dyn Channel>,
        ep_rep: Box<dyn Channel>,
        acl_req: Box<dyn Channel>,
        acl_sub: Box<dyn Channel>,
    ) -> Self {
        let channels = vec![ep_req, ep_rep, acl_req, acl_sub];
        for (channel, role) in channels.iter().zip(SocketRole::ALL) {
            debug_assert_eq!(channel.role(), role);
        }
        Self { channels }
    }

    fn index(role: SocketRole) -> usize {
        match role {
            SocketRole::EpReq => 0,
            SocketRole::EpRep => 1,
            SocketRole::AclReq => 2,
            SocketRole::AclSub => 3,
        }
    }

    fn channel(&self, role: SocketRole) -> &dyn Channel {
        self.channels[Self::index(role)].as_ref()
    }

    fn channel_mut(&mut self, role: SocketRole) -> &mut dyn Channel {
        self.channels[Self::index(role)].as_mut()
    }

    /// Establishes all four connections. Failures are logged, not fatal:
    /// the timeout sweep in the event loop keeps retrying.
    pub async fn connect_all(&mut self, hostname: &str) {
        for channel in self.channels.iter_mut() {
            let role = channel.role();
            if let Err(e) = channel.communicate(hostname).await {
                error!("Failed to connect socket {}: {}", role, e);
            }
        }
    }

    /// Polls all four sockets for readability, waiting at most `timeout`.
    /// Returns the roles with a message ready to receive.
    pub async fn poll(&mut self, timeout: Duration) -> Vec<SocketRole> {
        let ready = self.pending_roles();
        if !ready.is_empty() {
            return ready;
        }

        let waits: Vec<_> = self
            .channels
            .iter_mut()
            .map(|channel| channel.wait_readable())
            .collect();
        let _ = time::timeout(timeout, future::select_all(waits)).await;

        self.pending_roles()
    }

    fn pending_roles(&self) -> Vec<SocketRole> {
        self.channels
            .iter()
            .filter(|channel| channel.has_pending())
            .map(|channel| channel.role())
            .collect()
    }

    pub fn receive(&mut self, role: SocketRole) -> Option<Message> {
        self.channel_mut(role).receive()
    }

    pub async fn send(&mut self, role: SocketRole, message: Message) -> Result<(), AgentError> {
        self.channel_mut(role).send(message).await
    }

    pub fn request_outstanding(&self, role: SocketRole) -> bool {
        self.channel(role).request_outstanding()
    }

    pub fn timed_out(&self, role: SocketRole, now: Instant) -> bool {
        self.channel(role).timed_out(now)
    }

    /// Tears down and re-establishes one socket. A failed reconnect is
    /// logged; the socket stays timed out and the next iteration retries.
    pub async fn reconnect(&mut self, role: SocketRole, hostname: &str) {
        let channel = self.channel_mut(role);
        channel.close().await;
        if let Err(e) = channel.communicate(hostname).await {
            error!("Failed to reconnect socket {}: {}", role, e);
        }
    }

    pub async fn subscribe(&mut self, endpoint_id: &str) -> Result<(), AgentError> {
        self.channel_mut(SocketRole::AclSub).subscribe(endpoint_id).await
    }

    pub async fn unsubscribe(&mut self, endpoint_id: &str) -> Result<(), AgentError> {
        self.channel_mut(SocketRole::AclSub)
            .unsubscribe(endpoint_id)
            .await
    }

    /// The endpoint ids currently subscribed on the ACL SUB socket.
    pub fn subscriptions(&self) -> Vec<String> {
        self.channel(SocketRole::AclSub).subscriptions()
    }
}
