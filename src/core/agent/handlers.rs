// src/core/agent/handlers.rs

//! Typed message handlers. Dispatch is an exhaustive match over the socket
//! role and message kind; anything outside the table is a protocol error
//! that gets logged and dropped.

use super::Agent;
use crate::core::endpoint::{AdminState, Endpoint, MacAddr};
use crate::core::errors::AgentError;
use crate::core::protocol::{
    AclUpdate, EndpointCreated, EndpointDestroyed, EndpointReply, EndpointUpdated, GetAclReply,
    GetAclState, Message, ReturnCode, now_ms,
};
use crate::core::transport::SocketRole;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

impl Agent {
    pub(crate) async fn dispatch(
        &mut self,
        role: SocketRole,
        message: Message,
    ) -> Result<(), AgentError> {
        match (role, message) {
            (SocketRole::EpRep, Message::Heartbeat) => self.handle_heartbeat().await,
            (SocketRole::AclSub, Message::Heartbeat) => {
                debug!("Heartbeat on ACL subscription");
                Ok(())
            }
            (SocketRole::EpRep, Message::EndpointCreated(m)) => {
                self.handle_endpoint_created(m).await
            }
            (SocketRole::EpRep, Message::EndpointUpdated(m)) => {
                self.handle_endpoint_updated(m).await
            }
            (SocketRole::EpRep, Message::EndpointDestroyed(m)) => {
                self.handle_endpoint_destroyed(m).await
            }
            (SocketRole::EpReq, Message::ResyncReply(m)) => self.handle_resync_reply(m).await,
            (SocketRole::AclReq, Message::GetAclReply(m)) => self.handle_get_acl_reply(m),
            (SocketRole::AclSub, Message::AclUpdate(m)) => self.handle_acl_update(m).await,
            (role, other) => Err(AgentError::UnexpectedMessage {
                role,
                kind: other.kind(),
            }),
        }
    }

    /// HEARTBEAT requests are answered immediately on the reply socket.
    async fn handle_heartbeat(&mut self) -> Result<(), AgentError> {
        debug!("Received heartbeat message");
        self.sockets.send(SocketRole::EpRep, Message::Heartbeat).await
    }

    /// ENDPOINTCREATED arrives both as part of a resync and to announce a
    /// brand-new endpoint.
    async fn handle_endpoint_created(&mut self, m: EndpointCreated) -> Result<(), AgentError> {
        debug!("Received endpoint create: {}", m.endpoint_id);

        if self.registry.contains(&m.endpoint_id) {
            if m.resync_id.is_some() {
                warn!(
                    "Received endpoint creation for existing endpoint {}",
                    m.endpoint_id
                );
            }
        } else {
            self.create_endpoint(&m.endpoint_id, m.mac.clone()).await;
        }

        self.update_endpoint_record(&m.endpoint_id, m.mac, m.state, &m.addrs)
            .await?;
        self.reply_endpoint_ack(ReturnCode::Success, "").await;

        // Resync accounting. A stale or absent token means this create was
        // a normal endpoint update as far as the resync is concerned.
        let mut finished = false;
        if let Some(ctx) = self.resync.as_mut() {
            if ctx.matches(m.resync_id.as_deref()) {
                if let Some(ep) = self.registry.get_mut(&m.endpoint_id) {
                    ep.pending_resync = false;
                }
                ctx.record_created();
                finished = ctx.is_complete();
            }
        }
        if finished {
            self.complete_endpoint_resync(true).await;
        }
        Ok(())
    }

    /// ENDPOINTUPDATED: same update path as create, but never creates and
    /// never touches the resync counters.
    async fn handle_endpoint_updated(&mut self, m: EndpointUpdated) -> Result<(), AgentError> {
        debug!("Received endpoint update: {}", m.endpoint_id);

        if !self.registry.contains(&m.endpoint_id) {
            error!("Received update for absent endpoint {}", m.endpoint_id);
            // Still answer: leaving the reply socket without a response
            // would wedge the upstream's request state machine.
            self.reply_endpoint_ack(
                ReturnCode::Error("NOTFOUND".to_string()),
                "no such endpoint",
            )
            .await;
            return Ok(());
        }

        self.update_endpoint_record(&m.endpoint_id, m.mac, m.state, &m.addrs)
            .await?;
        self.reply_endpoint_ack(ReturnCode::Success, "").await;
        Ok(())
    }

    /// ENDPOINTDESTROYED: active notification that an endpoint is gone.
    async fn handle_endpoint_destroyed(&mut self, m: EndpointDestroyed) -> Result<(), AgentError> {
        debug!("Received endpoint destroy: {}", m.endpoint_id);

        let Some(endpoint) = self.registry.remove(&m.endpoint_id) else {
            error!("Received destroy for absent endpoint {}", m.endpoint_id);
            return Ok(());
        };

        if let Err(e) = self.sockets.unsubscribe(&endpoint.id).await {
            error!("Failed to unsubscribe {}: {}", endpoint.id, e);
        }
        if let Err(e) = self.rules.remove_endpoint(&endpoint).await {
            error!("Failed to remove rules for endpoint {}: {}", endpoint.id, e);
        }
        Ok(())
    }

    /// GETACLSTATE replies carry no data; the ACLs arrive as publications.
    /// Nothing to do beyond surfacing refusals.
    fn handle_get_acl_reply(&mut self, m: GetAclReply) -> Result<(), AgentError> {
        debug!("Received ACL state reply");
        if !m.rc.is_success() {
            error!("ACL state request refused: {}", m.message);
        }
        Ok(())
    }

    /// ACLUPDATE publications are filtered by endpoint id. An update for an
    /// endpoint we no longer know is the unsubscribe race; drop it.
    async fn handle_acl_update(&mut self, m: AclUpdate) -> Result<(), AgentError> {
        debug!("Received ACL update for {}", m.endpoint_id);

        let rules = Arc::clone(&self.rules);
        let Some(endpoint) = self.registry.get_mut(&m.endpoint_id) else {
            debug!(
                "ACL update for unknown endpoint {}; dropping",
                m.endpoint_id
            );
            return Ok(());
        };

        endpoint.apply_acls(m.acls.clone());
        if let Err(e) = rules.update_acls(endpoint, &m.acls).await {
            error!("Failed to apply ACLs for endpoint {}: {}", m.endpoint_id, e);
        }
        Ok(())
    }

    /// First sight of an endpoint: register it, subscribe to its ACL
    /// publications, then request its ACL state. Subscribing first means no
    /// publication can slip through the gap.
    async fn create_endpoint(&mut self, endpoint_id: &str, mac: MacAddr) {
        debug!("Create endpoint {}", endpoint_id);
        self.registry
            .insert(Endpoint::new(endpoint_id.to_string(), mac));

        if let Err(e) = self.sockets.subscribe(endpoint_id).await {
            error!("Failed to subscribe {}: {}", endpoint_id, e);
        }

        self.send_request(
            Message::GetAclState(GetAclState {
                endpoint_id: endpoint_id.to_string(),
                issued: now_ms(),
            }),
            SocketRole::AclReq,
        )
        .await;
    }

    /// Applies declared state to the registry record and programs the
    /// packet filter for it.
    async fn update_endpoint_record(
        &mut self,
        endpoint_id: &str,
        mac: MacAddr,
        state: AdminState,
        addrs: &[IpAddr],
    ) -> Result<(), AgentError> {
        let rules = Arc::clone(&self.rules);
        let Some(endpoint) = self.registry.get_mut(endpoint_id) else {
            return Err(AgentError::UnknownEndpoint(endpoint_id.to_string()));
        };
        endpoint.apply(mac, state, addrs);
        if let Err(e) = rules.program_endpoint(endpoint).await {
            error!("Failed to program rules for endpoint {}: {}", endpoint_id, e);
        }
        Ok(())
    }

    async fn reply_endpoint_ack(&mut self, rc: ReturnCode, message: &str) {
        let reply = Message::EndpointReply(EndpointReply {
            rc,
            message: message.to_string(),
        });
        if let Err(e) = self.sockets.send(SocketRole::EpRep, reply).await {
            error!("Failed to send endpoint reply: {}", e);
        }
    }
}
