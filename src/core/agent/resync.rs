// src/core/agent/resync.rs

//! The resynchronization controller.
//!
//! A total endpoint resync asks the plugin to re-declare every endpoint
//! this host should manage. The reply promises a count; ENDPOINTCREATED
//! messages carrying the resync token are counted against it, in whichever
//! order reply and creates arrive. Completion prunes endpoints the control
//! plane no longer declares and reconciles the kernel rule chains with the
//! surviving registry.

use super::Agent;
use crate::core::errors::AgentError;
use crate::core::protocol::{GetAclState, Message, ResyncStateRequest, ResyncStateReply, now_ms};
use crate::core::resync::ResyncContext;
use crate::core::transport::SocketRole;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

impl Agent {
    /// Initiates a total endpoint resync, both periodically and at startup.
    pub async fn resync_endpoints(&mut self) {
        let ctx = ResyncContext::new();
        info!("Do total resync - ID: {}", ctx.id());

        // Every known endpoint must be re-declared under this token or be
        // pruned at completion.
        self.registry.mark_all_pending();

        // Anything queued is superseded: the resync re-declares every
        // endpoint, and each re-declaration re-requests its ACLs.
        self.endpoint_queue.clear();
        self.acl_queue.clear();

        let request = Message::ResyncState(ResyncStateRequest {
            resync_id: ctx.id().to_string(),
            issued: now_ms(),
            hostname: self.hostname.clone(),
        });
        self.resync = Some(ctx);
        self.send_request(request, SocketRole::EpReq).await;
    }

    /// Initiates a full ACL resynchronisation: one GETACLSTATE per known
    /// endpoint.
    pub async fn resync_acls(&mut self) {
        self.acl_queue.clear();

        let mut ids = self.registry.ids();
        ids.sort();
        info!("Requesting ACL state for {} endpoint(s)", ids.len());
        for endpoint_id in ids {
            if let Some(ep) = self.registry.get_mut(&endpoint_id) {
                ep.need_acls = true;
            }
            self.send_request(
                Message::GetAclState(GetAclState {
                    endpoint_id,
                    issued: now_ms(),
                }),
                SocketRole::AclReq,
            )
            .await;
        }
    }

    /// Drives the resync state machine from a RESYNC reply.
    pub(crate) async fn handle_resync_reply(
        &mut self,
        reply: ResyncStateReply,
    ) -> Result<(), AgentError> {
        debug!(
            "Received resync reply: count {} ({})",
            reply.endpoint_count, reply.message
        );

        let Some(ctx) = self.resync.as_mut() else {
            warn!("Resync reply arrived with no resynchronization in flight");
            return Ok(());
        };

        if !reply.rc.is_success() {
            error!("Resync request refused: {}", reply.message);
            self.complete_endpoint_resync(false).await;
            return Ok(());
        }

        // Zero endpoints, or every create raced ahead of the reply: done.
        if reply.endpoint_count <= ctx.recd() {
            self.complete_endpoint_resync(true).await;
        } else {
            ctx.set_expected(reply.endpoint_count);
        }
        Ok(())
    }

    /// Resync has finished. On success, endpoints never re-declared under
    /// the token are no longer ours; either way, rule chains with no
    /// matching endpoint are deleted so the kernel state matches the
    /// registry exactly.
    pub(crate) async fn complete_endpoint_resync(&mut self, successful: bool) {
        debug!("Finishing resynchronisation, success = {}", successful);
        self.resync = None;
        self.last_resync = Instant::now();

        let rules = Arc::clone(&self.rules);

        if successful {
            let mut stale = self.registry.pending_ids();
            stale.sort();
            for endpoint_id in stale {
                if let Some(endpoint) = self.registry.remove(&endpoint_id) {
                    info!("Removing endpoint {} absent from resync", endpoint.id);
                    if let Err(e) = self.sockets.unsubscribe(&endpoint.id).await {
                        error!("Failed to unsubscribe {}: {}", endpoint.id, e);
                    }
                    if let Err(e) = rules.remove_endpoint(&endpoint).await {
                        error!(
                            "Failed to remove rules for endpoint {}: {}",
                            endpoint.id, e
                        );
                    }
                }
            }
        }

        // Remove rules for any endpoints that should no longer exist.
        match rules.list_eps_with_rules().await {
            Ok(installed) => {
                let known = self.registry.suffixes();
                for suffix in installed.difference(&known) {
                    warn!("Removing rules for removed object {}", suffix);
                    if let Err(e) = rules.del_rules(suffix).await {
                        error!("Failed to delete rules for {}: {}", suffix, e);
                    }
                }
            }
            Err(e) => error!("Failed to enumerate installed endpoint rules: {}", e),
        }
    }
}
