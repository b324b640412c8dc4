// src/core/registry.rs

//! The in-memory endpoint registry: the authority for what this host
//! currently claims to manage.
//!
//! All access is sequential from the agent's event loop, so a plain
//! `HashMap` is the whole story. Subscription pairing (every insertion has a
//! matching SUB subscribe, every removal a matching unsubscribe) is the
//! agent's job, since the registry holds no socket references.

use crate::core::endpoint::Endpoint;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.endpoints.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(id)
    }

    /// Inserts an endpoint keyed by its id, replacing any previous record.
    pub fn insert(&mut self, endpoint: Endpoint) -> Option<Endpoint> {
        self.endpoints.insert(endpoint.id.clone(), endpoint)
    }

    pub fn remove(&mut self, id: &str) -> Option<Endpoint> {
        self.endpoints.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    /// The set of rule-chain suffixes for every live endpoint.
    pub fn suffixes(&self) -> BTreeSet<String> {
        self.endpoints.values().map(|ep| ep.suffix.clone()).collect()
    }

    /// Marks every endpoint as awaiting re-declaration by a resync.
    pub fn mark_all_pending(&mut self) {
        for ep in self.endpoints.values_mut() {
            ep.pending_resync = true;
        }
    }

    /// Ids of endpoints still awaiting re-declaration.
    pub fn pending_ids(&self) -> Vec<String> {
        self.endpoints
            .values()
            .filter(|ep| ep.pending_resync)
            .map(|ep| ep.id.clone())
            .collect()
    }
}
