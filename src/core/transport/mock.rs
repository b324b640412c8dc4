// src/core/transport/mock.rs

//! In-memory channel used by the test suite.
//!
//! The channel half implements [`Channel`] for the agent; the handle half
//! stays with the test, which injects inbound messages and inspects what
//! the agent did. Every observable action is stamped with a process-wide
//! sequence number so tests can assert cross-socket ordering (for example
//! that a subscription lands before the matching ACL request).

use crate::core::errors::AgentError;
use crate::core::protocol::Message;
use crate::core::transport::{Channel, SocketRole};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// One observable action taken by the agent on a mock channel.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Connected,
    Sent(Message),
    Subscribed(String),
    Unsubscribed(String),
}

#[derive(Debug, Default)]
struct MockState {
    inbox: VecDeque<Message>,
    events: Vec<(u64, MockEvent)>,
    subscriptions: BTreeSet<String>,
    request_outstanding: bool,
    timed_out: bool,
    connected: bool,
}

pub struct MockChannel {
    role: SocketRole,
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle to a [`MockChannel`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new(role: SocketRole) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                role,
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// Queues a message for the agent to receive.
    pub fn push_inbound(&self, message: Message) {
        self.state.lock().inbox.push_back(message);
    }

    /// Everything the agent sent, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|(_, event)| match event {
                MockEvent::Sent(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// The full event log with sequence stamps.
    pub fn events(&self) -> Vec<(u64, MockEvent)> {
        self.state.lock().events.clone()
    }

    /// Sequence stamp of the first event matching `predicate`.
    pub fn seq_of(&self, predicate: impl Fn(&MockEvent) -> bool) -> Option<u64> {
        self.state
            .lock()
            .events
            .iter()
            .find(|(_, event)| predicate(event))
            .map(|(seq, _)| *seq)
    }

    pub fn set_timed_out(&self, timed_out: bool) {
        self.state.lock().timed_out = timed_out;
    }

    pub fn connect_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|(_, event)| matches!(event, MockEvent::Connected))
            .count()
    }

    pub fn subscriptions(&self) -> BTreeSet<String> {
        self.state.lock().subscriptions.clone()
    }

    pub fn request_outstanding(&self) -> bool {
        self.state.lock().request_outstanding
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn role(&self) -> SocketRole {
        self.role
    }

    async fn communicate(&mut self, _hostname: &str) -> Result<(), AgentError> {
        let mut state = self.state.lock();
        state.connected = true;
        state.timed_out = false;
        state.request_outstanding = false;
        let seq = next_seq();
        state.events.push((seq, MockEvent::Connected));
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().connected = false;
    }

    async fn send(&mut self, message: Message) -> Result<(), AgentError> {
        let mut state = self.state.lock();
        if self.role.is_request() {
            state.request_outstanding = true;
        }
        let seq = next_seq();
        state.events.push((seq, MockEvent::Sent(message)));
        Ok(())
    }

    fn receive(&mut self) -> Option<Message> {
        let mut state = self.state.lock();
        let message = state.inbox.pop_front()?;
        if self.role.is_request() {
            state.request_outstanding = false;
        }
        Some(message)
    }

    async fn wait_readable(&mut self) {
        if !self.has_pending() {
            std::future::pending::<()>().await;
        }
    }

    fn has_pending(&self) -> bool {
        !self.state.lock().inbox.is_empty()
    }

    fn request_outstanding(&self) -> bool {
        self.state.lock().request_outstanding
    }

    fn timed_out(&self, _now: Instant) -> bool {
        self.state.lock().timed_out
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), AgentError> {
        if self.role != SocketRole::AclSub {
            return Err(AgentError::Unsupported(self.role));
        }
        let mut state = self.state.lock();
        state.subscriptions.insert(topic.to_string());
        let seq = next_seq();
        state.events.push((seq, MockEvent::Subscribed(topic.to_string())));
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), AgentError> {
        if self.role != SocketRole::AclSub {
            return Err(AgentError::Unsupported(self.role));
        }
        let mut state = self.state.lock();
        state.subscriptions.remove(topic);
        let seq = next_seq();
        state
            .events
            .push((seq, MockEvent::Unsubscribed(topic.to_string())));
        Ok(())
    }

    fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.iter().cloned().collect()
    }
}
