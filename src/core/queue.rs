// src/core/queue.rs

//! Bounded FIFO backlog for a request socket.
//!
//! A REQ socket permits only one in-flight request, so anything the agent
//! wants to send while a request is outstanding waits here. When the backlog
//! is full the oldest entry is dropped: queued requests are re-issued
//! wholesale by the next resync anyway, so the newest intent wins.

use crate::core::protocol::Message;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug)]
pub struct RequestQueue {
    items: VecDeque<Message>,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends a message, dropping the oldest entry if the backlog is full.
    pub fn push(&mut self, message: Message) {
        if self.items.len() >= self.capacity {
            if let Some(dropped) = self.items.pop_front() {
                warn!(
                    "Request queue full ({}); dropping oldest {} message",
                    self.capacity,
                    dropped.kind()
                );
            }
        }
        self.items.push_back(message);
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
